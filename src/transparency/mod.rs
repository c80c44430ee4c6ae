//! Transparency module: counters describing what the pipeline has done.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, PersistedStats, SharedTransparencyLog,
    TransparencyLog, TransparencyStats,
};
