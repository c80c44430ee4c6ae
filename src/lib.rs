//! Activity Report Agent - continuous capture with scheduled report bundles.
//!
//! Two capture loops append to their own logs at their own pace, and a
//! scheduler periodically stages, encrypts and dispatches a bundle built
//! from tails of those logs plus fresh snapshots.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Activity Report Agent                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐    key.txt     ┌─────────────┐              │
//! │  │ Key capture │───────────────▶│             │              │
//! │  └─────────────┘                │   Report    │  ┌─────────┐ │
//! │  ┌─────────────┐  clipboard.txt │  assembler  │─▶│Dispatch │ │
//! │  │  Clipboard  │───────────────▶│ (scheduled) │  └─────────┘ │
//! │  └─────────────┘                └─────────────┘              │
//! │                                   │        ▲                 │
//! │                                   ▼        │                 │
//! │                           ┌──────────┐ ┌───────────┐         │
//! │                           │Encryptor │ │ Snapshots │         │
//! │                           └──────────┘ └───────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The OS input hook, clipboard access, screen capture and network transport
//! are collaborators behind traits ([`collector::KeyInput`] channel,
//! [`collector::ClipboardSource`], [`report::ScreenshotProvider`],
//! [`dispatch::DispatchGateway`]).
//!
//! # Example
//!
//! ```no_run
//! use activity_report_agent::{collector, config::Config, context::AgentContext, transparency};
//! use std::sync::Arc;
//!
//! let config = Config::load(None).expect("config");
//! let stats = transparency::create_shared_log();
//! let ctx = Arc::new(AgentContext::for_capture(config, stats).expect("context"));
//!
//! // A platform hook forwards key transitions through the sender.
//! let (sender, _receiver) = collector::key_channel();
//! sender
//!     .send(collector::KeyInput::Press(collector::RawKey::char('a')))
//!     .unwrap();
//! ```

pub mod agent;
pub mod collector;
pub mod config;
pub mod context;
pub mod crypto;
pub mod dispatch;
pub mod report;
pub mod shutdown;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use agent::{Agent, AgentError, AgentTiming, Collaborators};
pub use collector::{CapturedKeyEvent, ClipboardWatcher, KeyCaptureBuffer, KeyInput, RawKey};
pub use config::{Config, ConfigError};
pub use context::AgentContext;
pub use crypto::{decrypt_in_place, encrypt_in_place, CryptoError, EncryptionKey};
pub use dispatch::{DispatchError, DispatchGateway, OutboxGateway};
pub use report::{CycleOutcome, ReportAssembler, ReportScheduler};
pub use shutdown::StopFlag;
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Notice shown when capture starts and by the `notice` command.
pub const MONITORING_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║            ACTIVITY REPORT AGENT - MONITORING NOTICE             ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  While running, this agent records on this host:                 ║
║    • Typed text, written to the keylog file                      ║
║    • Clipboard text changes, written to the clipboard log        ║
║    • Periodic system snapshots (and screenshots if enabled)      ║
║                                                                  ║
║  Reports are staged locally and handed to the configured         ║
║  dispatch gateway. Run only on hosts where every user has been   ║
║  informed and has agreed to this monitoring.                     ║
║                                                                  ║
║  Stop at any time with the release chord or Ctrl+C.              ║
║  View statistics with:  activity-agent status                    ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitoring_notice_contents() {
        assert!(MONITORING_NOTICE.contains("MONITORING NOTICE"));
        assert!(MONITORING_NOTICE.contains("Typed text"));
        assert!(MONITORING_NOTICE.contains("Clipboard"));
    }
}
