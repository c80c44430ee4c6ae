//! Session statistics for the capture and reporting pipeline.
//!
//! Counters only: nothing captured is stored here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lock-free counters shared by every pipeline thread.
#[derive(Debug)]
pub struct TransparencyLog {
    keystrokes_captured: AtomicU64,
    flushes: AtomicU64,
    flush_failures: AtomicU64,
    keystrokes_dropped: AtomicU64,
    clipboard_entries: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_dropped: AtomicU64,
    dispatch_failures: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            keystrokes_captured: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            flush_failures: AtomicU64::new(0),
            keystrokes_dropped: AtomicU64::new(0),
            clipboard_entries: AtomicU64::new(0),
            cycles_completed: AtomicU64::new(0),
            cycles_dropped: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that loads and saves cumulative totals at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(component = "agent", error = %e, "could not load previous statistics");
        }

        log
    }

    pub fn record_keystroke(&self) {
        self.keystrokes_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed flush and how many buffered events it lost.
    pub fn record_flush_failure(&self, dropped: u64) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
        self.keystrokes_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn record_clipboard_entry(&self) {
        self.clipboard_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_completed(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_dropped(&self) {
        self.cycles_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            keystrokes_captured: self.keystrokes_captured.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            keystrokes_dropped: self.keystrokes_dropped.load(Ordering::Relaxed),
            clipboard_entries: self.clipboard_entries.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_dropped: self.cycles_dropped.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Summary string for display at shutdown.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Keystrokes captured: {}\n\
             - Keylog flushes: {} ({} failed, {} keystrokes dropped)\n\
             - Clipboard entries: {}\n\
             - Report cycles: {} completed, {} dropped\n\
             - Dispatch failures: {}\n\
             - Session duration: {} seconds",
            stats.keystrokes_captured,
            stats.flushes,
            stats.flush_failures,
            stats.keystrokes_dropped,
            stats.clipboard_entries,
            stats.cycles_completed,
            stats.cycles_dropped,
            stats.dispatch_failures,
            stats.session_duration_secs
        )
    }

    /// Save totals to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                keystrokes_captured: stats.keystrokes_captured,
                flushes: stats.flushes,
                flush_failures: stats.flush_failures,
                keystrokes_dropped: stats.keystrokes_dropped,
                clipboard_entries: stats.clipboard_entries,
                cycles_completed: stats.cycles_completed,
                cycles_dropped: stats.cycles_dropped,
                dispatch_failures: stats.dispatch_failures,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.keystrokes_captured
                    .store(persisted.keystrokes_captured, Ordering::Relaxed);
                self.flushes.store(persisted.flushes, Ordering::Relaxed);
                self.flush_failures
                    .store(persisted.flush_failures, Ordering::Relaxed);
                self.keystrokes_dropped
                    .store(persisted.keystrokes_dropped, Ordering::Relaxed);
                self.clipboard_entries
                    .store(persisted.clipboard_entries, Ordering::Relaxed);
                self.cycles_completed
                    .store(persisted.cycles_completed, Ordering::Relaxed);
                self.cycles_dropped
                    .store(persisted.cycles_dropped, Ordering::Relaxed);
                self.dispatch_failures
                    .store(persisted.dispatch_failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub keystrokes_captured: u64,
    pub flushes: u64,
    pub flush_failures: u64,
    pub keystrokes_dropped: u64,
    pub clipboard_entries: u64,
    pub cycles_completed: u64,
    pub cycles_dropped: u64,
    pub dispatch_failures: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// On-disk format, also read back by the `status` command.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub keystrokes_captured: u64,
    pub flushes: u64,
    pub flush_failures: u64,
    pub keystrokes_dropped: u64,
    pub clipboard_entries: u64,
    pub cycles_completed: u64,
    pub cycles_dropped: u64,
    pub dispatch_failures: u64,
    pub last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
