//! Clipboard change detection.
//!
//! The watcher polls a [`ClipboardSource`] on a fixed cadence and appends a
//! timestamped entry to the clipboard log whenever the text changes. Only
//! the last observed value is kept in memory.

use crate::collector::logfile::append_text;
use crate::shutdown::StopFlag;
use crate::transparency::SharedTransparencyLog;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Polling cadence of the clipboard watcher.
pub const CLIPBOARD_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the host clipboard, provided by the platform layer.
pub trait ClipboardSource: Send {
    /// Current clipboard text, or `None` if it holds no text.
    fn read_text(&mut self) -> Result<Option<String>, ClipboardError>;
}

impl<S: ClipboardSource + ?Sized> ClipboardSource for Box<S> {
    fn read_text(&mut self) -> Result<Option<String>, ClipboardError> {
        (**self).read_text()
    }
}

/// Clipboard source used when no platform clipboard is wired in.
#[derive(Debug, Default)]
pub struct NoopClipboard;

impl ClipboardSource for NoopClipboard {
    fn read_text(&mut self) -> Result<Option<String>, ClipboardError> {
        Ok(None)
    }
}

/// What a single poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardTick {
    /// A new value was appended to the log
    Recorded,
    /// Same value as last time
    Unchanged,
    /// Nothing readable on the clipboard
    Empty,
    /// Reading the clipboard or writing the log failed
    Failed,
}

/// Polls a clipboard source and logs changes.
pub struct ClipboardWatcher<S: ClipboardSource> {
    source: S,
    last_seen: Option<String>,
    log_path: PathBuf,
    stats: SharedTransparencyLog,
}

impl<S: ClipboardSource> ClipboardWatcher<S> {
    pub fn new(source: S, log_path: PathBuf, stats: SharedTransparencyLog) -> Self {
        Self {
            source,
            last_seen: None,
            log_path,
            stats,
        }
    }

    /// Poll once.
    ///
    /// The remembered value only advances after the entry has been written,
    /// so a failed append is retried on the next tick.
    pub fn tick(&mut self) -> ClipboardTick {
        let text = match self.source.read_text() {
            Ok(Some(text)) if !text.is_empty() => text,
            Ok(_) => return ClipboardTick::Empty,
            Err(e) => {
                tracing::warn!(component = "clipboard", error = %e, "clipboard read failed");
                return ClipboardTick::Failed;
            }
        };

        if self.last_seen.as_deref() == Some(text.as_str()) {
            return ClipboardTick::Unchanged;
        }

        let entry = format_entry(&text);
        if let Err(e) = append_text(&self.log_path, &entry) {
            tracing::warn!(
                component = "clipboard",
                path = %self.log_path.display(),
                error = %e,
                "clipboard log write failed"
            );
            return ClipboardTick::Failed;
        }

        self.last_seen = Some(text);
        self.stats.record_clipboard_entry();
        ClipboardTick::Recorded
    }

    /// Poll every `interval` until a stop is requested.
    pub fn run(mut self, stop: StopFlag, interval: Duration) {
        tracing::info!(
            component = "clipboard",
            path = %self.log_path.display(),
            "clipboard monitoring started"
        );

        while !stop.is_stop_requested() {
            self.tick();
            if !stop.sleep(interval) {
                break;
            }
        }

        tracing::info!(component = "clipboard", "clipboard monitoring stopped");
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

impl<S: ClipboardSource + 'static> ClipboardWatcher<S> {
    /// Run the watcher on its own thread.
    pub fn spawn(self, stop: StopFlag, interval: Duration) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("clipboard-watch".to_string())
            .spawn(move || self.run(stop, interval))
    }
}

fn format_entry(text: &str) -> String {
    format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transparency::create_shared_log;
    use std::collections::VecDeque;

    /// Replays scripted reads, then reports an empty clipboard.
    struct ScriptedClipboard(VecDeque<Result<Option<String>, ClipboardError>>);

    impl ScriptedClipboard {
        fn texts(values: &[&str]) -> Self {
            Self(values.iter().map(|v| Ok(Some(v.to_string()))).collect())
        }
    }

    impl ClipboardSource for ScriptedClipboard {
        fn read_text(&mut self) -> Result<Option<String>, ClipboardError> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    fn entries(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_one_entry_per_distinct_value() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("clipboard.txt");
        let source = ScriptedClipboard::texts(&["alpha", "alpha", "beta", "beta", "alpha"]);
        let mut watcher = ClipboardWatcher::new(source, log.clone(), create_shared_log());

        let ticks: Vec<_> = (0..5).map(|_| watcher.tick()).collect();
        assert_eq!(
            ticks,
            vec![
                ClipboardTick::Recorded,
                ClipboardTick::Unchanged,
                ClipboardTick::Recorded,
                ClipboardTick::Unchanged,
                ClipboardTick::Recorded,
            ]
        );

        let lines = entries(&log);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('[') && lines[0].ends_with("] alpha"));
        assert!(lines[1].ends_with("] beta"));
        assert!(lines[2].ends_with("] alpha"));
    }

    #[test]
    fn test_empty_and_unreadable_are_noops() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("clipboard.txt");
        let source = ScriptedClipboard(VecDeque::from(vec![
            Ok(None),
            Ok(Some(String::new())),
            Err(ClipboardError::Unavailable("locked".to_string())),
            Ok(Some("gamma".to_string())),
        ]));
        let mut watcher = ClipboardWatcher::new(source, log.clone(), create_shared_log());

        assert_eq!(watcher.tick(), ClipboardTick::Empty);
        assert_eq!(watcher.tick(), ClipboardTick::Empty);
        assert_eq!(watcher.tick(), ClipboardTick::Failed);
        assert!(!log.exists());
        assert_eq!(watcher.tick(), ClipboardTick::Recorded);
        assert_eq!(entries(&log).len(), 1);
    }

    #[test]
    fn test_failed_write_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("clipboard.txt");
        std::fs::create_dir_all(&log).unwrap();

        let stats = create_shared_log();
        let source = ScriptedClipboard::texts(&["delta", "delta"]);
        let mut watcher = ClipboardWatcher::new(source, log.clone(), stats.clone());

        assert_eq!(watcher.tick(), ClipboardTick::Failed);
        std::fs::remove_dir(&log).unwrap();
        assert_eq!(watcher.tick(), ClipboardTick::Recorded);
        assert_eq!(stats.stats().clipboard_entries, 1);
    }

    #[test]
    fn test_run_exits_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("clipboard.txt");
        let watcher = ClipboardWatcher::new(
            ScriptedClipboard::texts(&["one"]),
            log.clone(),
            create_shared_log(),
        );

        let stop = StopFlag::new();
        let handle = watcher
            .spawn(stop.clone(), Duration::from_millis(10))
            .unwrap();
        thread::sleep(Duration::from_millis(60));
        stop.request_stop();
        handle.join().unwrap();

        assert_eq!(entries(&log).len(), 1);
    }
}
