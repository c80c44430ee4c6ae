//! Keystroke buffering and the capture loop.
//!
//! A platform hook pushes [`KeyInput`]s into a channel. The capture loop owns
//! the [`KeyCaptureBuffer`] outright, so appends and flushes never race: a
//! flush takes the whole batch out of the buffer before writing it.

use crate::collector::logfile::append_text;
use crate::collector::types::{CapturedKeyEvent, KeyInput, RawKey, ReleaseChord};
use crate::shutdown::StopFlag;
use crate::transparency::SharedTransparencyLog;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Errors raised by capture components.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to append to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("key source is already running")]
    AlreadyRunning,
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Render a batch of events to the text appended to the keylog.
pub fn render_events(events: &[CapturedKeyEvent]) -> String {
    events.iter().filter_map(CapturedKeyEvent::rendered).collect()
}

/// In-memory keystroke buffer flushed to the keylog at a threshold.
pub struct KeyCaptureBuffer {
    events: Vec<CapturedKeyEvent>,
    threshold: usize,
    keylog_path: PathBuf,
    chord: ReleaseChord,
    stop: StopFlag,
    stats: SharedTransparencyLog,
}

impl KeyCaptureBuffer {
    pub fn new(
        keylog_path: PathBuf,
        threshold: usize,
        chord: ReleaseChord,
        stop: StopFlag,
        stats: SharedTransparencyLog,
    ) -> Self {
        let threshold = threshold.max(1);
        Self {
            events: Vec::with_capacity(threshold),
            threshold,
            keylog_path,
            chord,
            stop,
            stats,
        }
    }

    /// Handle a key press from the platform hook.
    ///
    /// A write failure during the resulting flush is logged and swallowed so
    /// capture keeps going.
    pub fn on_key_event(&mut self, raw: &RawKey) {
        let Some(event) = CapturedKeyEvent::normalize(raw) else {
            return;
        };

        self.events.push(event);
        self.stats.record_keystroke();

        if self.events.len() >= self.threshold {
            if let Err(e) = self.flush() {
                tracing::warn!(component = "keylog", error = %e, "keylog flush failed");
            }
        }
    }

    /// Handle a key release. Returns `true` when the release chord asked
    /// capture to stop.
    pub fn on_key_release(&mut self, raw: &RawKey) -> bool {
        if self.chord.matches(raw) {
            tracing::info!(component = "keylog", chord = %self.chord, "release chord received");
            self.stop.request_stop();
            return true;
        }
        false
    }

    /// Write every buffered event to the keylog in one append and clear the
    /// buffer. Returns the number of events taken.
    ///
    /// The batch is removed before writing; if the write fails those events
    /// are counted as dropped and the buffer starts empty again.
    pub fn flush(&mut self) -> Result<usize, CaptureError> {
        if self.events.is_empty() {
            return Ok(0);
        }

        let batch = std::mem::replace(&mut self.events, Vec::with_capacity(self.threshold));
        let text = render_events(&batch);

        let written = if text.is_empty() {
            Ok(())
        } else {
            append_text(&self.keylog_path, &text)
        };

        match written {
            Ok(()) => {
                self.stats.record_flush();
                tracing::debug!(component = "keylog", events = batch.len(), "flushed keystrokes");
                Ok(batch.len())
            }
            Err(source) => {
                self.stats.record_flush_failure(batch.len() as u64);
                Err(CaptureError::Write {
                    path: self.keylog_path.clone(),
                    source,
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn keylog_path(&self) -> &Path {
        &self.keylog_path
    }
}

/// Drive `buffer` from `receiver` until a stop is requested or every sender
/// is gone.
///
/// The stop flag is checked after each event has been fully handled, which
/// includes any flush it triggered. Input already queued when the loop ends
/// is still buffered, and the remainder is written before returning.
pub fn run_capture_loop(
    mut buffer: KeyCaptureBuffer,
    receiver: Receiver<KeyInput>,
    stop: StopFlag,
) {
    tracing::info!(
        component = "keylog",
        path = %buffer.keylog_path().display(),
        threshold = buffer.threshold(),
        "keystroke capture started"
    );

    while !stop.is_stop_requested() {
        match receiver.recv_timeout(RECV_TIMEOUT) {
            Ok(KeyInput::Press(raw)) => buffer.on_key_event(&raw),
            Ok(KeyInput::Release(raw)) => {
                buffer.on_key_release(&raw);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!(component = "keylog", "key source disconnected");
                break;
            }
        }
    }

    for input in receiver.try_iter() {
        if let KeyInput::Press(raw) = input {
            buffer.on_key_event(&raw);
        }
    }

    match buffer.flush() {
        Ok(n) if n > 0 => {
            tracing::debug!(component = "keylog", events = n, "flushed remaining keystrokes")
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(component = "keylog", error = %e, "final keylog flush failed"),
    }

    tracing::info!(component = "keylog", "keystroke capture stopped");
}

/// Run the capture loop on its own thread.
pub fn spawn_capture_loop(
    buffer: KeyCaptureBuffer,
    receiver: Receiver<KeyInput>,
    stop: StopFlag,
) -> Result<JoinHandle<()>, CaptureError> {
    thread::Builder::new()
        .name("key-capture".to_string())
        .spawn(move || run_capture_loop(buffer, receiver, stop))
        .map_err(CaptureError::Spawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{ModifierKey, Modifiers};
    use crate::transparency::create_shared_log;
    use crossbeam_channel::unbounded;

    fn buffer_in(dir: &Path, threshold: usize) -> (KeyCaptureBuffer, StopFlag) {
        let stop = StopFlag::new();
        let buffer = KeyCaptureBuffer::new(
            dir.join("key.txt"),
            threshold,
            ReleaseChord::default(),
            stop.clone(),
            create_shared_log(),
        );
        (buffer, stop)
    }

    #[test]
    fn test_no_write_below_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let (mut buffer, _) = buffer_in(dir.path(), 10);

        for c in "abcdefghi".chars() {
            buffer.on_key_event(&RawKey::char(c));
        }

        assert_eq!(buffer.len(), 9);
        assert!(!dir.path().join("key.txt").exists());
    }

    #[test]
    fn test_threshold_triggers_single_write() {
        let dir = tempfile::tempdir().unwrap();
        let (mut buffer, _) = buffer_in(dir.path(), 10);

        for c in "abcdefghij".chars() {
            buffer.on_key_event(&RawKey::char(c));
        }

        assert!(buffer.is_empty());
        let content = std::fs::read_to_string(dir.path().join("key.txt")).unwrap();
        assert_eq!(content, "abcdefghij");
    }

    #[test]
    fn test_remainder_after_many_events() {
        let dir = tempfile::tempdir().unwrap();
        for (threshold, n) in [(3usize, 10usize), (4, 8), (7, 20), (1, 5)] {
            let sub = dir.path().join(format!("{threshold}_{n}"));
            std::fs::create_dir_all(&sub).unwrap();
            let (mut buffer, _) = buffer_in(&sub, threshold);

            for i in 0..n {
                let c = char::from(b'a' + (i % 26) as u8);
                buffer.on_key_event(&RawKey::char(c));
            }

            assert_eq!(buffer.len(), n % threshold);
            let written = std::fs::read_to_string(sub.join("key.txt")).unwrap();
            assert_eq!(written.len(), n - n % threshold);
        }
    }

    #[test]
    fn test_control_keys_count_toward_threshold_but_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut buffer, _) = buffer_in(dir.path(), 5);

        buffer.on_key_event(&RawKey::char('h'));
        buffer.on_key_event(&RawKey::named("shift"));
        buffer.on_key_event(&RawKey::char('i'));
        buffer.on_key_event(&RawKey::named("space"));
        buffer.on_key_event(&RawKey::named("enter"));

        assert!(buffer.is_empty());
        let content = std::fs::read_to_string(dir.path().join("key.txt")).unwrap();
        assert_eq!(content, "hi\n");
    }

    #[test]
    fn test_write_failure_keeps_capturing() {
        let dir = tempfile::tempdir().unwrap();
        let stats = create_shared_log();
        // A directory in place of the keylog makes every append fail.
        let bad_path = dir.path().join("not-a-file");
        std::fs::create_dir_all(&bad_path).unwrap();

        let mut buffer = KeyCaptureBuffer::new(
            bad_path,
            2,
            ReleaseChord::default(),
            StopFlag::new(),
            stats.clone(),
        );

        for c in "abcde".chars() {
            buffer.on_key_event(&RawKey::char(c));
        }

        assert_eq!(buffer.len(), 1);
        let s = stats.stats();
        assert_eq!(s.keystrokes_captured, 5);
        assert_eq!(s.flush_failures, 2);
        assert_eq!(s.keystrokes_dropped, 4);
    }

    #[test]
    fn test_release_chord_requests_stop() {
        let dir = tempfile::tempdir().unwrap();
        let (mut buffer, stop) = buffer_in(dir.path(), 10);

        assert!(!buffer.on_key_release(&RawKey::char('z')));
        assert!(!stop.is_stop_requested());

        let ctrl = Modifiers::default().with(ModifierKey::Ctrl);
        assert!(buffer.on_key_release(&RawKey::char('z').with_modifiers(ctrl)));
        assert!(stop.is_stop_requested());
    }

    #[test]
    fn test_loop_drains_queue_and_flushes_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let (buffer, stop) = buffer_in(dir.path(), 100);
        let (tx, rx) = unbounded();

        for c in "queued".chars() {
            tx.send(KeyInput::Press(RawKey::char(c))).unwrap();
        }
        stop.request_stop();

        run_capture_loop(buffer, rx, stop);

        let content = std::fs::read_to_string(dir.path().join("key.txt")).unwrap();
        assert_eq!(content, "queued");
    }

    #[test]
    fn test_loop_stops_on_chord() {
        let dir = tempfile::tempdir().unwrap();
        let (buffer, stop) = buffer_in(dir.path(), 100);
        let (tx, rx) = unbounded();

        let handle = spawn_capture_loop(buffer, rx, stop.clone()).unwrap();

        tx.send(KeyInput::Press(RawKey::char('o'))).unwrap();
        tx.send(KeyInput::Press(RawKey::char('k'))).unwrap();
        let ctrl = Modifiers::default().with(ModifierKey::Ctrl);
        tx.send(KeyInput::Release(RawKey::char('z').with_modifiers(ctrl)))
            .unwrap();

        handle.join().unwrap();
        assert!(stop.is_stop_requested());
        let content = std::fs::read_to_string(dir.path().join("key.txt")).unwrap();
        assert_eq!(content, "ok");
    }
}
