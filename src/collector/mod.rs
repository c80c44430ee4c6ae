//! Capture side of the pipeline: keystrokes and clipboard, each written to
//! its own append-only log by exactly one thread.

pub mod clipboard;
pub mod keystrokes;
pub mod logfile;
pub mod noop;
pub mod types;

pub use clipboard::{
    ClipboardError, ClipboardSource, ClipboardTick, ClipboardWatcher, NoopClipboard,
    CLIPBOARD_POLL_INTERVAL,
};
pub use keystrokes::{
    render_events, run_capture_loop, spawn_capture_loop, CaptureError, KeyCaptureBuffer,
};
pub use logfile::{append_text, tail_lines, unique_log_path};
pub use noop::{key_channel, NoopKeySource};
pub use types::{CapturedKeyEvent, KeyInput, ModifierKey, Modifiers, RawKey, ReleaseChord};

/// Platform-agnostic key source type alias
pub type KeySource = NoopKeySource;
