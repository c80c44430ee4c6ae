//! Inert key source.
//!
//! No OS input hook ships with this crate. The noop source owns the sending
//! half of the capture channel so the capture loop stays connected. A
//! platform integration replaces it with a hook that forwards presses and
//! releases through [`NoopKeySource::sender`].

use crate::collector::keystrokes::CaptureError;
use crate::collector::types::KeyInput;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Capacity of the channel between the hook and the capture loop.
pub const KEY_CHANNEL_CAPACITY: usize = 10_000;

/// Create the bounded channel a key source feeds.
pub fn key_channel() -> (Sender<KeyInput>, Receiver<KeyInput>) {
    bounded(KEY_CHANNEL_CAPACITY)
}

/// A key source that never emits events.
pub struct NoopKeySource {
    sender: Sender<KeyInput>,
    running: Arc<AtomicBool>,
}

impl NoopKeySource {
    pub fn new(sender: Sender<KeyInput>) -> Self {
        Self {
            sender,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the source as running.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sending half for forwarding hook callbacks.
    pub fn sender(&self) -> &Sender<KeyInput> {
        &self.sender
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::RawKey;

    #[test]
    fn test_start_twice_fails() {
        let (tx, _rx) = key_channel();
        let mut source = NoopKeySource::new(tx);

        source.start().unwrap();
        assert!(source.is_running());
        assert!(matches!(source.start(), Err(CaptureError::AlreadyRunning)));

        source.stop();
        assert!(!source.is_running());
        assert!(source.start().is_ok());
    }

    #[test]
    fn test_sender_reaches_receiver() {
        let (tx, rx) = key_channel();
        let source = NoopKeySource::new(tx);
        source
            .sender()
            .send(KeyInput::Press(RawKey::char('q')))
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), KeyInput::Press(RawKey::char('q')));
    }
}
