//! Cooperative stop signal shared by the pipeline's loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_SLICE: Duration = Duration::from_millis(50);

/// A stop request flag. Setting it is the only effect; each loop notices it
/// at its next checkpoint and exits on its own.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless a stop is requested first.
    ///
    /// Returns `true` if the full duration elapsed without a stop request.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stop_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(POLL_SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = StopFlag::new();
        let other = flag.clone();
        assert!(!other.is_stop_requested());
        flag.request_stop();
        assert!(other.is_stop_requested());
    }

    #[test]
    fn test_sleep_returns_early_on_stop() {
        let flag = StopFlag::new();
        let setter = flag.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.request_stop();
        });

        let started = Instant::now();
        assert!(!flag.sleep(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_sleep_completes() {
        assert!(StopFlag::new().sleep(Duration::from_millis(10)));
    }
}
