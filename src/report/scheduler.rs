//! Periodic report scheduling with at most one cycle in flight.
//!
//! State machine: `Idle -> Running -> Idle`. A firing that finds a cycle
//! running is dropped, never queued. The gate is shared, so firings from any
//! thread (the timer, a one-shot CLI request) go through the same check.

use crate::shutdown::StopFlag;
use crate::transparency::SharedTransparencyLog;
use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const STOP_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Completed,
    Dropped,
}

/// Mutual-exclusion gate for report cycles.
#[derive(Debug, Clone, Default)]
pub struct CycleGate(Arc<AtomicBool>);

impl CycleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `Idle -> Running`, or return `None` if a cycle is already running.
    pub fn try_begin(&self) -> Option<CycleGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard(self.0.clone()))
    }

    pub fn state(&self) -> SchedulerState {
        if self.0.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }
}

/// Held while a cycle runs. Dropping it returns the gate to `Idle`, also when
/// the cycle panics.
#[derive(Debug)]
pub struct CycleGuard(Arc<AtomicBool>);

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fires `job` every `interval`, skipping firings that overlap a running cycle.
pub struct ReportScheduler<F> {
    job: F,
    interval: Duration,
    gate: CycleGate,
    stats: SharedTransparencyLog,
}

impl<F> ReportScheduler<F>
where
    F: Fn() + Send + Sync,
{
    pub fn new(interval: Duration, job: F, stats: SharedTransparencyLog) -> Self {
        Self {
            job,
            interval,
            gate: CycleGate::new(),
            stats,
        }
    }

    /// Share an existing gate, e.g. with a one-shot report trigger.
    pub fn with_gate(mut self, gate: CycleGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &CycleGate {
        &self.gate
    }

    pub fn state(&self) -> SchedulerState {
        self.gate.state()
    }

    /// Run the job now unless a cycle is already running.
    ///
    /// The job runs synchronously on the calling thread.
    pub fn fire(&self) -> FireOutcome {
        let Some(_guard) = self.gate.try_begin() else {
            self.stats.record_cycle_dropped();
            tracing::info!(component = "scheduler", "cycle still running, firing dropped");
            return FireOutcome::Dropped;
        };

        (self.job)();
        FireOutcome::Completed
    }

    /// Fire on every timer tick until a stop is requested.
    ///
    /// A slow cycle delays the next decision. Ticks that came due while it
    /// ran are discarded afterwards.
    pub fn run(&self, stop: &StopFlag) {
        tracing::info!(
            component = "scheduler",
            interval_secs = self.interval.as_secs(),
            "report scheduler started"
        );

        let ticker = crossbeam_channel::tick(self.interval);
        while !stop.is_stop_requested() {
            match ticker.recv_timeout(STOP_POLL) {
                Ok(_) => {
                    self.fire();
                    for _ in ticker.try_iter() {
                        self.stats.record_cycle_dropped();
                        tracing::info!(
                            component = "scheduler",
                            "tick missed during cycle, dropped"
                        );
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!(component = "scheduler", "report scheduler stopped");
    }
}

impl<F> ReportScheduler<F>
where
    F: Fn() + Send + Sync + 'static,
{
    /// Run the scheduler on its own thread.
    pub fn spawn(self: Arc<Self>, stop: StopFlag) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("report-scheduler".to_string())
            .spawn(move || self.run(&stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transparency::create_shared_log;
    use crossbeam_channel::{bounded, unbounded};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_gate_transitions() {
        let gate = CycleGate::new();
        assert_eq!(gate.state(), SchedulerState::Idle);

        let guard = gate.try_begin().expect("idle gate opens");
        assert_eq!(gate.state(), SchedulerState::Running);
        assert!(gate.try_begin().is_none());

        drop(guard);
        assert_eq!(gate.state(), SchedulerState::Idle);
        assert!(gate.try_begin().is_some());
    }

    #[test]
    fn test_firing_while_running_is_dropped() {
        let (started_tx, started_rx) = bounded::<()>(1);
        let (release_tx, release_rx) = bounded::<()>(1);
        let runs = Arc::new(AtomicUsize::new(0));
        let stats = create_shared_log();

        let job_runs = runs.clone();
        let scheduler = Arc::new(ReportScheduler::new(
            Duration::from_secs(3600),
            move || {
                job_runs.fetch_add(1, Ordering::SeqCst);
                let _ = started_tx.send(());
                let _ = release_rx.recv();
            },
            stats.clone(),
        ));

        let first = scheduler.clone();
        let handle = thread::spawn(move || first.fire());

        started_rx.recv().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Running);

        assert_eq!(scheduler.fire(), FireOutcome::Dropped);
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        release_tx.send(()).unwrap();
        assert_eq!(handle.join().unwrap(), FireOutcome::Completed);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(stats.stats().cycles_dropped, 1);
    }

    #[test]
    fn test_gate_released_after_panicking_job() {
        let scheduler = Arc::new(ReportScheduler::new(
            Duration::from_secs(3600),
            || panic!("cycle blew up"),
            create_shared_log(),
        ));

        let s = scheduler.clone();
        assert!(thread::spawn(move || s.fire()).join().is_err());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_run_fires_on_interval_and_stops() {
        let (fired_tx, fired_rx) = unbounded::<()>();
        let scheduler = Arc::new(ReportScheduler::new(
            Duration::from_millis(20),
            move || {
                let _ = fired_tx.send(());
            },
            create_shared_log(),
        ));

        let stop = StopFlag::new();
        let handle = scheduler.clone().spawn(stop.clone()).unwrap();
        for _ in 0..2 {
            fired_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        stop.request_stop();
        handle.join().unwrap();

        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_slow_cycle_does_not_backlog() {
        let interval = Duration::from_millis(10);
        let (started_tx, started_rx) = unbounded::<()>();
        let (release_tx, release_rx) = bounded::<()>(0);
        let runs = Arc::new(AtomicUsize::new(0));
        let stats = create_shared_log();

        let job_runs = runs.clone();
        let scheduler = Arc::new(ReportScheduler::new(
            interval,
            move || {
                job_runs.fetch_add(1, Ordering::SeqCst);
                let _ = started_tx.send(());
                let _ = release_rx.recv();
            },
            stats.clone(),
        ));

        let stop = StopFlag::new();
        let handle = scheduler.clone().spawn(stop.clone()).unwrap();

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        // Hold the first cycle across several intervals.
        thread::sleep(interval * 5);
        release_tx.send(()).unwrap();

        // The next cycle starts once; the ticks missed above were discarded.
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(stats.stats().cycles_dropped >= 1);

        stop.request_stop();
        drop(release_tx);
        handle.join().unwrap();
    }
}
