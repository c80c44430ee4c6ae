//! Point-in-time snapshot providers used by a report cycle.
//!
//! Each provider writes at most one artifact into the directory it is given
//! and returns its path, or `None` when it has nothing to contribute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sysinfo::System;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    Unavailable(String),
}

/// Screen capture. Pixel grabbing lives outside this crate.
pub trait ScreenshotProvider: Send + Sync {
    fn capture(&self, dest_dir: &Path) -> Result<Option<PathBuf>, ProviderError>;
}

/// Host description snapshot.
pub trait SystemInfoProvider: Send + Sync {
    fn snapshot(&self, dest_dir: &Path) -> Result<Option<PathBuf>, ProviderError>;
}

/// Screenshot provider used when no capture backend is wired in.
#[derive(Debug, Default)]
pub struct NoScreenshots;

impl ScreenshotProvider for NoScreenshots {
    fn capture(&self, _dest_dir: &Path) -> Result<Option<PathBuf>, ProviderError> {
        Ok(None)
    }
}

/// Contents of `system_info.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub captured_at: DateTime<Utc>,
    pub hostname: String,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub cpu_count: usize,
    pub total_memory_bytes: u64,
    pub used_memory_bytes: u64,
    pub uptime_secs: u64,
}

impl SystemSnapshot {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            captured_at: Utc::now(),
            hostname,
            os_name: System::name(),
            os_version: System::long_os_version(),
            kernel_version: System::kernel_version(),
            cpu_count: sys.cpus().len(),
            total_memory_bytes: sys.total_memory(),
            used_memory_bytes: sys.used_memory(),
            uptime_secs: System::uptime(),
        }
    }
}

/// Writes a [`SystemSnapshot`] of the local host as JSON.
#[derive(Debug, Default)]
pub struct HostSnapshotProvider;

impl SystemInfoProvider for HostSnapshotProvider {
    fn snapshot(&self, dest_dir: &Path) -> Result<Option<PathBuf>, ProviderError> {
        let snapshot = SystemSnapshot::collect();
        let path = dest_dir.join("system_info.json");
        std::fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_snapshot_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = HostSnapshotProvider
            .snapshot(dir.path())
            .unwrap()
            .expect("snapshot path");

        assert_eq!(path, dir.path().join("system_info.json"));
        let parsed: SystemSnapshot =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(!parsed.hostname.is_empty());
    }

    #[test]
    fn test_no_screenshots() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NoScreenshots.capture(dir.path()).unwrap().is_none());
    }
}
