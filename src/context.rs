//! Process-wide context built once at startup and shared read-only.

use crate::collector::{types::ReleaseChord, unique_log_path};
use crate::config::{Config, ConfigError};
use crate::crypto::{CryptoError, EncryptionKey};
use crate::transparency::SharedTransparencyLog;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("invalid release_chord: {0}")]
    Chord(String),
}

/// Resolved settings and shared handles for every pipeline component.
#[derive(Debug)]
pub struct AgentContext {
    pub config: Arc<Config>,
    /// Keylog this run writes to (capture) or reads from (one-shot report)
    pub keylog_path: PathBuf,
    pub chord: ReleaseChord,
    /// Present only when encryption is enabled
    pub key: Option<EncryptionKey>,
    pub stats: SharedTransparencyLog,
}

impl AgentContext {
    /// Context for a capturing run: the keylog gets a fresh,
    /// non-colliding name so earlier runs are never appended to.
    pub fn for_capture(config: Config, stats: SharedTransparencyLog) -> Result<Self, ContextError> {
        let keylog_path = unique_log_path(&config.keylog_file);
        Self::build(config, keylog_path, stats)
    }

    /// Context for reporting without capture: the most recent keylog is used.
    pub fn for_reporting(
        config: Config,
        stats: SharedTransparencyLog,
    ) -> Result<Self, ContextError> {
        let keylog_path = latest_log_path(&config.keylog_file);
        Self::build(config, keylog_path, stats)
    }

    fn build(
        config: Config,
        keylog_path: PathBuf,
        stats: SharedTransparencyLog,
    ) -> Result<Self, ContextError> {
        config.validate()?;
        config.ensure_directories()?;

        let chord = config
            .release_chord
            .parse::<ReleaseChord>()
            .map_err(ContextError::Chord)?;

        let key = if config.encryption.enabled {
            tracing::info!(component = "crypto", "deriving artifact encryption key");
            Some(EncryptionKey::derive(
                &config.encryption.password,
                &config.encryption.salt,
            )?)
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            keylog_path,
            chord,
            key,
            stats,
        })
    }
}

/// The newest log in the `key.txt`, `key_1.txt`, ... sequence: the last
/// existing name before the first gap. Falls back to `base`.
pub fn latest_log_path(base: &Path) -> PathBuf {
    let next = unique_log_path(base);
    if next == base {
        return base.to_path_buf();
    }

    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let next_stem = next
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let counter: u32 = next_stem
        .strip_prefix(&format!("{stem}_"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(1);

    if counter <= 1 {
        return base.to_path_buf();
    }

    let file_name = match base.extension() {
        Some(ext) => format!("{stem}_{}.{}", counter - 1, ext.to_string_lossy()),
        None => format!("{stem}_{}", counter - 1),
    };
    base.with_file_name(file_name)
}
