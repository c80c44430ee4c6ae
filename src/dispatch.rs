//! Dispatch of assembled report bundles.
//!
//! The pipeline only knows the [`DispatchGateway`] trait. Delivery is
//! attempted once per cycle and never retried by the caller.
//!
//! [`OutboxGateway`] is the bundled implementation: it drops each message
//! (a `message.json` plus copies of the attachments) into its own directory
//! under the outbox, where an external transport can pick it up.

use crate::config::EmailConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch config error: {0}")]
    Config(String),
    #[error("dispatch I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dispatch serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Sends a report bundle somewhere.
pub trait DispatchGateway: Send + Sync {
    fn send(&self, subject: &str, body: &str, attachments: &[PathBuf]) -> Result<(), DispatchError>;
}

/// Message manifest written next to the attachment copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub subject: String,
    pub body: String,
    pub recipient: String,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<String>,
}

/// Writes messages to a local outbox directory.
#[derive(Debug, Clone)]
pub struct OutboxGateway {
    outbox_dir: PathBuf,
    recipient: String,
}

impl OutboxGateway {
    pub fn new(outbox_dir: impl Into<PathBuf>, recipient: impl Into<String>) -> Self {
        Self {
            outbox_dir: outbox_dir.into(),
            recipient: recipient.into(),
        }
    }

    pub fn from_config(email: &EmailConfig, outbox_dir: &Path) -> Self {
        Self::new(outbox_dir, email.recipient.clone())
    }

    pub fn outbox_dir(&self) -> &Path {
        &self.outbox_dir
    }

    fn write_message(
        &self,
        message_dir: &Path,
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> Result<(), DispatchError> {
        std::fs::create_dir_all(message_dir).map_err(|source| DispatchError::Io {
            path: message_dir.to_path_buf(),
            source,
        })?;

        let mut names = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let name = attachment
                .file_name()
                .ok_or_else(|| {
                    DispatchError::Config(format!("bad attachment path {attachment:?}"))
                })?;
            std::fs::copy(attachment, message_dir.join(name)).map_err(|source| {
                DispatchError::Io {
                    path: attachment.clone(),
                    source,
                }
            })?;
            names.push(name.to_string_lossy().into_owned());
        }

        let message = OutboundMessage {
            subject: subject.to_string(),
            body: body.to_string(),
            recipient: self.recipient.clone(),
            created_at: Utc::now(),
            attachments: names,
        };
        let manifest = message_dir.join("message.json");
        std::fs::write(&manifest, serde_json::to_string_pretty(&message)?).map_err(|source| {
            DispatchError::Io {
                path: manifest.clone(),
                source,
            }
        })?;
        Ok(())
    }
}

impl DispatchGateway for OutboxGateway {
    fn send(
        &self,
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> Result<(), DispatchError> {
        if self.recipient.trim().is_empty() {
            return Err(DispatchError::Config("no recipient configured".to_string()));
        }

        let message_dir = self.outbox_dir.join(format!(
            "{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        ));

        let result = self.write_message(&message_dir, subject, body, attachments);
        if result.is_err() {
            // Never leave a half-written message for a transport to pick up.
            let _ = std::fs::remove_dir_all(&message_dir);
        }
        result
    }
}
