//! On-disk sequence number record
//!
//! Webhook mode persists the last delivered sequence number so a restarted
//! process resumes numbering instead of starting from zero.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Sequence store errors
#[derive(Debug, Error)]
pub enum SequenceStoreError {
    #[error("Sequence file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sequence file holds an invalid value: {0:?}")]
    InvalidContent(String),
}

/// File-backed store for the last seen sequence number
#[derive(Debug, Clone)]
pub struct SequenceStore {
    path: PathBuf,
}

impl SequenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted sequence number
    ///
    /// A missing or empty file means nothing was persisted yet.
    pub async fn load(&self) -> Result<Option<u64>, SequenceStoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse()
            .map(Some)
            .map_err(|_| SequenceStoreError::InvalidContent(trimmed.to_string()))
    }

    /// Write a sequence number, replacing the file atomically
    pub async fn save(&self, sequence: u64) -> Result<(), SequenceStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, sequence.to_string()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Spawn the background writer
    ///
    /// Bursts of updates are coalesced: only the latest value is written. The
    /// value current at spawn time counts as already persisted; anything sent
    /// later is written, and the final value is flushed when `shutdown` flips
    /// to true.
    pub fn spawn_writer(
        self,
        mut updates: watch::Receiver<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let mut last_written = *updates.borrow_and_update();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let sequence = *updates.borrow_and_update();
                        if sequence != last_written {
                            self.write_logged(sequence).await;
                            last_written = sequence;
                        }
                    }
                    () = async {
                        let _ = shutdown.wait_for(|stop| *stop).await;
                    } => break,
                }
            }

            let sequence = *updates.borrow();
            if sequence != last_written {
                self.write_logged(sequence).await;
            }
            tracing::debug!(path = %self.path.display(), "Sequence writer stopped");
        })
    }

    async fn write_logged(&self, sequence: u64) {
        if let Err(e) = self.save(sequence).await {
            tracing::warn!(sequence, error = %e, "Unable to persist sequence number");
        } else {
            tracing::trace!(sequence, "Persisted sequence number");
        }
    }
}
