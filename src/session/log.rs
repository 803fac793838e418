// ABOUTME: Write-ahead transaction log — one JSON array holding every exchange across all sessions.
// ABOUTME: Best-effort audit trail: a corrupt log is discarded and restarted, never fatal.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A single completed request/response exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    pub timestamp: DateTime<Local>,
    pub session_id: String,
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub tokens_used: usize,
}

impl WalEntry {
    pub fn now(
        session_id: &str,
        model: &str,
        prompt: &str,
        response: &str,
        tokens_used: usize,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            session_id: session_id.to_string(),
            model: model.to_string(),
            prompt: prompt.to_string(),
            response: response.to_string(),
            tokens_used,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("transaction log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode transaction log: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only log file shared by every session in the process.
#[derive(Debug, Clone)]
pub struct WriteAheadLog {
    path: PathBuf,
}

impl WriteAheadLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, rewriting the whole file.
    pub fn append(&self, entry: WalEntry) -> Result<(), WalError> {
        let mut entries = self.read_existing()?;
        entries.push(entry);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// All entries currently in the log; a corrupt log reads as empty.
    pub fn entries(&self) -> Result<Vec<WalEntry>, WalError> {
        self.read_existing()
    }

    fn read_existing(&self) -> Result<Vec<WalEntry>, WalError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.trim_ascii().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_slice(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "transaction log is corrupt, starting a fresh one"
                );
                Ok(Vec::new())
            }
        }
    }
}
