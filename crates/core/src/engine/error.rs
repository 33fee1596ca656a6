//! Error types for the engine module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running a conversion.
#[derive(Debug, Error)]
pub enum EngineError {
    /// External engine binary could not be spawned.
    #[error("failed to spawn external engine {path}: {reason}")]
    SpawnFailed { path: PathBuf, reason: String },

    /// The engine ran but reported failure.
    #[error("conversion failed: {detail}")]
    ConversionFailed { detail: String },

    /// The engine exited successfully but produced no output.
    #[error("engine exited successfully but no output was produced")]
    MissingOutput,

    /// A virtual workspace name was rejected.
    #[error("invalid workspace entry name: {name}")]
    InvalidEntryName { name: String },

    /// A workspace entry was not found.
    #[error("workspace entry not found: {name}")]
    EntryNotFound { name: String },

    /// I/O error while staging or collecting files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Creates a conversion failure carrying diagnostic text.
    pub fn conversion_failed(detail: impl Into<String>) -> Self {
        Self::ConversionFailed {
            detail: detail.into(),
        }
    }

    /// Short diagnostic string suitable for a job's `error_detail`.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}
