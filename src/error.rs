//! Error types for the snapshot subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot file not found: {0}")]
    NotFound(PathBuf),

    #[error("Malformed snapshot: {0}")]
    MalformedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Snapshot is locked by another process: {0}")]
    Locked(PathBuf),

    #[error("Scheduler already started")]
    AlreadyStarted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl SnapshotError {
    /// Whether this error means the snapshot file does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            SnapshotError::NotFound(_) => true,
            SnapshotError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether this error came from a corrupt or unparseable file.
    pub fn is_malformed(&self) -> bool {
        matches!(self, SnapshotError::MalformedFormat(_))
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(e: serde_json::Error) -> Self {
        SnapshotError::Serialization(e.to_string())
    }
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;
