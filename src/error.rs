use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("no operation to undo")]
    NoOperationToUndo,

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("path already exists: {0}")]
    PathAlreadyExists(String),

    #[error("revert in progress: {0}")]
    RevertInProgress(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Planner error: {0}")]
    Planner(String),

    #[error("history entry not found: {0}")]
    HistoryNotFound(uuid::Uuid),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AppError {
    /// Maps an I/O failure on `path` onto the tagged variants, keeping the raw
    /// error only for kinds that have no dedicated variant.
    pub fn from_io(err: std::io::Error, path: &Path) -> Self {
        let display = path.to_string_lossy().to_string();
        match err.kind() {
            ErrorKind::NotFound => Self::FileNotFound(display),
            ErrorKind::PermissionDenied => Self::PermissionDenied(display),
            ErrorKind::AlreadyExists => Self::PathAlreadyExists(display),
            ErrorKind::InvalidInput => Self::InvalidPath(display),
            _ => Self::Io(err),
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
