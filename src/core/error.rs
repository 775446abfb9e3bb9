use thiserror::Error;

use super::types::DataType;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Snapshot inconsistency: {0}")]
    SnapshotInconsistency(String),

    #[error("Sort column read failure: {0}")]
    SortColumnReadFailure(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Job already running: {key}")]
    AlreadyRunning { key: String },

    #[error("Host memory exhausted: requested {requested} bytes, {available} bytes available")]
    MemoryExhausted { requested: u64, available: u64 },

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: DataType, actual: DataType },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Disk I/O error: {0}")]
    DiskIO(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArchiveError {
    /// Wrap a collaborator error with the context of the failed operation
    pub fn persistence(context: impl std::fmt::Display, err: anyhow::Error) -> Self {
        ArchiveError::PersistenceFailure(format!("{}: {:#}", context, err))
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
