use thiserror::Error;

/// Errors raised by the physical storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Target already exists: {0}")]
    AlreadyExists(String),

    /// Path escapes the storage root or is otherwise malformed.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The storage view does not allow the operation.
    #[error("Operation not permitted: {0}")]
    Denied(String),

    #[error("Metadata index error: {0}")]
    Index(#[from] rusqlite::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by trash operations.
#[derive(Debug, Error)]
pub enum TrashError {
    /// ACL or folder permission denial. Raised before anything is mutated.
    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The entry cannot take part in the requested operation.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A physical move or unlink failed.
    #[error("Trash operation failed: {0}")]
    TrashOperation(String),

    #[error("Ledger error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(String),
}

pub type TrashResult<T> = Result<T, TrashError>;
