use thiserror::Error;

/// Unified error type for storage operations that application code can handle
#[derive(Error, Debug)]
pub enum StorageError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    /// Wrap any SDK error into the non-recoverable variant with context.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StorageError::Other(anyhow::Error::new(err))
    }
}

/// Type alias for storage operation results
pub type Result<T> = std::result::Result<T, StorageError>;
