use std::error::Error;
use thiserror::Error;

/// Result alias for storage driver operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage drivers regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("no open storage connection")]
    NotConnected,
    #[error("closing the storage connection timed out after {timeout_ms} ms")]
    CloseTimedOut { timeout_ms: u128 },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
