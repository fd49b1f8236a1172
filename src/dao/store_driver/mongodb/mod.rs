mod driver;
mod error;
mod monitor;

pub use driver::MongoDriver;
pub use error::MongoDriverError;

use crate::dao::storage::StorageError;

impl From<MongoDriverError> for StorageError {
    fn from(err: MongoDriverError) -> Self {
        match err {
            MongoDriverError::NotConnected => StorageError::NotConnected,
            MongoDriverError::CloseTimedOut { timeout_ms } => {
                StorageError::CloseTimedOut { timeout_ms }
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
