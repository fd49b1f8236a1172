use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDriverError>;

#[derive(Debug, Error)]
pub enum MongoDriverError {
    #[error("failed to parse MongoDB connection URI for `{host}`")]
    InvalidUri {
        host: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping against `{database}` failed")]
    Ping {
        database: String,
        #[source]
        source: MongoError,
    },
    #[error("no MongoDB client is installed")]
    NotConnected,
    #[error("MongoDB client shutdown did not finish within {timeout_ms} ms")]
    CloseTimedOut { timeout_ms: u128 },
}
