#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use tokio::sync::broadcast;

use crate::dao::storage::StorageResult;

/// Capacity of the driver notification channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Lifecycle notification emitted by a driver at any time, independent of
/// connection attempts made through [`StoreDriver::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// A connection became usable.
    Connected,
    /// The driver hit an error on an established or pending connection.
    Error(String),
    /// A previously usable connection was lost.
    Disconnected,
    /// A lost connection became usable again without a new attempt.
    Reconnected,
    /// The connection was closed.
    Close,
}

impl DriverEvent {
    /// Short label used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            DriverEvent::Connected => "connected",
            DriverEvent::Error(_) => "error",
            DriverEvent::Disconnected => "disconnected",
            DriverEvent::Reconnected => "reconnected",
            DriverEvent::Close => "close",
        }
    }
}

/// Abstraction over the connection to the backing store.
pub trait StoreDriver: Send + Sync {
    /// Make one connection attempt, bounded by the driver's own timeouts.
    fn connect(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Close the current connection.
    fn close(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Whether the driver currently considers the connection usable.
    fn is_ready(&self) -> bool;
    /// Subscribe to asynchronous lifecycle notifications.
    fn subscribe(&self) -> broadcast::Receiver<DriverEvent>;
}
