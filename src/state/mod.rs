use std::sync::Arc;

use crate::lifecycle::ConnectionManager;

/// Reference-counted handle to [`AppState`].
pub type SharedState = Arc<AppState>;

/// Central application state handed to every route.
pub struct AppState {
    connection: ConnectionManager,
}

impl AppState {
    /// Wrap the connection manager in an [`Arc`] so it can be cloned cheaply.
    pub fn new(connection: ConnectionManager) -> SharedState {
        Arc::new(Self { connection })
    }

    /// Handle to the storage connection lifecycle.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}
