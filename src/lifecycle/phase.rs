use std::fmt;

use serde::Serialize;
use utoipa::ToSchema;

/// Observed lifecycle phase of the storage connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No usable connection. Initial state, and the state after an exhausted
    /// campaign, a runtime drop, or a completed shutdown.
    #[default]
    Disconnected,
    /// A connection campaign is in progress.
    Connecting,
    /// The driver reported a working connection.
    Connected,
    /// Shutdown has begun and the connection is being closed.
    Disconnecting,
}

impl ConnectionState {
    /// Lowercase label used in logs and the health payload.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the connection returned by
/// [`ConnectionManager::health`](super::ConnectionManager::health).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// Current lifecycle phase.
    pub state: ConnectionState,
    /// `true` only when connected and the driver reports it is ready.
    pub is_healthy: bool,
    /// Target host list, without credentials.
    pub host: String,
    /// Attempts made in the current campaign.
    pub attempts: u32,
}

/// Termination request that triggered a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// Shutdown requested by the host itself, e.g. after the server drained.
    Requested,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
            ShutdownSignal::Requested => "requested",
        };
        f.write_str(label)
    }
}
