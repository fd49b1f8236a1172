use serde::Serialize;
use utoipa::ToSchema;

use crate::lifecycle::{ConnectionState, HealthSnapshot};

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Lifecycle phase of the storage connection.
    pub state: ConnectionState,
    /// Whether storage is connected and ready.
    pub is_healthy: bool,
    /// Storage hosts, without credentials.
    pub host: String,
    /// Attempts made in the current connection campaign.
    pub attempts: u32,
}

impl From<HealthSnapshot> for HealthResponse {
    fn from(snapshot: HealthSnapshot) -> Self {
        let status = if snapshot.is_healthy { "ok" } else { "degraded" };
        Self {
            status: status.to_string(),
            state: snapshot.state,
            is_healthy: snapshot.is_healthy,
            host: snapshot.host,
            attempts: snapshot.attempts,
        }
    }
}
