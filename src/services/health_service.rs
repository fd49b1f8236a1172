use tracing::debug;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Build the health payload from the connection snapshot without touching the network.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let snapshot = state.connection().health();
    if !snapshot.is_healthy {
        debug!(
            state = %snapshot.state,
            attempts = snapshot.attempts,
            "reporting degraded storage health"
        );
    }
    snapshot.into()
}
