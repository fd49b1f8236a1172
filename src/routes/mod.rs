use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;

/// Compose the health and documentation routes and attach the shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router().merge(docs::router()).with_state(state)
}
