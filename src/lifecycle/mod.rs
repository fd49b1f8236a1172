//! Connection lifecycle: retry campaign, driver event handling, health and shutdown.

mod backoff;
mod manager;
mod phase;
#[cfg(test)]
mod testing;

pub use backoff::{Backoff, RetryPolicy};
pub use manager::ConnectionManager;
pub use phase::{ConnectionState, HealthSnapshot, ShutdownSignal};
