use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, error, info, warn};

use super::{
    backoff::{Backoff, RetryPolicy},
    phase::{ConnectionState, HealthSnapshot, ShutdownSignal},
};
use crate::{
    config::StoreTarget,
    dao::{
        storage::StorageError,
        store_driver::{DriverEvent, StoreDriver},
    },
};

/// Owns the lifecycle of the process's storage connection.
///
/// Cloning is cheap and every clone drives the same connection. Nothing in
/// here returns an error to the caller: failures end up in the logs and in
/// [`ConnectionManager::health`].
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    driver: Arc<dyn StoreDriver>,
    target: StoreTarget,
    host: String,
    policy: RetryPolicy,
    tracker: Mutex<Tracker>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Every mutable field, guarded by one lock that is never held across an await.
struct Tracker {
    state: ConnectionState,
    attempts: u32,
    backoff: Backoff,
    closing: bool,
    closed: bool,
}

/// Next thing the campaign loop has to do.
enum Step {
    Attempt(u32),
    Wait(Duration),
    /// An attempt succeeded after shutdown had begun; its connection must go.
    CloseLate(u32),
    Finished(bool),
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state. No connection is attempted yet.
    pub fn new(driver: Arc<dyn StoreDriver>, target: StoreTarget, policy: RetryPolicy) -> Self {
        let (state_tx, _rx) = watch::channel(ConnectionState::Disconnected);
        let tracker = Tracker {
            state: ConnectionState::Disconnected,
            attempts: 0,
            backoff: Backoff::new(&policy),
            closing: false,
            closed: false,
        };

        Self {
            inner: Arc::new(ManagerInner {
                driver,
                host: target.host(),
                target,
                policy,
                tracker: Mutex::new(tracker),
                state_tx,
            }),
        }
    }

    /// Run a connection campaign and report whether it ended connected.
    ///
    /// Waits between attempts only suspend the calling task. An exhausted
    /// campaign leaves the manager `Disconnected` and returns `false`; the
    /// host keeps running in degraded mode. A later drop does not start a new
    /// campaign.
    pub async fn ensure_connected(&self) -> bool {
        let inner = &self.inner;
        let mut step = inner.start_campaign();

        loop {
            step = match step {
                Step::Finished(connected) => return connected,
                Step::Wait(wait) => {
                    sleep(wait).await;
                    inner.next_attempt()
                }
                Step::Attempt(attempt) => {
                    let outcome = inner.driver.connect().await;
                    inner.record_attempt(attempt, outcome)
                }
                Step::CloseLate(attempt) => {
                    inner.close_late_connection(attempt).await;
                    Step::Finished(false)
                }
            };
        }
    }

    /// Listen to the driver's lifecycle notifications on a background task.
    ///
    /// Subscription happens before this returns, so no notification emitted
    /// afterwards is missed. The task ends once the connection is closed or the
    /// driver goes away.
    pub fn register_event_handlers(&self) -> JoinHandle<()> {
        let mut events = self.inner.driver.subscribe();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        if !inner.apply_event(event) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "storage driver notifications were dropped");
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        inner.resync_after_lag();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("storage event listener stopped");
        })
    }

    /// Close the connection once. Later and concurrent calls return immediately.
    ///
    /// A failing close is logged and swallowed.
    pub async fn shutdown(&self, signal: ShutdownSignal) {
        if !self.inner.begin_shutdown() {
            debug!(%signal, "storage shutdown already handled");
            return;
        }

        info!(%signal, host = %self.inner.host, "closing storage connection");
        match self.inner.driver.close().await {
            Ok(()) => info!("storage connection closed"),
            Err(StorageError::NotConnected) => info!("no open storage connection to close"),
            Err(err) => {
                error!(error = %err, "failed to close storage connection; shutting down anyway")
            }
        }

        self.inner.finish_shutdown();
    }

    /// Current health. Never blocks on I/O.
    pub fn health(&self) -> HealthSnapshot {
        let (state, attempts) = {
            let tracker = self.inner.tracker();
            (tracker.state, tracker.attempts)
        };

        HealthSnapshot {
            state,
            is_healthy: state == ConnectionState::Connected && self.inner.driver.is_ready(),
            host: self.inner.host.clone(),
            attempts,
        }
    }

    /// Current lifecycle phase.
    pub fn state(&self) -> ConnectionState {
        self.inner.tracker().state
    }

    /// Subscribe to every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Whether shutdown has completed.
    pub fn is_closed(&self) -> bool {
        self.inner.tracker().closed
    }

    /// Target the manager connects to.
    pub fn target(&self) -> &StoreTarget {
        &self.inner.target
    }
}

impl ManagerInner {
    fn tracker(&self) -> MutexGuard<'_, Tracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next` and publish the change. Returns the previous state.
    fn set_state(&self, tracker: &mut Tracker, next: ConnectionState) -> ConnectionState {
        let previous = std::mem::replace(&mut tracker.state, next);
        if previous != next {
            self.state_tx.send_replace(next);
        }
        previous
    }

    fn start_campaign(&self) -> Step {
        {
            let mut tracker = self.tracker();
            if tracker.closing {
                drop(tracker);
                warn!("storage shutdown in progress; not starting a connection campaign");
                return Step::Finished(false);
            }
            let current = tracker.state;
            match current {
                ConnectionState::Connected if self.driver.is_ready() => {
                    drop(tracker);
                    debug!("storage already connected; skipping campaign");
                    return Step::Finished(true);
                }
                ConnectionState::Connecting => {
                    drop(tracker);
                    warn!("a storage connection campaign is already running");
                    return Step::Finished(false);
                }
                _ => {}
            }

            tracker.attempts = 0;
            tracker.backoff.reset(&self.policy);
            self.set_state(&mut tracker, ConnectionState::Connecting);
        }

        info!(
            host = %self.host,
            max_attempts = self.policy.max_attempts,
            "connecting to storage"
        );
        self.next_attempt()
    }

    fn next_attempt(&self) -> Step {
        let mut tracker = self.tracker();
        if tracker.closing {
            drop(tracker);
            info!("storage shutdown began; abandoning connection campaign");
            return Step::Finished(false);
        }
        if tracker.state == ConnectionState::Connected {
            tracker.attempts = 0;
            tracker.backoff.reset(&self.policy);
            drop(tracker);
            info!("storage connection reported by driver; ending campaign");
            return Step::Finished(true);
        }

        tracker.attempts = (tracker.attempts + 1).min(self.policy.max_attempts);
        Step::Attempt(tracker.attempts)
    }

    fn record_attempt(&self, attempt: u32, outcome: Result<(), StorageError>) -> Step {
        let max_attempts = self.policy.max_attempts;
        let mut tracker = self.tracker();

        if tracker.closing {
            drop(tracker);
            if outcome.is_ok() {
                return Step::CloseLate(attempt);
            }
            info!(attempt, "storage shutdown began; abandoning connection campaign");
            return Step::Finished(false);
        }

        let err = match outcome {
            Ok(()) => {
                tracker.attempts = 0;
                tracker.backoff.reset(&self.policy);
                self.set_state(&mut tracker, ConnectionState::Connected);
                drop(tracker);
                info!(attempt, host = %self.host, "connected to storage");
                return Step::Finished(true);
            }
            Err(err) => err,
        };

        if tracker.state == ConnectionState::Connected {
            tracker.attempts = 0;
            tracker.backoff.reset(&self.policy);
            drop(tracker);
            info!(
                attempt,
                error = %err,
                "storage attempt failed but the driver already reported a connection"
            );
            return Step::Finished(true);
        }

        if attempt >= max_attempts {
            self.set_state(&mut tracker, ConnectionState::Disconnected);
            drop(tracker);
            error!(
                attempts = attempt,
                host = %self.host,
                error = %err,
                "storage connection attempts exhausted; continuing in degraded mode"
            );
            return Step::Finished(false);
        }

        let wait = tracker.backoff.advance(&self.policy);
        let next_wait = tracker.backoff.current();
        drop(tracker);
        warn!(
            attempt,
            max_attempts,
            wait_ms = wait.as_millis() as u64,
            next_wait_ms = next_wait.as_millis() as u64,
            error = %err,
            "storage connection attempt failed; retrying"
        );
        Step::Wait(wait)
    }

    /// Close a connection that an in-flight attempt opened after shutdown had
    /// already closed the driver.
    async fn close_late_connection(&self, attempt: u32) {
        info!(attempt, "storage connected after shutdown began; closing it");
        match self.driver.close().await {
            Ok(()) => info!(attempt, "late storage connection closed"),
            Err(StorageError::NotConnected) => {
                debug!(attempt, "late storage connection already gone")
            }
            Err(err) => error!(attempt, error = %err, "failed to close late storage connection"),
        }
    }

    /// Re-derive the state from the driver after notifications were dropped.
    fn resync_after_lag(&self) {
        let (previous, next) = {
            let mut tracker = self.tracker();
            if tracker.closing {
                return;
            }
            let ready = self.driver.is_ready();
            let next = match tracker.state {
                ConnectionState::Connected if !ready => ConnectionState::Disconnected,
                ConnectionState::Disconnected if ready => ConnectionState::Connected,
                current => current,
            };
            (self.set_state(&mut tracker, next), next)
        };

        if previous != next {
            info!(
                from = previous.as_str(),
                to = next.as_str(),
                "storage state resynchronized from driver"
            );
        }
    }

    /// Fold a driver notification into the tracked state. Returns `false` once
    /// the listener should stop.
    fn apply_event(&self, event: DriverEvent) -> bool {
        let (previous, next, keep_listening) = {
            let mut tracker = self.tracker();
            if tracker.closed {
                return false;
            }

            let current = tracker.state;
            let next = if tracker.closing {
                current
            } else {
                match (&event, current) {
                    (DriverEvent::Connected | DriverEvent::Reconnected, _) => {
                        ConnectionState::Connected
                    }
                    (DriverEvent::Error(_), ConnectionState::Connected)
                        if self.driver.is_ready() =>
                    {
                        ConnectionState::Connected
                    }
                    (
                        DriverEvent::Error(_) | DriverEvent::Disconnected | DriverEvent::Close,
                        ConnectionState::Connected,
                    ) => ConnectionState::Disconnected,
                    _ => current,
                }
            };
            let keep_listening = !(tracker.closing && event == DriverEvent::Close);
            let previous = self.set_state(&mut tracker, next);
            (previous, next, keep_listening)
        };

        let from = previous.as_str();
        let to = next.as_str();
        match &event {
            DriverEvent::Error(message) => {
                warn!(error = %message, from, to, "storage driver reported an error")
            }
            DriverEvent::Disconnected => warn!(from, to, "storage connection lost"),
            DriverEvent::Connected | DriverEvent::Reconnected => {
                info!(event = event.name(), from, to, "storage connection available")
            }
            DriverEvent::Close => info!(from, to, "storage connection closed by driver"),
        }

        keep_listening
    }

    /// Claim the one-shot shutdown. Returns `false` if it was already claimed.
    fn begin_shutdown(&self) -> bool {
        let mut tracker = self.tracker();
        if tracker.closing {
            return false;
        }
        tracker.closing = true;
        self.set_state(&mut tracker, ConnectionState::Disconnecting);
        true
    }

    fn finish_shutdown(&self) {
        let mut tracker = self.tracker();
        tracker.closed = true;
        self.set_state(&mut tracker, ConnectionState::Disconnected);
    }
}
