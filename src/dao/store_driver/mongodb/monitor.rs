//! Translation of MongoDB SDAM heartbeats into [`DriverEvent`]s.

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use mongodb::event::{EventHandler, sdam::SdamEvent};
use tokio::sync::broadcast;
use tracing::debug;

use crate::dao::store_driver::DriverEvent;

/// Outcome of a server heartbeat, stripped of driver types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Heartbeat {
    Succeeded { address: String },
    Failed { address: String, failure: String },
}

/// Readiness tracking shared between the driver and its SDAM callbacks.
///
/// Every client built for an attempt gets a generation number; callbacks of
/// clients that were abandoned or closed carry a stale generation and are dropped.
///
/// The driver counts as ready while at least one server of the live client
/// answers its heartbeats. A single failing replica-set member only reports
/// an error.
pub(super) struct HeartbeatMonitor {
    generation: AtomicU64,
    installed: AtomicU64,
    ready: AtomicBool,
    reachable: Mutex<HashSet<String>>,
    events: broadcast::Sender<DriverEvent>,
}

impl HeartbeatMonitor {
    pub(super) fn new(events: broadcast::Sender<DriverEvent>) -> Self {
        Self {
            generation: AtomicU64::new(0),
            installed: AtomicU64::new(0),
            ready: AtomicBool::new(false),
            reachable: Mutex::new(HashSet::new()),
            events,
        }
    }

    /// Reserve a generation for a client about to be built.
    pub(super) fn begin_attempt(&self) -> u64 {
        let mut reachable = self.reachable();
        reachable.clear();
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// SDAM handler bound to `generation`.
    pub(super) fn handler(self: &Arc<Self>, generation: u64) -> EventHandler<SdamEvent> {
        let monitor = Arc::clone(self);
        EventHandler::callback(move |event: SdamEvent| match event {
            SdamEvent::ServerHeartbeatSucceeded(succeeded) => monitor.observe(
                generation,
                Heartbeat::Succeeded {
                    address: succeeded.server_address.to_string(),
                },
            ),
            SdamEvent::ServerHeartbeatFailed(failed) => monitor.observe(
                generation,
                Heartbeat::Failed {
                    address: failed.server_address.to_string(),
                    failure: failed.failure.to_string(),
                },
            ),
            _ => {}
        })
    }

    /// The client of `generation` answered its ping and is now the live one.
    pub(super) fn mark_connected(&self, generation: u64) {
        self.installed.store(generation, Ordering::Release);
        self.ready.store(true, Ordering::Release);
        self.emit(DriverEvent::Connected);
    }

    /// Invalidate every outstanding client so their heartbeats are ignored.
    pub(super) fn retire(&self) {
        let mut reachable = self.reachable();
        reachable.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.installed.store(0, Ordering::Release);
        self.ready.store(false, Ordering::Release);
    }

    pub(super) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn reachable(&self) -> MutexGuard<'_, HashSet<String>> {
        self.reachable.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn emit(&self, event: DriverEvent) {
        // No subscriber simply means nobody is listening yet.
        let _ = self.events.send(event);
    }

    pub(super) fn observe(&self, generation: u64, heartbeat: Heartbeat) {
        let mut reachable = self.reachable();
        if generation != self.generation.load(Ordering::Acquire) {
            drop(reachable);
            debug!(generation, "ignoring heartbeat from a retired client");
            return;
        }

        let installed = self.installed.load(Ordering::Acquire) == generation;
        let events = match heartbeat {
            Heartbeat::Failed { address, failure } => {
                reachable.remove(&address);
                let mut events = vec![DriverEvent::Error(format!("{address}: {failure}"))];
                if reachable.is_empty() && self.ready.swap(false, Ordering::AcqRel) {
                    events.push(DriverEvent::Disconnected);
                }
                events
            }
            Heartbeat::Succeeded { address } => {
                reachable.insert(address);
                if installed && !self.ready.swap(true, Ordering::AcqRel) {
                    vec![DriverEvent::Reconnected]
                } else {
                    Vec::new()
                }
            }
        };
        drop(reachable);

        for event in events {
            self.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> (Arc<HeartbeatMonitor>, broadcast::Receiver<DriverEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (Arc::new(HeartbeatMonitor::new(tx)), rx)
    }

    fn drain(rx: &mut broadcast::Receiver<DriverEvent>) -> Vec<DriverEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn up(address: &str) -> Heartbeat {
        Heartbeat::Succeeded {
            address: address.into(),
        }
    }

    fn down(address: &str) -> Heartbeat {
        Heartbeat::Failed {
            address: address.into(),
            failure: "timed out".into(),
        }
    }

    #[test]
    fn heartbeats_before_install_do_not_report_reconnect() {
        let (monitor, mut rx) = monitor();
        let generation = monitor.begin_attempt();

        monitor.observe(generation, up("db:27017"));
        assert!(drain(&mut rx).is_empty());
        assert!(!monitor.is_ready());
    }

    #[test]
    fn failure_then_success_reports_drop_and_recovery() {
        let (monitor, mut rx) = monitor();
        let generation = monitor.begin_attempt();
        monitor.observe(generation, up("db:27017"));
        monitor.mark_connected(generation);

        monitor.observe(generation, down("db:27017"));
        monitor.observe(generation, down("db:27017"));
        assert!(!monitor.is_ready());
        monitor.observe(generation, up("db:27017"));
        monitor.observe(generation, up("db:27017"));

        assert_eq!(
            drain(&mut rx),
            vec![
                DriverEvent::Connected,
                DriverEvent::Error("db:27017: timed out".into()),
                DriverEvent::Disconnected,
                DriverEvent::Error("db:27017: timed out".into()),
                DriverEvent::Reconnected,
            ]
        );
        assert!(monitor.is_ready());
    }

    #[test]
    fn failing_member_does_not_flap_while_another_answers() {
        let (monitor, mut rx) = monitor();
        let generation = monitor.begin_attempt();
        monitor.observe(generation, up("db-a:27017"));
        monitor.mark_connected(generation);
        drain(&mut rx);

        for _ in 0..3 {
            monitor.observe(generation, down("db-c:27017"));
            monitor.observe(generation, up("db-a:27017"));
            assert!(monitor.is_ready());
        }

        assert_eq!(
            drain(&mut rx),
            vec![DriverEvent::Error("db-c:27017: timed out".into()); 3]
        );

        monitor.observe(generation, down("db-a:27017"));
        assert!(!monitor.is_ready());
        assert_eq!(
            drain(&mut rx),
            vec![
                DriverEvent::Error("db-a:27017: timed out".into()),
                DriverEvent::Disconnected,
            ]
        );
    }

    #[test]
    fn retired_generation_is_ignored() {
        let (monitor, mut rx) = monitor();
        let generation = monitor.begin_attempt();
        monitor.mark_connected(generation);
        drain(&mut rx);

        monitor.retire();
        monitor.observe(generation, down("gone:27017"));
        monitor.observe(generation, up("gone:27017"));

        assert!(drain(&mut rx).is_empty());
        assert!(!monitor.is_ready());
    }
}
