//! In-memory driver with a scripted connection outcome.

use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::{
    sync::broadcast,
    time::{Instant, sleep},
};

use crate::dao::{
    storage::{StorageError, StorageResult},
    store_driver::{DriverEvent, StoreDriver},
};

#[derive(Clone)]
pub(crate) struct ScriptedDriver {
    inner: Arc<Script>,
}

struct Script {
    succeed_on: Option<u32>,
    connect_delay: Duration,
    close_delay: Duration,
    close_fails: bool,
    connects: Mutex<Vec<Instant>>,
    closes: AtomicU32,
    ready: AtomicBool,
    events: broadcast::Sender<DriverEvent>,
}

impl ScriptedDriver {
    /// Every attempt fails.
    pub(crate) fn failing() -> Self {
        Self::build(None, Duration::ZERO, Duration::ZERO, false)
    }

    /// Attempts fail until the 1-indexed `attempt`, which succeeds.
    pub(crate) fn succeeding_on(attempt: u32) -> Self {
        Self::build(Some(attempt), Duration::ZERO, Duration::ZERO, false)
    }

    pub(crate) fn with_connect_delay(self, delay: Duration) -> Self {
        Self::build(self.inner.succeed_on, delay, self.inner.close_delay, self.inner.close_fails)
    }

    pub(crate) fn with_close_delay(self, delay: Duration) -> Self {
        Self::build(self.inner.succeed_on, self.inner.connect_delay, delay, self.inner.close_fails)
    }

    pub(crate) fn with_failing_close(self) -> Self {
        Self::build(self.inner.succeed_on, self.inner.connect_delay, self.inner.close_delay, true)
    }

    fn build(
        succeed_on: Option<u32>,
        connect_delay: Duration,
        close_delay: Duration,
        close_fails: bool,
    ) -> Self {
        let (events, _rx) = broadcast::channel(16);
        Self {
            inner: Arc::new(Script {
                succeed_on,
                connect_delay,
                close_delay,
                close_fails,
                connects: Mutex::new(Vec::new()),
                closes: AtomicU32::new(0),
                ready: AtomicBool::new(false),
                events,
            }),
        }
    }

    /// Instants at which each connection attempt started.
    pub(crate) fn connect_times(&self) -> Vec<Instant> {
        self.inner.connects.lock().unwrap().clone()
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.inner.connects.lock().unwrap().len()
    }

    /// Waits observed between consecutive attempts.
    pub(crate) fn waits(&self) -> Vec<Duration> {
        self.connect_times()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    pub(crate) fn close_count(&self) -> u32 {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.inner.ready.store(ready, Ordering::SeqCst);
    }

    /// Push a driver notification as if it came from the database client.
    pub(crate) fn emit(&self, event: DriverEvent) {
        match event {
            DriverEvent::Connected | DriverEvent::Reconnected => self.set_ready(true),
            DriverEvent::Disconnected | DriverEvent::Close => self.set_ready(false),
            DriverEvent::Error(_) => {}
        }
        let _ = self.inner.events.send(event);
    }
}

impl StoreDriver for ScriptedDriver {
    fn connect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let script = Arc::clone(&self.inner);
        Box::pin(async move {
            let attempt = {
                let mut connects = script.connects.lock().unwrap();
                connects.push(Instant::now());
                connects.len() as u32
            };
            if !script.connect_delay.is_zero() {
                sleep(script.connect_delay).await;
            }

            if script.succeed_on == Some(attempt) {
                script.ready.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(StorageError::unavailable(
                    format!("attempt {attempt} refused"),
                    io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
                ))
            }
        })
    }

    fn close(&self) -> BoxFuture<'static, StorageResult<()>> {
        let script = Arc::clone(&self.inner);
        Box::pin(async move {
            script.closes.fetch_add(1, Ordering::SeqCst);
            if !script.close_delay.is_zero() {
                sleep(script.close_delay).await;
            }
            script.ready.store(false, Ordering::SeqCst);
            let _ = script.events.send(DriverEvent::Close);

            if script.close_fails {
                Err(StorageError::unavailable(
                    "close failed".into(),
                    io::Error::new(io::ErrorKind::BrokenPipe, "socket already gone"),
                ))
            } else {
                Ok(())
            }
        })
    }

    fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.inner.events.subscribe()
    }
}
