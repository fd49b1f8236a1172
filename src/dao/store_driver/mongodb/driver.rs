use std::{future::IntoFuture, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use mongodb::{
    Client,
    bson::doc,
    options::{ClientOptions, Tls, TlsOptions},
};
use tokio::{
    sync::{RwLock, broadcast},
    time::timeout,
};
use tracing::{debug, info};

use super::{
    error::{MongoDriverError, MongoResult},
    monitor::HeartbeatMonitor,
};
use crate::{
    config::StoreTarget,
    dao::{
        storage::StorageResult,
        store_driver::{DriverEvent, EVENT_CHANNEL_CAPACITY, StoreDriver},
    },
};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// MongoDB-backed [`StoreDriver`].
#[derive(Clone)]
pub struct MongoDriver {
    inner: Arc<MongoDriverInner>,
}

struct MongoDriverInner {
    target: StoreTarget,
    client: RwLock<Option<Client>>,
    monitor: Arc<HeartbeatMonitor>,
    events: broadcast::Sender<DriverEvent>,
}

impl MongoDriver {
    /// Build a driver for `target`. Nothing touches the network until
    /// [`StoreDriver::connect`] runs.
    pub fn new(target: StoreTarget) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let monitor = Arc::new(HeartbeatMonitor::new(events.clone()));
        Self {
            inner: Arc::new(MongoDriverInner {
                target,
                client: RwLock::new(None),
                monitor,
                events,
            }),
        }
    }
}

impl MongoDriverInner {
    async fn client_options(&self, generation: u64) -> MongoResult<ClientOptions> {
        let target = &self.target;
        let mut options = ClientOptions::parse(&target.uri)
            .await
            .map_err(|source| MongoDriverError::InvalidUri {
                host: target.host(),
                source,
            })?;

        options.app_name = Some(target.app_name.clone());
        options.max_pool_size = Some(target.max_pool_size);
        options.server_selection_timeout = Some(target.server_selection_timeout);
        options.connect_timeout = Some(target.connect_timeout);
        options.max_idle_time = Some(target.socket_idle_timeout);
        if target.require_tls && !matches!(options.tls, Some(Tls::Enabled(_))) {
            options.tls = Some(Tls::Enabled(TlsOptions::default()));
        }
        options.sdam_event_handler = Some(self.monitor.handler(generation));

        Ok(options)
    }

    async fn connect(&self) -> MongoResult<()> {
        let generation = self.monitor.begin_attempt();
        let options = self.client_options(generation).await?;
        let client = Client::with_options(options)
            .map_err(|source| MongoDriverError::ClientConstruction { source })?;

        client
            .database(&self.target.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDriverError::Ping {
                database: self.target.database.clone(),
                source,
            })?;

        let previous = {
            let mut guard = self.client.write().await;
            guard.replace(client)
        };
        self.monitor.mark_connected(generation);
        info!(host = %self.target.host(), generation, "MongoDB client installed");

        if let Some(previous) = previous {
            debug!("shutting down superseded MongoDB client");
            previous.shutdown().await;
        }

        Ok(())
    }

    async fn close(&self) -> MongoResult<()> {
        let client = {
            let mut guard = self.client.write().await;
            guard.take()
        };
        let Some(client) = client else {
            return Err(MongoDriverError::NotConnected);
        };

        self.monitor.retire();
        let outcome = timeout(CLOSE_TIMEOUT, client.shutdown().into_future()).await;
        self.monitor.emit(DriverEvent::Close);

        outcome.map_err(|_| MongoDriverError::CloseTimedOut {
            timeout_ms: CLOSE_TIMEOUT.as_millis(),
        })
    }
}

impl StoreDriver for MongoDriver {
    fn connect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let driver = self.clone();
        Box::pin(async move { driver.inner.connect().await.map_err(Into::into) })
    }

    fn close(&self) -> BoxFuture<'static, StorageResult<()>> {
        let driver = self.clone();
        Box::pin(async move { driver.inner.close().await.map_err(Into::into) })
    }

    fn is_ready(&self) -> bool {
        self.inner.monitor.is_ready()
    }

    fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.inner.events.subscribe()
    }
}
