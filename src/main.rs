//! Policy Portal Back binary entrypoint wiring the storage connection lifecycle and the health server.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use policy_portal_back::{
    config::AppConfig,
    dao::store_driver::mongodb::MongoDriver,
    lifecycle::{ConnectionManager, ShutdownSignal},
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let driver = MongoDriver::new(config.target.clone());
    let connection = ConnectionManager::new(Arc::new(driver), config.target, config.retry);
    connection.register_event_handlers();

    // The campaign runs in the background; the server answers health checks meanwhile.
    tokio::spawn({
        let connection = connection.clone();
        async move {
            if !connection.ensure_connected().await {
                warn!("storage unavailable; serving in degraded mode");
            }
        }
    });

    let app_state = AppState::new(connection.clone());
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal(connection.clone()))
        .await
        .context("serving axum")?;

    connection.shutdown(ShutdownSignal::Requested).await;
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for the first Ctrl+C or SIGTERM, close storage, and let the server drain.
///
/// Every later signal is forwarded to the connection manager as well; only the
/// first one closes anything.
async fn shutdown_signal(connection: ConnectionManager) {
    let signal = next_signal().await;
    connection.shutdown(signal).await;

    tokio::spawn(async move {
        loop {
            let signal = next_signal().await;
            connection.shutdown(signal).await;
        }
    });
}

async fn next_signal() -> ShutdownSignal {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                _ = tokio::signal::ctrl_c() => ShutdownSignal::Interrupt,
                _ = term.recv() => ShutdownSignal::Terminate,
            },
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; listening for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
                ShutdownSignal::Interrupt
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        ShutdownSignal::Interrupt
    }
}
