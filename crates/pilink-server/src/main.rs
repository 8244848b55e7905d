//! # pilink-server
//!
//! HTTP server driving a Raspberry Pi over Bluetooth LE.
//!
//! This binary provides:
//! - Continuous discovery of nearby peers
//! - REST API to select, connect and send `emit` / `wifi`
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development (in-memory backend with a demo Pi)
//! cargo run --package pilink-server --no-default-features
//!
//! # On the device
//! PILINK_CONFIG=/etc/pilink/config.toml ./pilink-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use pilink_core::{ingest, Config, ConnectionEvent, Scanner, SCAN_CHANNEL_CAPACITY};
use pilink_server::api::create_router;
use pilink_server::logging;
use pilink_server::state::{run_event_pump, AppState, SharedState};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Environment variable pointing at the configuration file.
const CONFIG_PATH_ENV: &str = "PILINK_CONFIG";

type Backend = (
    SharedState,
    mpsc::Receiver<ConnectionEvent>,
    Option<Box<dyn Scanner>>,
);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os(CONFIG_PATH_ENV)
        .map_or_else(pilink_core::default_config_path, PathBuf::from);
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    logging::init(&config.logging)?;
    info!(config = %config_path.display(), "Starting pilink-server");

    let addr = SocketAddr::new(config.server.bind_address, config.server.port);
    let (state, events, scanner) = backend(config).await;

    tokio::spawn(run_event_pump(state.clone(), events));

    let scan = match scanner {
        Some(scanner) => start_scan(&state, scanner.as_ref()).await,
        None => None,
    };

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());
    let app = create_router(state.clone()).layer(middleware);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    if let Some(scan) = scan {
        scan.stop();
    }
    state.controller.lock().await.shutdown().await;

    Ok(())
}

#[cfg(feature = "bluetooth")]
async fn backend(config: Config) -> Backend {
    use pilink_core::{BluerScanner, BluerTransport, DeviceDirectory};

    match pilink_core::open_adapter(config.bluetooth.adapter.as_deref()).await {
        Ok(adapter) => {
            let filter = config
                .bluetooth
                .filter_by_service
                .then_some(config.bluetooth.service_uuid);
            let scanner: Box<dyn Scanner> = Box::new(BluerScanner::new(adapter.clone(), filter));
            let transport = Arc::new(BluerTransport::new(adapter));
            let (state, events) =
                AppState::new(config, DeviceDirectory::shared(), transport, true);
            (state, events, Some(scanner))
        }
        Err(err) => {
            warn!(error = %err, "Bluetooth unavailable, serving without it");
            let (state, events) = AppState::unavailable(config, err.to_string());
            state.notify(false, err.user_message());
            (state, events, None)
        }
    }
}

#[cfg(not(feature = "bluetooth"))]
async fn backend(config: Config) -> Backend {
    use pilink_core::{DeviceDirectory, MockPeer, MockScanner, MockTransport};

    warn!("Built without Bluetooth support, using the in-memory backend");
    let transport = MockTransport::with_peers([MockPeer::pi("B8:27:EB:00:00:01")]);
    let scanner: Box<dyn Scanner> = Box::new(MockScanner::from_transport(&transport));
    let (state, events) =
        AppState::new(config, DeviceDirectory::shared(), Arc::new(transport), true);
    (state, events, Some(scanner))
}

async fn start_scan(
    state: &SharedState,
    scanner: &dyn Scanner,
) -> Option<pilink_core::ScanHandle> {
    let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);

    let notifier = state.clone();
    tokio::spawn(ingest(state.directory.clone(), rx, move |err| {
        notifier.notify(false, err.user_message());
    }));

    match scanner.start(tx).await {
        Ok(handle) => Some(handle),
        Err(err) => {
            error!(error = %err, "Failed to start scanning");
            state.notify(false, err.user_message());
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
