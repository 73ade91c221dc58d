//! Tankflow server - main entry point

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tankflow_common::logging::{init_logging, LogConfig};
use tokio::signal;
use tokio::sync::watch;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::info;

use tankflow_ingest::ledger::FileLedger;
use tankflow_ingest::mqtt::MqttPublisher;
use tankflow_ingest::scheduler;
use tankflow_ingest::sftp::SftpSource;
use tankflow_ingest::store::StateStore;
use tankflow_ingest::sync::SyncEngine;
use tankflow_server::config::ServerConfig;
use tankflow_server::routes::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over the built-in defaults
    let log_config = LogConfig::from_env()
        .unwrap_or_default()
        .with_filter("tankflow_server=debug,tankflow_ingest=debug,tower_http=debug");
    init_logging(&log_config)?;

    info!("Starting tankflow server");

    let server_config = ServerConfig::load()?;
    let ingest_config = tankflow_ingest::Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        server_config.host, server_config.port
    );

    let ledger = FileLedger::load(&ingest_config.ledger_path)?;
    let store = Arc::new(StateStore::new());
    let source = Arc::new(SftpSource::new(ingest_config.sftp.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut engine = SyncEngine::new(
        source,
        Arc::clone(&store),
        ledger,
        ingest_config.remote_path.clone(),
        ingest_config.mqtt.topic_prefix.clone(),
    );

    let mqtt_handle = if ingest_config.mqtt_enabled {
        let (publisher, handle) = MqttPublisher::start(&ingest_config.mqtt, shutdown_rx.clone());
        engine = engine.with_publisher(publisher);
        info!(
            "MQTT publishing enabled ({}:{})",
            ingest_config.mqtt.host, ingest_config.mqtt.port
        );
        Some(handle)
    } else {
        info!("MQTT publishing disabled (MQTT_ENABLED=false)");
        None
    };

    let (refresh, scheduler_handle) = scheduler::start(
        Arc::new(engine),
        Duration::from_secs(ingest_config.poll_interval_secs),
        shutdown_rx,
    );
    info!(
        "Sync scheduler started, polling every {} seconds",
        ingest_config.poll_interval_secs
    );

    let state = AppState {
        store,
        refresh,
        poll_interval_secs: ingest_config.poll_interval_secs,
    };

    let app = routes::router(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(server_config.shutdown_timeout_secs))
        .await?;

    // Stop the background tasks and wait for in-flight work to finish
    let _ = shutdown_tx.send(true);
    scheduler_handle.await?;
    if let Some(handle) = mqtt_handle {
        handle.await?;
    }

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give ongoing requests time to complete
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
