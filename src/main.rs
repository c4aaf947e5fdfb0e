use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dbpool::backend::{AnyConnector, Connector};
use dbpool::config::Settings;
use dbpool::metrics::encode_metrics;
use dbpool::pool::ConnectionPool;
use dbpool::tasks::ProbeTask;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    let option = settings.pool.to_option()?;
    tracing::info!(pool = %option.name(), "Configuration loaded");

    // Create connector and pool
    let connector = AnyConnector::from_config(&settings.backend)?;
    tracing::info!(
        backend = connector.kind(),
        target = %connector.describe(),
        "Connector initialized"
    );
    let pool = ConnectionPool::new(option, connector).await?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start probe task in background
    let probe_handle = if settings.probe.enabled {
        let probe_task = ProbeTask::new(
            pool.clone(),
            Duration::from_secs(settings.probe.interval_seconds.max(1)),
            shutdown_tx.subscribe(),
        );
        Some(tokio::spawn(async move {
            probe_task.run().await;
        }))
    } else {
        None
    };

    shutdown_signal_handler(shutdown_tx).await;

    // Wait for background tasks to finish
    tracing::info!("Waiting for background tasks to finish...");
    if let Some(handle) = probe_handle {
        let _ = handle.await;
    }

    pool.close().await;

    let stats = pool.stats();
    tracing::info!(
        created = stats.created,
        reused = stats.reused,
        discarded = stats.discarded,
        reconnects = stats.reconnects,
        exhausted = stats.exhausted,
        "Pool closed"
    );
    match encode_metrics() {
        Ok(text) => tracing::debug!(metrics = %text, "Final metrics"),
        Err(e) => tracing::warn!(error = %e, "Failed to encode metrics"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    let _ = shutdown_tx.send(());
}
