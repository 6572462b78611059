//! Relay process entry point.

use std::sync::Arc;

use dispatcher::{CommitDispatcher, DispatcherConfig, PostgresQueueTransport};
use event_store::{DispatchingEventStore, PostgresEventStore};
use relay::{LogFormat, Relay, RelayConfig, RelayError};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    // 1. Configuration and tracing
    let config = RelayConfig::from_env()?;
    init_tracing(config.log_format);
    let dispatch_config = DispatcherConfig::from_env();

    // 2. Prometheus exporter
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(config.metrics_addr)
        .install()?;
    tracing::info!(addr = %config.metrics_addr, "metrics exporter listening");

    // 3. Event log
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    let log = PostgresEventStore::new(pool.clone());
    log.run_migrations().await?;

    // 4. Dispatcher over the outbound queue
    let transport = PostgresQueueTransport::new(pool, dispatch_config.queue_name.clone());
    tracing::info!(queue = transport.queue(), "dispatching to outbound queue");
    let (dispatcher, worker) =
        CommitDispatcher::spawn(transport, dispatch_config, Arc::new(log.clone()));
    let store = DispatchingEventStore::new(log, Arc::new(dispatcher));

    // 5. Redeliver until told to stop, then drain the dispatch queue
    let relay = Relay::new(store, config.poll_interval);
    relay.run_until(shutdown_signal()).await;
    drop(relay);
    worker.shutdown().await?;

    tracing::info!("relay shut down gracefully");
    Ok(())
}
