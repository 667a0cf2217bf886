//! Gatewarden API Gateway
//!
//! A single long-lived process enforcing distributed rate limiting and IP
//! reputation on every request before forwarding allowed traffic to the
//! backend service. Refused traffic surfaces as abuse events on the
//! partitioned event log.

use gatewarden_common::{config::Config, db, redis, telemetry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

mod events;
mod handlers;
mod middleware;
mod models;
mod repository;
mod services;

#[cfg(test)]
mod tests;

use events::{AbuseEventHandler, EventConsumer, EventProducer};
use repository::AbuseEventRepository;

const SERVICE_NAME: &str = "gateway";
const CONSUMER_GROUP: &str = "abuse-detectors";

/// Application error type for main
#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Initialization error: {0}")]
    Init(#[from] gatewarden_common::error::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::load()?;
    telemetry::init(SERVICE_NAME, &config)?;

    info!(
        service = SERVICE_NAME,
        version = env!("CARGO_PKG_VERSION"),
        "Starting service"
    );

    // Postgres is a mirror for reputation and events; run without it when
    // unreachable.
    let db_pool = match db::create_pool(&config).await {
        Ok(pool) => {
            if let Err(e) = db::init_schema(&pool).await {
                warn!(error = %e, "Schema initialization failed");
            }
            Some(pool)
        }
        Err(e) => {
            warn!(error = %e, "PostgreSQL connection failed, running without database");
            None
        }
    };

    // Without Redis the rate-limit gate fails open.
    let redis_pool = match redis::create_pool(&config).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!(error = %e, "Redis connection failed, rate limiting will fail open");
            None
        }
    };

    // Abuse-event publication is best effort.
    let producer = match EventProducer::new(&config.kafka_brokers, &config.kafka_topic) {
        Ok(producer) => Some(Arc::new(producer)),
        Err(e) => {
            warn!(error = %e, "Kafka producer creation failed, abuse events will be dropped");
            None
        }
    };

    let app_state = services::AppState::new(
        db_pool.clone(),
        redis_pool,
        producer,
        config.clone(),
    );

    // Steady-state reads never hit Postgres; hydrate once at startup.
    if let Err(e) = app_state.reputation.load_from_store().await {
        warn!(error = %e, "Failed to reload reputation state from store");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handler = AbuseEventHandler::new(db_pool.map(AbuseEventRepository::new));
    let consumer_handle = match EventConsumer::new(
        &config.kafka_brokers,
        &config.kafka_topic,
        CONSUMER_GROUP,
        handler,
    ) {
        Ok(consumer) => Some(consumer.start(shutdown_rx.clone())),
        Err(e) => {
            warn!(error = %e, "Kafka consumer creation failed, events will not be drained");
            None
        }
    };

    let http_addr: SocketAddr = config.http_addr().parse()?;
    let router = handlers::http::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    info!(addr = %http_addr, "HTTP server listening");

    let server_shutdown_rx = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let mut rx = server_shutdown_rx;
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
    });

    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");

    if let Err(e) = shutdown_tx.send(true) {
        warn!(error = %e, "Failed to send shutdown signal");
    }

    // Drain in-flight requests, then force-close.
    let shutdown_timeout = Duration::from_secs(30);
    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("HTTP server shutdown complete"),
                Ok(Err(e)) => error!(error = %e, "HTTP server error during shutdown"),
                Err(e) => error!(error = %e, "HTTP server task panicked"),
            }
        }
        _ = tokio::time::sleep(shutdown_timeout) => {
            warn!("HTTP server shutdown timed out");
        }
    }

    if let Some(handle) = consumer_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!("Event consumer shutdown timed out");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signals (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C signal"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGTERM signal"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
