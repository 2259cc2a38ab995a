//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the metrics endpoint when enabled
//! - Bind the listener
//! - Hand the listener to the HTTP server, which prepares the cache first
//!
//! # Design Decisions
//! - Configuration arrives validated; startup does not re-check it
//! - Subsystems initialize in order, not concurrently

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::cache::CacheError;
use crate::config::loader::ConfigError;
use crate::config::ProxyConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("TLS client setup failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("cache preparation failed: {0}")]
    Cache(#[from] CacheError),

    #[error("metrics endpoint failed: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("invalid metrics address `{0}`")]
    MetricsAddress(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the proxy until Ctrl+C.
pub async fn start(config: ProxyConfig) -> Result<(), StartupError> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        cache_root = %config.cache.root,
        secure_retry_limit = config.proxy.secure_retry_limit,
        verbosity = config.observability.verbosity,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    shutdown.clone().trigger_on_ctrl_c();

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
