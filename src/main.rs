//! Secure Cache Proxy
//!
//! A caching forward proxy built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                  FORWARD PROXY                   │
//!     Client Request     │  ┌────────┐    ┌────────────┐    ┌───────────┐   │
//!     ───────────────────┼─▶│  http  │───▶│ dispatcher │───▶│   cache   │   │
//!                        │  │ server │    └─────┬──────┘    │ (on disk) │   │
//!                        │  └────────┘          │ miss      └───────────┘   │
//!                        │       ▲              ▼                           │
//!                        │       │       ┌────────────┐    ┌───────────┐    │
//!     Client Response    │       │       │  redirect  │───▶│ connector │────┼──── Origin
//!     ◀──────────────────┼───────┘       │  resolver  │    │ https→http│    │     Server
//!                        │  (allow-listed└────────────┘    └───────────┘    │
//!                        │    headers)                                      │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use secure_cache_proxy::config::loader::{read_config, ConfigError};
use secure_cache_proxy::config::validation::validate_config;
use secure_cache_proxy::lifecycle::{self, StartupError};
use secure_cache_proxy::observability::logging;
use secure_cache_proxy::ProxyConfig;

#[derive(Parser, Debug)]
#[command(name = "secure-cache-proxy")]
#[command(about = "Caching forward proxy that prefers HTTPS origins", long_about = None)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (1025-65535), overriding the configured bind port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Console verbosity: 0 errors, 1 info, 2 debug, 3 headers.
    #[arg(short, long)]
    verbosity: Option<u8>,

    /// Cache root directory.
    #[arg(long)]
    cache_dir: Option<String>,
}

impl Args {
    fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ProxyConfig::default(),
        };
        if let Some(port) = self.port {
            config.listener.set_port(port);
        }
        if let Some(verbosity) = self.verbosity {
            config.observability.verbosity = verbosity;
        }
        if let Some(root) = self.cache_dir {
            config.cache.root = root;
        }
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let args = Args::parse();
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(0);
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    logging::init_logging(config.observability.verbosity);
    tracing::info!("secure-cache-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    lifecycle::start(config).await
}
