//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (listen port, verbosity, budgets, timeouts)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::ops::RangeInclusive;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// Ports the proxy may listen on.
pub const PORT_RANGE: RangeInclusive<u16> = 1025..=65535;

/// Highest console verbosity level.
pub const MAX_VERBOSITY: u8 = 3;

/// Longest synthesized cache lifetime, ten years.
pub const MAX_DEFAULT_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("listen port {0} is outside {min}..={max}", min = PORT_RANGE.start(), max = PORT_RANGE.end())]
    PortOutOfRange(u16),

    #[error("listener.max_connections must be at least 1")]
    NoConnections,

    #[error("observability.verbosity {0} exceeds {max}", max = MAX_VERBOSITY)]
    Verbosity(u8),

    #[error("proxy.secure_retry_limit must be at least 1")]
    SecureRetryLimit,

    #[error("proxy.max_body_bytes must be positive")]
    MaxBodyBytes,

    #[error("cache.root must not be empty")]
    CacheRoot,

    #[error("cache.default_ttl_secs {0} must be between 1 and {max}", max = MAX_DEFAULT_TTL_SECS)]
    DefaultTtl(u64),

    #[error("cache.lock_stripes must be at least 1")]
    LockStripes,

    #[error("timeouts.{0} must be positive")]
    Timeout(&'static str),

    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.listener.bind_address.parse::<SocketAddr>() {
        Ok(addr) if !PORT_RANGE.contains(&addr.port()) => {
            errors.push(ValidationError::PortOutOfRange(addr.port()));
        }
        Ok(_) => {}
        Err(_) => errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        )),
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::NoConnections);
    }

    if config.observability.verbosity > MAX_VERBOSITY {
        errors.push(ValidationError::Verbosity(config.observability.verbosity));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.proxy.secure_retry_limit == 0 {
        errors.push(ValidationError::SecureRetryLimit);
    }
    if config.proxy.max_body_bytes == 0 {
        errors.push(ValidationError::MaxBodyBytes);
    }

    if config.cache.root.trim().is_empty() {
        errors.push(ValidationError::CacheRoot);
    }
    if config.cache.default_ttl_secs == 0 || config.cache.default_ttl_secs > MAX_DEFAULT_TTL_SECS {
        errors.push(ValidationError::DefaultTtl(config.cache.default_ttl_secs));
    }
    if config.cache.lock_stripes == 0 {
        errors.push(ValidationError::LockStripes);
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Timeout("connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Timeout("request_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
