//! Console logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Map the 0..=3 verbosity level onto a filter
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured verbosity
//! - Level 3 enables `trace`, where request and response headers are dumped

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a verbosity level. Levels above 3 behave like 3.
pub fn directive_for_verbosity(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let tower_level = if verbosity >= 2 { "debug" } else { "warn" };
    format!("secure_cache_proxy={},tower_http={},warn", level, tower_level)
}

pub fn filter_for_verbosity(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive_for_verbosity(verbosity)))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(verbosity: u8) {
    let _ = tracing_subscriber::registry()
        .with(filter_for_verbosity(verbosity))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert!(directive_for_verbosity(0).starts_with("secure_cache_proxy=error,"));
        assert!(directive_for_verbosity(1).starts_with("secure_cache_proxy=info,"));
        assert!(directive_for_verbosity(2).starts_with("secure_cache_proxy=debug,"));
        assert!(directive_for_verbosity(3).starts_with("secure_cache_proxy=trace,"));
        assert_eq!(directive_for_verbosity(9), directive_for_verbosity(3));
    }

    #[test]
    fn directives_parse() {
        for verbosity in 0..=3 {
            assert!(EnvFilter::try_new(directive_for_verbosity(verbosity)).is_ok());
        }
    }
}
