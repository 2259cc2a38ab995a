//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every subsystem emits:
//!     → tracing events (console, filtered by verbosity or RUST_LOG)
//!     → ProxyStats counters, mirrored into the metrics facade
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Verbosity only filters diagnostics; it never alters proxying
//! - Counters are advisory; relaxed atomics are enough
//! - Without an installed recorder the metrics macros are no-ops

pub mod logging;
pub mod metrics;
