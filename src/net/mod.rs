//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Origin attempt
//!     → tls.rs (client config: bundled roots, ring provider)
//!     → proxy::connector (TCP connect, handshake, HTTP/1.1 exchange)
//! ```

pub mod tls;
