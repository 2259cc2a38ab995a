//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → metrics endpoint → bind listener
//!     → prepare cache root + startup sweep → accept traffic
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → broadcast → stop accepting, stop sweeper → drain → exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The startup sweep finishes before the first request is accepted

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, StartupError};
