//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs   (Axum setup, middleware, wildcard route)
//!     → request.rs  (request ID, normalized target, client headers)
//!     → proxy::Dispatcher
//!     → response.rs (allow-listed headers, Content-Length, empty 502)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::HttpServer;
