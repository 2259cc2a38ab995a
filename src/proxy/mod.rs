//! Forward proxying.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → request.rs    (NormalizedRequest)
//!     → dispatcher.rs (cache lookup, fetch cycle, store)
//!     → connector.rs  (https first, http fallback)
//!     → redirect.rs   (bounded 3xx chase)
//!     → headers.rs    (outbound copy, response allow-list)
//! ```

pub mod connector;
pub mod dispatcher;
pub mod error;
pub mod headers;
pub mod redirect;
pub mod request;

pub use connector::{Connect, OriginConnector, OriginResponse};
pub use dispatcher::{Dispatcher, Relay, RelaySource};
pub use error::{DispatchError, FetchError};
pub use headers::HeaderSet;
pub use redirect::{RedirectResolver, RedirectState};
pub use request::NormalizedRequest;
