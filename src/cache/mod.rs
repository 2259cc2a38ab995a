//! Persistent response cache.
//!
//! # Data Flow
//! ```text
//! NormalizedRequest → CacheKey (32-bit hash) → <root>/<hash>/{meta, responseHeaders, responseBody}
//! ```
//!
//! # Design Decisions
//! - Expiry is enforced on lookup and by sweeps, never by timers per entry
//! - Only allow-listed content types with 1xx/2xx status are stored
//! - Failures here degrade to a miss; they never fail a client request

pub mod entry;
pub mod error;
pub mod key;
pub mod policy;
pub mod record;
pub mod store;
pub mod sweeper;

pub use entry::{CacheEntry, Expiry};
pub use error::CacheError;
pub use key::CacheKey;
pub use policy::{is_cacheable, is_storable_status};
pub use store::{ResponseCache, SweepReport};
pub use sweeper::CacheSweeper;
