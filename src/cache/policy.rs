//! Cacheability policy.
//!
//! An explicit allow-list of content-type prefixes, matched case-sensitively
//! against the value as received. Only informational and success responses
//! are ever stored.

use axum::http::StatusCode;

/// Content-type prefixes whose responses are persisted.
pub const CACHEABLE_CONTENT_TYPES: [&str; 7] = [
    "image/",
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "text/css",
    "application/octet-stream",
    "video/webm",
];

/// Whether a response with this content type may be stored.
pub fn is_cacheable(content_type: Option<&str>) -> bool {
    match content_type {
        Some(value) => CACHEABLE_CONTENT_TYPES
            .iter()
            .any(|prefix| value.starts_with(prefix)),
        None => false,
    }
}

/// Status codes whose bodies are read, relayed and eligible for storage.
pub fn is_storable_status(status: StatusCode) -> bool {
    status.is_informational() || status.is_success()
}
