//! Inbound request inspection.
//!
//! # Responsibilities
//! - Read the request ID set by the request-id layer
//! - Turn the request target into a [`NormalizedRequest`]
//! - Collect the client's headers for the outbound copy

use axum::http::{header, request::Parts};

use crate::proxy::error::DispatchError;
use crate::proxy::headers::HeaderSet;
use crate::proxy::request::NormalizedRequest;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Request ID assigned to this request, or `"unknown"`.
pub fn request_id(parts: &Parts) -> String {
    parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Normalized target of an inbound request.
///
/// Absolute-form targets keep their authority; origin-form targets take it
/// from the `Host` header.
pub fn client_target(parts: &Parts) -> Result<NormalizedRequest, DispatchError> {
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok());
    NormalizedRequest::from_request_target(&parts.uri, host)
        .ok_or_else(|| DispatchError::InvalidRequest(parts.uri.to_string()))
}

/// Client headers to copy onto the origin request.
///
/// The request ID is ours, not the client's, so it stays behind.
pub fn client_headers(parts: &Parts) -> HeaderSet {
    let mut headers = HeaderSet::from_header_map(&parts.headers);
    headers.remove(X_REQUEST_ID);
    headers
}
