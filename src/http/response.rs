//! Client-facing responses.
//!
//! Relayed headers are written one line per name with multiple values joined
//! by `", "`. `Content-Length` always reflects the body actually sent.

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::proxy::dispatcher::Relay;

/// Write a dispatch result out to the client.
pub fn relay_response(relay: Relay) -> Response {
    let body_len = relay.body.len();
    let mut response = Response::new(Body::from(relay.body));
    *response.status_mut() = relay.status;

    let headers = response.headers_mut();
    for (name, values) in relay.headers.iter() {
        if name.eq_ignore_ascii_case(header::CONTENT_LENGTH.as_str()) {
            continue;
        }
        let name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => name,
            Err(_) => {
                tracing::debug!(header = %name, "Dropping header with invalid name");
                continue;
            }
        };
        match HeaderValue::from_str(&values.join(", ")) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(_) => tracing::debug!(header = %name, "Dropping header with invalid value"),
        }
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body_len));

    tracing::trace!(status = %response.status(), headers = ?response.headers(), "Relayed response headers");
    response
}

/// Status line only: no relayed headers, no body.
pub fn bare_status(status: StatusCode) -> Response {
    status.into_response()
}

/// Answer for a request that was abandoned before anything could be relayed.
pub fn abandoned() -> Response {
    bare_status(StatusCode::BAD_GATEWAY)
}
