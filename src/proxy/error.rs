//! Failure taxonomy for a single proxied request.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised while reaching an origin and reading its answer.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The normalized request does not form a valid URL.
    #[error("invalid target `{target}`: {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },

    /// The target URL has no host to connect to.
    #[error("target `{0}` has no host")]
    MissingHost(String),

    /// DNS resolution or TCP connect failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TCP connect did not finish in time.
    #[error("timed out connecting to {0}")]
    Timeout(String),

    /// The encrypted handshake failed; the connector falls back to plaintext.
    #[error("TLS handshake with {host} failed: {reason}")]
    Tls { host: String, reason: String },

    /// Too many secure attempts already failed for this request.
    #[error("secure retries exhausted after {0} failures")]
    SecureRetriesExhausted(u32),

    /// The outbound request could not be assembled.
    #[error("could not build outbound request: {0}")]
    Request(#[from] axum::http::Error),

    /// The HTTP exchange with the origin failed after connecting.
    #[error("HTTP exchange with {target} failed: {source}")]
    Http {
        target: String,
        #[source]
        source: hyper::Error,
    },

    /// A redirection response came without a `Location` header.
    #[error("redirect from {0} has no Location header")]
    MissingLocation(String),

    /// The `Location` header could not be resolved to a URL.
    #[error("redirect from {from} to `{location}` is not a valid URL")]
    InvalidLocation { from: String, location: String },

    /// The origin body could not be read or exceeded the configured cap.
    #[error("failed to read origin body: {0}")]
    Body(#[source] axum::Error),
}

impl FetchError {
    /// Whether this failure sends the connector to the plaintext target.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            FetchError::Tls { .. } | FetchError::SecureRetriesExhausted(_)
        )
    }
}

/// Reasons a request is abandoned instead of relayed.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The inbound request target could not be normalized.
    #[error("request target `{0}` cannot be proxied")]
    InvalidRequest(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The redirect chain outgrew the hop budget.
    #[error("redirect budget of {hops} hops exhausted (last status {status})")]
    RedirectBudgetExhausted { hops: u32, status: StatusCode },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_tls_failures_fall_back() {
        assert!(FetchError::Tls {
            host: "example.com".into(),
            reason: "bad record".into()
        }
        .triggers_fallback());
        assert!(FetchError::SecureRetriesExhausted(10).triggers_fallback());
        assert!(!FetchError::Timeout("example.com:443".into()).triggers_fallback());
        assert!(!FetchError::MissingHost("/x".into()).triggers_fallback());
    }
}
