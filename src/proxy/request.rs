//! Request identity.
//!
//! A [`NormalizedRequest`] is the request target with its scheme removed,
//! e.g. `example.com/img/logo.png?v=2`. It keys the response cache and is the
//! base from which both the secure and the plaintext target URLs are built.

use std::fmt;

use axum::http::Uri;
use url::{ParseError, Url};

const SECURE_PREFIX: &str = "https://";
const PLAIN_PREFIX: &str = "http://";

/// Scheme-less request identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedRequest(String);

impl NormalizedRequest {
    /// Strip a leading `http://` or `https://` from an absolute target.
    ///
    /// Returns `None` when the target carries neither scheme or nothing
    /// remains after the scheme.
    pub fn from_absolute(target: &str) -> Option<Self> {
        let rest = strip_scheme(target)?;
        if rest.is_empty() {
            return None;
        }
        Some(Self(rest.to_string()))
    }

    /// Normalize an inbound request target.
    ///
    /// Absolute-form targets (what a browser sends to a forward proxy) are
    /// stripped of their scheme. Origin-form targets are rebuilt from the
    /// `Host` header and the path.
    pub fn from_request_target(uri: &Uri, host: Option<&str>) -> Option<Self> {
        if uri.scheme().is_some() {
            return Self::from_absolute(&uri.to_string());
        }
        let host = host?.trim();
        if host.is_empty() {
            return None;
        }
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        Some(Self(format!("{}{}", host, path)))
    }

    /// Identity of an already-parsed URL, e.g. a resolved `Location`.
    pub fn from_url(url: &Url) -> Self {
        let text = url.as_str();
        match strip_scheme(text) {
            Some(rest) => Self(rest.to_string()),
            None => Self(text.to_string()),
        }
    }

    /// Target URL for the encrypted attempt.
    pub fn secure_url(&self) -> Result<Url, ParseError> {
        Url::parse(&format!("{}{}", SECURE_PREFIX, self.0))
    }

    /// Target URL for the plaintext attempt.
    pub fn plain_url(&self) -> Result<Url, ParseError> {
        Url::parse(&format!("{}{}", PLAIN_PREFIX, self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn strip_scheme(target: &str) -> Option<&str> {
    for prefix in [SECURE_PREFIX, PLAIN_PREFIX] {
        if target.len() >= prefix.len()
            && target.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
        {
            return Some(&target[prefix.len()..]);
        }
    }
    None
}
