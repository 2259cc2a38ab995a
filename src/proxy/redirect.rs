//! Redirect following.
//!
//! # States
//! - Active: a non-3xx response is in hand and is final
//! - Following: a 3xx response is being chased
//! - Stopped: the hop budget ran out; the request is abandoned
//!
//! # State Transitions
//! ```text
//! Active → Following: response status is 3xx
//! Following → Following: hop taken, new response is 3xx
//! Following → Active: hop taken, new response is not 3xx
//! Following → Stopped: redirect_hops reached the hop budget
//! ```
//!
//! # Design Decisions
//! - Counters live in a per-request `RedirectState`, never shared
//! - Relative `Location` values resolve against the URL that sent them
//! - A redirect without `Location` abandons the request

use crate::proxy::connector::{Connect, OriginResponse};
use crate::proxy::error::{DispatchError, FetchError};
use crate::proxy::headers::HeaderSet;
use crate::proxy::request::NormalizedRequest;

/// Per-request retry counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RedirectState {
    /// Secure attempts that failed and forced a plaintext fallback.
    pub secure_failures: u32,
    /// 3xx responses followed so far.
    pub redirect_hops: u32,
}

/// Where the resolver currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Active,
    Following,
    Stopped,
}

/// Chases 3xx responses through a connector under a hop budget.
pub struct RedirectResolver<'a, C> {
    connector: &'a C,
    hop_budget: u32,
    state: ResolverState,
}

impl<'a, C: Connect> RedirectResolver<'a, C> {
    pub fn new(connector: &'a C, hop_budget: u32) -> Self {
        Self {
            connector,
            hop_budget,
            state: ResolverState::Active,
        }
    }

    pub fn state(&self) -> ResolverState {
        self.state
    }

    /// Follow redirects starting from `response` until a non-3xx status.
    pub async fn resolve(
        &mut self,
        mut response: OriginResponse,
        headers: &HeaderSet,
        redirect: &mut RedirectState,
    ) -> Result<OriginResponse, DispatchError> {
        loop {
            if !response.status.is_redirection() {
                self.state = ResolverState::Active;
                return Ok(response);
            }
            self.state = ResolverState::Following;

            if redirect.redirect_hops >= self.hop_budget {
                self.state = ResolverState::Stopped;
                tracing::warn!(
                    hops = redirect.redirect_hops,
                    last_url = %response.url,
                    "Too many redirects, client request abandoned"
                );
                return Err(DispatchError::RedirectBudgetExhausted {
                    hops: redirect.redirect_hops,
                    status: response.status,
                });
            }

            let next = next_target(&response)?;
            tracing::debug!(from = %response.url, location = %next, "Following redirect");

            response = self.connector.connect(&next, headers, redirect).await?;
            redirect.redirect_hops += 1;
            tracing::debug!(
                url = %response.url,
                status = %response.status,
                hops = redirect.redirect_hops,
                "Redirect answered"
            );
        }
    }
}

/// Normalized target named by a redirect's `Location` header.
fn next_target(response: &OriginResponse) -> Result<NormalizedRequest, FetchError> {
    let location = response
        .headers
        .first("location")
        .ok_or_else(|| FetchError::MissingLocation(response.url.to_string()))?;

    let resolved = response
        .url
        .join(location.trim())
        .map_err(|_| FetchError::InvalidLocation {
            from: response.url.to_string(),
            location: location.to_string(),
        })?;

    match resolved.scheme() {
        "http" | "https" => Ok(NormalizedRequest::from_url(&resolved)),
        _ => Err(FetchError::InvalidLocation {
            from: response.url.to_string(),
            location: location.to_string(),
        }),
    }
}
