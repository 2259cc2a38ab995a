//! Per-request dispatch.
//!
//! # Data Flow
//! ```text
//! NormalizedRequest
//!     → ResponseCache::lookup ──hit──→ Relay (source: cache)
//!     → miss: Connect → RedirectResolver → final status
//!         1xx/2xx: read body, filter headers, store if cacheable → Relay
//!         other:   bare status, body never read                  → Relay
//! ```
//!
//! # Design Decisions
//! - Cache failures degrade to a miss or a skipped store
//! - Entries are keyed by the request the client made, not the redirect target
//! - Retry counters are created here and die with the request

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::StatusCode;

use crate::cache::{is_cacheable, is_storable_status, CacheEntry, ResponseCache};
use crate::config::FetchConfig;
use crate::observability::metrics::{self, ProxyStats};
use crate::proxy::connector::{Connect, OriginConnector};
use crate::proxy::error::{DispatchError, FetchError};
use crate::proxy::headers::{relayed_response_headers, HeaderSet};
use crate::proxy::redirect::{RedirectResolver, RedirectState};
use crate::proxy::request::NormalizedRequest;

/// Where a relayed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaySource {
    Cache,
    Origin,
}

impl RelaySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelaySource::Cache => "cache",
            RelaySource::Origin => "origin",
        }
    }
}

/// A response ready to be written to the client.
#[derive(Debug, Clone)]
pub struct Relay {
    pub status: StatusCode,
    /// Already restricted to the relay allow-list.
    pub headers: HeaderSet,
    pub body: Bytes,
    pub source: RelaySource,
}

impl Relay {
    fn from_entry(entry: CacheEntry) -> Self {
        Self {
            status: StatusCode::from_u16(entry.code).unwrap_or(StatusCode::OK),
            headers: relayed_response_headers(&entry.headers),
            body: entry.body,
            source: RelaySource::Cache,
        }
    }

    /// Status only, no headers and no body.
    fn bare(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderSet::new(),
            body: Bytes::new(),
            source: RelaySource::Origin,
        }
    }
}

pub struct Dispatcher<C = OriginConnector> {
    cache: Arc<ResponseCache>,
    connector: C,
    hop_budget: u32,
    max_body_bytes: usize,
    stats: Arc<ProxyStats>,
}

impl<C: Connect> Dispatcher<C> {
    pub fn new(
        cache: Arc<ResponseCache>,
        connector: C,
        fetch: &FetchConfig,
        stats: Arc<ProxyStats>,
    ) -> Self {
        Self {
            cache,
            connector,
            hop_budget: fetch.redirect_hop_budget(),
            max_body_bytes: fetch.max_body_bytes,
            stats,
        }
    }

    pub fn stats(&self) -> &ProxyStats {
        &self.stats
    }

    /// Run one fetch cycle for `target`.
    pub async fn dispatch(
        &self,
        target: &NormalizedRequest,
        headers: &HeaderSet,
    ) -> Result<Relay, DispatchError> {
        match self.cache.lookup(target).await {
            Ok(Some(entry)) => {
                tracing::info!(request = %target, code = entry.code, "Serving from cache");
                self.stats.record_cache_response();
                return Ok(Relay::from_entry(entry));
            }
            Ok(None) => metrics::record_cache_event("miss"),
            Err(e) => {
                tracing::warn!(request = %target, error = %e, "Cache lookup failed, treating as miss");
                metrics::record_cache_event("error");
            }
        }

        self.stats.record_origin_query();
        let mut redirect = RedirectState::default();
        let first = self.connector.connect(target, headers, &mut redirect).await?;
        let mut resolver = RedirectResolver::new(&self.connector, self.hop_budget);
        let response = resolver.resolve(first, headers, &mut redirect).await?;

        let status = response.status;
        tracing::debug!(
            request = %target,
            url = %response.url,
            secure = response.secure,
            %status,
            hops = redirect.redirect_hops,
            secure_failures = redirect.secure_failures,
            "Origin answered"
        );

        if !is_storable_status(status) {
            tracing::info!(request = %target, %status, "Origin returned an error status, body discarded");
            return Ok(Relay::bare(status));
        }

        let body = axum::body::to_bytes(response.body, self.max_body_bytes)
            .await
            .map_err(FetchError::Body)?;

        if is_cacheable(response.headers.first("Content-Type")) {
            match self
                .cache
                .store(target, status.as_u16(), &response.headers, body.clone())
                .await
            {
                Ok(_) => metrics::record_cache_event("store"),
                Err(e) => {
                    tracing::warn!(request = %target, error = %e, "Could not store response");
                    metrics::record_cache_event("error");
                }
            }
        }

        Ok(Relay {
            status,
            headers: relayed_response_headers(&response.headers),
            body,
            source: RelaySource::Origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use crate::config::CacheConfig;
    use crate::proxy::connector::OriginResponse;
    use axum::body::Body;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Canned {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static [u8],
    }

    /// Serves canned responses by normalized request and counts calls.
    #[derive(Default)]
    struct FakeConnector {
        routes: HashMap<String, Canned>,
        calls: AtomicUsize,
    }

    impl FakeConnector {
        fn route(
            mut self,
            target: &str,
            status: u16,
            headers: Vec<(&'static str, &'static str)>,
            body: &'static [u8],
        ) -> Self {
            self.routes.insert(target.to_string(), Canned { status, headers, body });
            self
        }
    }

    impl Connect for FakeConnector {
        async fn connect(
            &self,
            target: &NormalizedRequest,
            _headers: &HeaderSet,
            _state: &mut RedirectState,
        ) -> Result<OriginResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let canned = self
                .routes
                .get(target.as_str())
                .ok_or_else(|| FetchError::MissingHost(target.to_string()))?;
            Ok(OriginResponse {
                status: StatusCode::from_u16(canned.status).unwrap(),
                headers: canned.headers.iter().copied().collect(),
                url: target.plain_url().unwrap(),
                secure: false,
                body: Body::from(canned.body),
            })
        }
    }

    fn dispatcher(dir: &TempDir, connector: FakeConnector) -> Dispatcher<FakeConnector> {
        dispatcher_at(dir.path(), connector)
    }

    fn dispatcher_at(root: &Path, connector: FakeConnector) -> Dispatcher<FakeConnector> {
        let cache = Arc::new(ResponseCache::new(&CacheConfig {
            root: root.to_string_lossy().into_owned(),
            ..CacheConfig::default()
        }));
        Dispatcher::new(cache, connector, &FetchConfig::default(), Arc::new(ProxyStats::new()))
    }

    fn target(s: &str) -> NormalizedRequest {
        NormalizedRequest::from_absolute(s).unwrap()
    }

    #[tokio::test]
    async fn cacheable_response_is_served_from_cache_next_time() {
        let dir = TempDir::new().unwrap();
        let connector = FakeConnector::default().route(
            "site.test/app.css",
            200,
            vec![("Content-Type", "text/css"), ("Set-Cookie", "a=1")],
            b"body{}",
        );
        let dispatcher = dispatcher(&dir, connector);
        let req = target("https://site.test/app.css");

        let first = dispatcher.dispatch(&req, &HeaderSet::new()).await.unwrap();
        assert_eq!(first.source, RelaySource::Origin);
        assert_eq!(first.status, StatusCode::OK);
        assert!(first.headers.get("Set-Cookie").is_none());

        let second = dispatcher.dispatch(&req, &HeaderSet::new()).await.unwrap();
        assert_eq!(second.source, RelaySource::Cache);
        assert_eq!(&second.body[..], b"body{}");
        assert_eq!(second.headers.first("content-type"), Some("text/css"));

        assert_eq!(dispatcher.connector.calls.load(Ordering::SeqCst), 1);
        let stats = dispatcher.stats().snapshot();
        assert_eq!(stats.cache_responses, 1);
        assert_eq!(stats.origin_queries, 1);
    }

    #[tokio::test]
    async fn html_is_relayed_but_not_cached() {
        let dir = TempDir::new().unwrap();
        let connector = FakeConnector::default().route(
            "site.test/",
            200,
            vec![("Content-Type", "text/html")],
            b"<html></html>",
        );
        let dispatcher = dispatcher(&dir, connector);
        let req = target("http://site.test/");

        for _ in 0..2 {
            let relay = dispatcher.dispatch(&req, &HeaderSet::new()).await.unwrap();
            assert_eq!(relay.source, RelaySource::Origin);
            assert_eq!(&relay.body[..], b"<html></html>");
        }
        assert_eq!(dispatcher.connector.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn error_status_is_bare_and_uncached() {
        let dir = TempDir::new().unwrap();
        let connector = FakeConnector::default().route(
            "site.test/missing.png",
            404,
            vec![("Content-Type", "image/png"), ("Server", "test")],
            b"not found",
        );
        let dispatcher = dispatcher(&dir, connector);
        let req = target("http://site.test/missing.png");

        let relay = dispatcher.dispatch(&req, &HeaderSet::new()).await.unwrap();
        assert_eq!(relay.status, StatusCode::NOT_FOUND);
        assert!(relay.headers.is_empty());
        assert!(relay.body.is_empty());
        assert!(dispatcher.cache.lookup(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn redirected_response_is_stored_under_the_requested_target() {
        let dir = TempDir::new().unwrap();
        let connector = FakeConnector::default()
            .route("site.test/old.png", 301, vec![("Location", "/new.png")], b"")
            .route("site.test/new.png", 200, vec![("Content-Type", "image/png")], b"png");
        let dispatcher = dispatcher(&dir, connector);
        let req = target("http://site.test/old.png");

        let relay = dispatcher.dispatch(&req, &HeaderSet::new()).await.unwrap();
        assert_eq!(relay.status, StatusCode::OK);
        assert_eq!(&relay.body[..], b"png");
        assert!(dispatcher.cache.lookup(&req).await.unwrap().is_some());
        assert!(dispatcher
            .cache
            .lookup(&target("http://site.test/new.png"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn oversized_body_abandons_the_request() {
        let dir = TempDir::new().unwrap();
        let connector = FakeConnector::default().route(
            "site.test/big.bin",
            200,
            vec![("Content-Type", "application/octet-stream")],
            b"0123456789",
        );
        let cache = Arc::new(ResponseCache::new(&CacheConfig {
            root: dir.path().to_string_lossy().into_owned(),
            ..CacheConfig::default()
        }));
        let fetch = FetchConfig {
            max_body_bytes: 4,
            ..FetchConfig::default()
        };
        let dispatcher = Dispatcher::new(cache, connector, &fetch, Arc::new(ProxyStats::new()));

        let err = dispatcher
            .dispatch(&target("http://site.test/big.bin"), &HeaderSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Fetch(FetchError::Body(_))));
    }

    fn png_route() -> FakeConnector {
        FakeConnector::default().route(
            "site.test/logo.png",
            200,
            vec![("Content-Type", "image/png")],
            b"png",
        )
    }

    #[tokio::test]
    async fn unreadable_entry_falls_through_to_the_origin() {
        let dir = TempDir::new().unwrap();
        let dispatcher = dispatcher(&dir, png_route());
        let req = target("http://site.test/logo.png");

        let entry_dir = dir.path().join(CacheKey::for_request(&req).dir_name());
        std::fs::create_dir(&entry_dir).unwrap();
        std::fs::write(entry_dir.join("meta"), b"garbage\n").unwrap();

        let relay = dispatcher.dispatch(&req, &HeaderSet::new()).await.unwrap();
        assert_eq!(relay.source, RelaySource::Origin);
        assert_eq!(relay.status, StatusCode::OK);
        assert_eq!(&relay.body[..], b"png");
        assert_eq!(dispatcher.connector.calls.load(Ordering::SeqCst), 1);

        let again = dispatcher.dispatch(&req, &HeaderSet::new()).await.unwrap();
        assert_eq!(again.source, RelaySource::Cache);
    }

    #[tokio::test]
    async fn failed_store_still_relays_the_response() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        let dispatcher = dispatcher_at(&root, png_route());
        dispatcher.cache.prepare().await.unwrap();
        std::fs::remove_dir_all(&root).unwrap();

        let req = target("http://site.test/logo.png");
        let relay = dispatcher.dispatch(&req, &HeaderSet::new()).await.unwrap();
        assert_eq!(relay.status, StatusCode::OK);
        assert_eq!(&relay.body[..], b"png");
        assert_eq!(relay.headers.first("Content-Type"), Some("image/png"));
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let dispatcher = dispatcher(&dir, FakeConnector::default());
        let err = dispatcher
            .dispatch(&target("http://nowhere.test/"), &HeaderSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Fetch(_)));
    }
}
