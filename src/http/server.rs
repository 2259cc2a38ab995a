//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a single wildcard proxy route
//! - Wire up middleware (request ID, tracing, timeout, concurrency bound)
//! - Prepare the cache before the listener starts accepting
//! - Hand each request to the dispatcher and relay the outcome

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::cache::{CacheSweeper, ResponseCache};
use crate::config::ProxyConfig;
use crate::http::request::{client_headers, client_target, request_id};
use crate::http::response::{abandoned, bare_status, relay_response};
use crate::lifecycle::StartupError;
use crate::net::tls;
use crate::observability::metrics::{self, ProxyStats};
use crate::proxy::{DispatchError, Dispatcher, OriginConnector};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher<OriginConnector>>,
}

/// HTTP front end of the caching proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    cache: Arc<ResponseCache>,
    stats: Arc<ProxyStats>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, StartupError> {
        let cache = Arc::new(ResponseCache::new(&config.cache));
        let stats = Arc::new(ProxyStats::new());
        let connector = OriginConnector::new(tls::client_config()?, &config.proxy, &config.timeouts);
        let dispatcher = Arc::new(Dispatcher::new(
            cache.clone(),
            connector,
            &config.proxy,
            stats.clone(),
        ));

        let router = Self::build_router(&config, AppState { dispatcher });
        Ok(Self {
            router,
            config,
            cache,
            stats,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
                    .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections)),
            )
    }

    /// Prepare the cache, then serve until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), StartupError> {
        let report = self.cache.prepare().await?;
        tracing::info!(
            root = %self.cache.root().display(),
            scanned = report.scanned,
            removed = report.removed,
            remaining = report.remaining,
            "Cache ready"
        );

        if self.config.cache.sweep_interval_secs > 0 {
            let sweeper = CacheSweeper::new(
                self.cache.clone(),
                Duration::from_secs(self.config.cache.sweep_interval_secs),
            );
            tokio::spawn(sweeper.run(shutdown.resubscribe()));
        }

        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        let totals = self.stats.snapshot();
        tracing::info!(
            total_requests = totals.total_requests,
            cache_responses = totals.cache_responses,
            origin_queries = totals.origin_queries,
            "HTTP server stopped"
        );
        Ok(())
    }

    pub fn stats(&self) -> Arc<ProxyStats> {
        self.stats.clone()
    }
}

/// Proxy handler: one fetch cycle per client request, whatever the method.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let stats = state.dispatcher.stats();
    let total = stats.record_request();

    let (parts, _body) = request.into_parts();
    let request_id = request_id(&parts);

    let target = match client_target(&parts) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Request abandoned");
            metrics::record_request(502, "none", start);
            return abandoned();
        }
    };

    tracing::info!(
        request_id = %request_id,
        client = %client,
        method = %parts.method,
        request = %target,
        "Client request"
    );
    tracing::trace!(request_id = %request_id, headers = ?parts.headers, "Client request headers");

    let headers = client_headers(&parts);
    let response = match state.dispatcher.dispatch(&target, &headers).await {
        Ok(relay) => {
            metrics::record_request(relay.status.as_u16(), relay.source.as_str(), start);
            relay_response(relay)
        }
        Err(DispatchError::RedirectBudgetExhausted { hops, status }) => {
            tracing::warn!(request_id = %request_id, request = %target, hops, %status, "Request abandoned after redirects");
            metrics::record_request(status.as_u16(), "origin", start);
            bare_status(status)
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, request = %target, error = %e, "Request abandoned");
            metrics::record_request(502, "origin", start);
            abandoned()
        }
    };

    stats.log_summary_at(total);
    response
}
