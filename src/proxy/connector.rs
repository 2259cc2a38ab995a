//! Origin connector.
//!
//! # Responsibilities
//! - Turn a normalized request into a live origin response
//! - Prefer `https://`, fall back to `http://` when the handshake fails
//! - Copy client headers onto the outbound request
//!
//! # Data Flow
//! ```text
//! NormalizedRequest
//!     → https://<target>  TCP connect → TLS handshake ──ok──→ GET
//!                                          │
//!                                        fails (or secure budget spent)
//!                                          ↓
//!     → http://<target>   TCP connect ─────────────────────→ GET
//!     → OriginResponse { status, headers, unread body }
//! ```
//!
//! # Design Decisions
//! - One fresh connection per attempt; nothing is pooled across requests
//! - Transport failures (DNS, refused, timeout) never fall back
//! - The body is left unread; the dispatcher decides whether to read it

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time;
use tokio_rustls::TlsConnector;
use url::{Host, Position, Url};

use crate::config::{FetchConfig, TimeoutConfig};
use crate::observability::metrics;
use crate::proxy::error::FetchError;
use crate::proxy::headers::{outbound_request_headers, HeaderSet};
use crate::proxy::redirect::RedirectState;
use crate::proxy::request::NormalizedRequest;

/// An origin response whose body has not been read yet.
pub struct OriginResponse {
    pub status: StatusCode,
    pub headers: HeaderSet,
    /// The URL that produced this response.
    pub url: Url,
    /// Whether the response arrived over TLS.
    pub secure: bool,
    pub body: Body,
}

impl fmt::Debug for OriginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginResponse")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("secure", &self.secure)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Something that can open an origin connection for a normalized request.
pub trait Connect: Send + Sync {
    fn connect(
        &self,
        target: &NormalizedRequest,
        headers: &HeaderSet,
        state: &mut RedirectState,
    ) -> impl Future<Output = Result<OriginResponse, FetchError>> + Send;
}

/// Connector speaking HTTP/1.1 over TLS or plaintext TCP.
#[derive(Clone)]
pub struct OriginConnector {
    tls: TlsConnector,
    connect_timeout: Duration,
    secure_retry_limit: u32,
}

impl OriginConnector {
    pub fn new(tls: Arc<ClientConfig>, fetch: &FetchConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            tls: TlsConnector::from(tls),
            connect_timeout: Duration::from_secs(timeouts.connect_secs),
            secure_retry_limit: fetch.secure_retry_limit,
        }
    }

    async fn fetch_secure(
        &self,
        url: &Url,
        headers: &HeaderSet,
    ) -> Result<OriginResponse, FetchError> {
        let (host, port) = host_and_port(url)?;
        let tcp = self.open_tcp(&host, port).await?;

        let server_name = ServerName::try_from(host.clone()).map_err(|e| FetchError::Tls {
            host: host.clone(),
            reason: e.to_string(),
        })?;
        let stream = match time::timeout(self.connect_timeout, self.tls.connect(server_name, tcp)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(FetchError::Tls {
                    host,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(FetchError::Tls {
                    host,
                    reason: "handshake timed out".to_string(),
                })
            }
        };

        tracing::info!(target_url = %url, "Secure connection");
        exchange(stream, url, headers, true).await
    }

    async fn fetch_plain(
        &self,
        url: &Url,
        headers: &HeaderSet,
    ) -> Result<OriginResponse, FetchError> {
        let (host, port) = host_and_port(url)?;
        let tcp = self.open_tcp(&host, port).await?;

        tracing::info!(target_url = %url, "Insecure connection");
        exchange(tcp, url, headers, false).await
    }

    async fn open_tcp(&self, host: &str, port: u16) -> Result<TcpStream, FetchError> {
        let addr = format!("{}:{}", host, port);
        match time::timeout(self.connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(FetchError::Connect { addr, source }),
            Err(_) => Err(FetchError::Timeout(addr)),
        }
    }
}

impl Connect for OriginConnector {
    async fn connect(
        &self,
        target: &NormalizedRequest,
        headers: &HeaderSet,
        state: &mut RedirectState,
    ) -> Result<OriginResponse, FetchError> {
        tracing::debug!(request = %target, "Client request (without scheme)");
        let secure_url = target_url(target, NormalizedRequest::secure_url)?;

        let attempt = if state.secure_failures >= self.secure_retry_limit {
            Err(FetchError::SecureRetriesExhausted(state.secure_failures))
        } else {
            self.fetch_secure(&secure_url, headers).await
        };

        match attempt {
            Err(e) if e.triggers_fallback() => {
                if let FetchError::Tls { .. } = e {
                    state.secure_failures += 1;
                }
                tracing::debug!(
                    request = %target,
                    secure_failures = state.secure_failures,
                    reason = %e,
                    "Secure connection failed, falling back to plaintext"
                );
                metrics::record_secure_fallback();
                let plain_url = target_url(target, NormalizedRequest::plain_url)?;
                self.fetch_plain(&plain_url, headers).await
            }
            other => other,
        }
    }
}

fn target_url(
    target: &NormalizedRequest,
    build: fn(&NormalizedRequest) -> Result<Url, url::ParseError>,
) -> Result<Url, FetchError> {
    build(target).map_err(|source| FetchError::InvalidTarget {
        target: target.to_string(),
        source,
    })
}

/// Host (without IPv6 brackets) and effective port of a URL.
fn host_and_port(url: &Url) -> Result<(String, u16), FetchError> {
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(FetchError::MissingHost(url.to_string())),
    };
    let port = url
        .port_or_known_default()
        .ok_or_else(|| FetchError::MissingHost(url.to_string()))?;
    Ok((host, port))
}

/// Value for the outbound `Host` header.
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Build the outbound GET for `url`, carrying the client's headers.
pub fn build_request(url: &Url, headers: &HeaderSet) -> Result<Request<Body>, FetchError> {
    let path = &url[Position::BeforePath..Position::AfterQuery];
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(if path.is_empty() { "/" } else { path })
        .header(header::HOST, host_header(url));

    for (name, value) in outbound_request_headers(headers) {
        builder = builder.header(name, value);
    }

    Ok(builder.body(Body::empty())?)
}

/// Send one request over an established stream and wait for the head.
async fn exchange<S>(
    io: S,
    url: &Url,
    headers: &HeaderSet,
    secure: bool,
) -> Result<OriginResponse, FetchError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let http_error = |source| FetchError::Http {
        target: url.to_string(),
        source,
    };

    let request = build_request(url, headers)?;
    tracing::trace!(headers = ?request.headers(), "Outbound request headers");

    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(http_error)?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "Origin connection closed with error");
        }
    });

    let response: Response<Incoming> = sender.send_request(request).await.map_err(http_error)?;
    let (parts, body) = response.into_parts();
    tracing::trace!(status = %parts.status, headers = ?parts.headers, "Origin response headers");

    Ok(OriginResponse {
        status: parts.status,
        headers: HeaderSet::from_header_map(&parts.headers),
        url: url.clone(),
        secure,
        body: Body::new(body),
    })
}
