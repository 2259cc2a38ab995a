//! Outbound TLS configuration.

use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore};

/// Build the client configuration used for encrypted origin attempts.
///
/// Trust anchors are the bundled Mozilla root set, so behavior does not
/// depend on the host's certificate store.
pub fn client_config() -> Result<Arc<ClientConfig>, rustls::Error> {
    let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(Arc::new(config))
}
