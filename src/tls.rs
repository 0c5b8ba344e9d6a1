//! TLS connector helpers for IMAP sessions and probes.

use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{ConnectivityError, Result};

/// TLS stream type used for IMAP connections.
pub type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

static CLIENT_CONFIG: OnceCell<Arc<ClientConfig>> = OnceCell::new();

/// Shared rustls client configuration backed by the system root store.
pub fn client_config() -> Result<Arc<ClientConfig>> {
    CLIENT_CONFIG.get_or_try_init(build_client_config).cloned()
}

fn build_client_config() -> Result<Arc<ClientConfig>> {
    let mut root_store = RootCertStore::empty();
    let rustls_native_certs::CertificateResult { certs, errors, .. } =
        rustls_native_certs::load_native_certs();
    if certs.is_empty() {
        if let Some(err) = errors.into_iter().next() {
            return Err(ConnectivityError::Tls(format!(
                "failed to load system root certificates: {}",
                err
            )));
        }
    }
    let (added, ignored) = root_store.add_parsable_certificates(certs);
    debug!(added, ignored, "Loaded system root certificates");

    // Pin the provider so a second rustls backend pulled in transitively
    // cannot make provider selection ambiguous.
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ConnectivityError::Tls(e.to_string()))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

/// Install aws-lc-rs as the process-wide rustls provider
///
/// lettre builds its own `ClientConfig` and needs a default to exist.
pub fn install_default_provider() {
    static INSTALLED: OnceCell<()> = OnceCell::new();
    INSTALLED.get_or_init(|| {
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider already installed");
        }
    });
}

/// Establish a TLS connection over an existing TCP stream.
pub async fn connect(host: &str, stream: TcpStream) -> Result<TlsStream> {
    let connector = TlsConnector::from(client_config()?);
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| ConnectivityError::Tls(format!("invalid DNS name: {}", host)))?;

    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| ConnectivityError::Tls(format!("TLS handshake with {} failed: {}", host, e)))
}
