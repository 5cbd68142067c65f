//! Client-side TLS for broker connections (rustls with the web PKI root set).

use std::sync::{Arc, OnceLock};

use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::errors::StompError;

static CLIENT_CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();

fn client_config() -> Arc<ClientConfig> {
    CLIENT_CONFIG
        .get_or_init(|| {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            let config = ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();
            Arc::new(config)
        })
        .clone()
}

/// Runs the TLS handshake over an established TCP stream, using `host` for SNI and
/// certificate verification.
pub async fn wrap(stream: TcpStream, host: &str) -> Result<TlsStream<TcpStream>, StompError> {
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| StompError::Tls(format!("invalid server name '{}': {}", host, e)))?;

    let connector = TlsConnector::from(client_config());
    let tls = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| StompError::Tls(e.to_string()))?;

    debug!("TLS handshake completed with {}", host);
    Ok(tls)
}
