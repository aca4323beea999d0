//! TLS transport seam.
//!
//! The SSTP core only needs four things from TLS: send bytes, receive
//! bytes, the peer certificate in DER form (the crypto binding hashes
//! it), and an upper bound on read sizes. Everything else, certificate
//! verification policy included, stays on the other side of this trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, info};

/// TLS plaintext records top out at 16 KiB.
const TLS_MAX_RECORD_SIZE: usize = 16 * 1024;

/// The transport collaborator the session is written against.
#[async_trait]
pub trait TlsTransport: Send {
    /// Write one complete buffer to the stream.
    async fn send(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read whatever the next record delivers.
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Close the stream. Part of teardown, so errors are for logging only.
    async fn shutdown(&mut self) -> io::Result<()>;

    /// The negotiated peer certificate, DER encoded.
    fn peer_cert_der(&self) -> Option<&[u8]>;

    /// Largest useful read size.
    fn max_record_size(&self) -> usize;
}

/// rustls-backed transport used by the binary.
pub struct RustlsTransport {
    stream: TlsStream<TcpStream>,
}

impl RustlsTransport {
    /// Connect and complete the TLS handshake against the platform
    /// trust store.
    pub async fn connect(server: &str, port: u16) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs()
            .context("failed to load the platform trust store")?;
        let (added, ignored) = roots.add_parsable_certificates(certs);
        debug!("trust store: {added} roots loaded, {ignored} ignored");

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));

        let tcp = TcpStream::connect((server, port))
            .await
            .with_context(|| format!("TCP connect to {server}:{port} failed"))?;
        let name = ServerName::try_from(server.to_string())
            .with_context(|| format!("{server} is not a valid TLS server name"))?;
        let stream = connector
            .connect(name, tcp)
            .await
            .context("TLS handshake failed")?;

        info!("TLS session established with {server}:{port}");
        Ok(Self { stream })
    }
}

#[async_trait]
impl TlsTransport for RustlsTransport {
    async fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(data.len())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }

    fn peer_cert_der(&self) -> Option<&[u8]> {
        let (_, connection) = self.stream.get_ref();
        connection
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|cert| cert.as_ref())
    }

    fn max_record_size(&self) -> usize {
        TLS_MAX_RECORD_SIZE
    }
}
