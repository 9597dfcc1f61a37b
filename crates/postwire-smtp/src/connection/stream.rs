//! Low-level SMTP stream handling.

use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore},
};

/// Longest reply line read in one go, per RFC 5321 section 4.5.3.1.5.
const MAX_REPLY_LINE: u64 = 512;

/// Certificate handling for TLS connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    /// Verify the server certificate chain and host name.
    pub verify_certificates: bool,
    /// Extra PEM file with trusted CA certificates.
    pub ca_file: Option<PathBuf>,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            verify_certificates: true,
            ca_file: None,
        }
    }
}

impl TlsSettings {
    /// Builds a connector with the webpki roots plus the configured CA file.
    ///
    /// # Errors
    ///
    /// Returns an error if the CA file cannot be read or holds an invalid
    /// certificate.
    pub async fn connector(&self) -> Result<TlsConnector> {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        if let Some(ca_path) = &self.ca_file {
            tracing::debug!(path = %ca_path.display(), "Loading CA certificate file");
            let pem = tokio::fs::read(ca_path).await?;
            let mut cursor = Cursor::new(pem);
            for cert in rustls_pemfile::certs(&mut cursor) {
                root_store.add(cert?)?;
            }
        }

        let mut config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if !self.verify_certificates {
            tracing::warn!("TLS certificate verification disabled");
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoCertVerifier));
        }

        Ok(TlsConnector::from(Arc::new(config)))
    }
}

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>),
}

impl SmtpStream {
    /// Reads a line from the stream, without its line terminator.
    ///
    /// Returns `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        let read = match self {
            Self::Tcp(reader) => {
                (&mut *reader)
                    .take(MAX_REPLY_LINE)
                    .read_until(b'\n', &mut buf)
                    .await?
            }
            Self::Tls(reader) => {
                (&mut **reader)
                    .take(MAX_REPLY_LINE)
                    .read_until(b'\n', &mut buf)
                    .await?
            }
        };
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&buf).trim_end().to_string()))
    }

    /// Writes data to the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Returns true if the stream is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Checks without blocking whether the peer has gone away.
    ///
    /// End of stream, a read error, or unsolicited data (such as a `421`
    /// shutdown notice) all count as closed.
    pub async fn is_closed(&mut self) -> bool {
        let probe = match self {
            Self::Tcp(reader) => {
                tokio::time::timeout(Duration::ZERO, reader.fill_buf())
                    .await
                    .map(|r| r.map(|buf| buf.len()))
            }
            Self::Tls(reader) => {
                tokio::time::timeout(Duration::ZERO, reader.fill_buf())
                    .await
                    .map(|r| r.map(|buf| buf.len()))
            }
        };
        match probe {
            Err(_elapsed) => false,
            Ok(Ok(pending)) => {
                tracing::debug!(pending, "Connection readable while idle");
                true
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Connection probe failed");
                true
            }
        }
    }

    /// Upgrades a TCP stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted or the TLS
    /// handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str, settings: &TlsSettings) -> Result<Self> {
        let tcp_stream = match self {
            Self::Tcp(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(Error::Protocol("Already using TLS".into())),
        };

        let tls_stream = handshake(tcp_stream, hostname, settings).await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls_stream))))
    }
}

async fn handshake(
    tcp_stream: TcpStream,
    hostname: &str,
    settings: &TlsSettings,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let connector = settings.connector().await?;
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Protocol(format!("Invalid hostname: {hostname}")))?;

    tracing::debug!(hostname, "Starting TLS handshake");
    Ok(connector.connect(server_name, tcp_stream).await?)
}

async fn connect_tcp(hostname: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addr = format!("{hostname}:{port}");
    tokio::time::timeout(timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::Timeout(format!("connection to {addr}")))?
        .map_err(Into::into)
}

/// Connects to an SMTP server over plain TCP.
///
/// # Errors
///
/// Returns an error if the connection fails or does not complete within
/// `timeout`.
pub async fn connect(hostname: &str, port: u16, timeout: Duration) -> Result<SmtpStream> {
    let stream = connect_tcp(hostname, port, timeout).await?;
    Ok(SmtpStream::Tcp(BufReader::new(stream)))
}

/// Connects to an SMTP server over TLS (implicit TLS on port 465).
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails or the
/// connection does not complete within `timeout`.
pub async fn connect_tls(
    hostname: &str,
    port: u16,
    timeout: Duration,
    settings: &TlsSettings,
) -> Result<SmtpStream> {
    let tcp_stream = connect_tcp(hostname, port, timeout).await?;
    let tls_stream = tokio::time::timeout(timeout, handshake(tcp_stream, hostname, settings))
        .await
        .map_err(|_| Error::Timeout("TLS handshake".into()))??;
    Ok(SmtpStream::Tls(Box::new(BufReader::new(tls_stream))))
}

/// Accepts any server certificate.
#[derive(Debug)]
struct NoCertVerifier;

impl rustls::client::danger::ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (SmtpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = connect("127.0.0.1", port, Duration::from_secs(5));
        let (client, accepted) = tokio::join!(client, listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_read_line_and_eof() {
        let (mut stream, mut server) = pair().await;
        server.write_all(b"220 ready\r\n250-a\r\n").await.unwrap();
        drop(server);

        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("220 ready"));
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("250-a"));
        assert_eq!(stream.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_is_closed() {
        let (mut stream, server) = pair().await;
        assert!(!stream.is_closed().await);
        assert!(!stream.is_tls());

        drop(server);
        // Give the FIN a moment to arrive.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(stream.is_closed().await);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(connect("127.0.0.1", port, Duration::from_secs(5)).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_ca_file() {
        let settings = TlsSettings {
            verify_certificates: true,
            ca_file: Some(PathBuf::from("/nonexistent/ca.pem")),
        };
        assert!(matches!(settings.connector().await, Err(Error::Io(_))));
    }
}
