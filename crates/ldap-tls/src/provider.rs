//! Socket provider for plain and TLS directory connections.

use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::ResolvesClientCert;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::audit::{AuditSink, ConnectionAudit, TracingAuditSink};
use crate::config::{ClientCertStore, TlsSettings};
use crate::endpoint::Endpoint;
use crate::error::SocketError;

// =============================================================================
// Directory socket
// =============================================================================

/// A raw socket to the directory, plain or TLS.
///
/// The wire-protocol layer reads and writes directory messages through this;
/// the socket layer only guarantees the transport is fully established
/// (including the TLS handshake) before a value of this type exists.
pub enum DirectorySocket {
    /// Cleartext TCP connection.
    Plain(TcpStream),
    /// TLS connection with a completed handshake.
    Tls(Box<TlsStream<TcpStream>>),
}

impl DirectorySocket {
    /// Local address of the underlying TCP stream.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        match self {
            Self::Plain(s) => s.local_addr(),
            Self::Tls(s) => s.get_ref().0.local_addr(),
        }
    }

    /// Remote address of the underlying TCP stream.
    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        match self {
            Self::Plain(s) => s.peer_addr(),
            Self::Tls(s) => s.get_ref().0.peer_addr(),
        }
    }

    /// Whether this socket is TLS-protected.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl std::fmt::Debug for DirectorySocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySocket")
            .field("tls", &self.is_tls())
            .field("peer", &self.peer_addr().ok())
            .finish()
    }
}

impl AsyncRead for DirectorySocket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for DirectorySocket {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

// =============================================================================
// Certificate selection
// =============================================================================

/// Client certificate resolver pinned to a single identity.
///
/// When a nickname is configured, candidate selection is restricted to
/// exactly that certificate. There is deliberately no "any available cert"
/// fallback: offering the wrong identity to the directory is worse than
/// failing the handshake.
#[derive(Debug)]
struct PinnedCertResolver {
    certified: Arc<CertifiedKey>,
}

impl ResolvesClientCert for PinnedCertResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.certified))
    }

    fn has_certs(&self) -> bool {
        true
    }
}

/// Server certificate verifier that accepts anything.
///
/// **Warning:** insecure; only reachable through
/// [`TlsSettings::trust_server_certificate`].
#[derive(Debug)]
struct TrustAnyServerCert;

impl ServerCertVerifier for TrustAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

// =============================================================================
// Socket provider
// =============================================================================

/// Produces plain or TLS sockets to a directory endpoint.
///
/// The provider applies keep-alive to the raw socket, drives the TLS
/// handshake to completion before returning (so authentication failures
/// surface at connect time rather than on first use), restricts client
/// certificate selection to a configured nickname, and audits every
/// connection failure.
pub struct SocketProvider {
    tls: TlsSettings,
    client_certs: ClientCertStore,
    keep_alive: bool,
    audit: Arc<dyn AuditSink>,
}

impl SocketProvider {
    /// Create a provider with the given TLS settings and certificate store.
    ///
    /// Keep-alive defaults to on; the audit sink defaults to
    /// [`TracingAuditSink`].
    #[must_use]
    pub fn new(tls: TlsSettings, client_certs: ClientCertStore) -> Self {
        Self {
            tls,
            client_certs,
            keep_alive: true,
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Enable or disable TCP keep-alive on produced sockets.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Replace the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Open a socket to `endpoint`, optionally presenting the client
    /// certificate stored under `client_cert_nickname`.
    ///
    /// On failure the partially-opened socket is closed, an audit event is
    /// emitted, and the error propagates.
    pub async fn connect(
        &self,
        endpoint: &Endpoint,
        client_cert_nickname: Option<&str>,
    ) -> Result<DirectorySocket, SocketError> {
        let mut local_ip = None;
        match self
            .connect_inner(endpoint, client_cert_nickname, &mut local_ip)
            .await
        {
            Ok(socket) => Ok(socket),
            Err(err) => {
                // The failed stream, if any, was dropped inside connect_inner,
                // which closes it.
                self.audit
                    .connection_failure(&ConnectionAudit::failure(endpoint, local_ip, err.to_string()));
                Err(err)
            }
        }
    }

    async fn connect_inner(
        &self,
        endpoint: &Endpoint,
        client_cert_nickname: Option<&str>,
        local_ip: &mut Option<IpAddr>,
    ) -> Result<DirectorySocket, SocketError> {
        let addr = lookup_host((endpoint.host(), endpoint.port()))
            .await
            .map_err(|e| SocketError::Resolve {
                host: endpoint.host().to_string(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| SocketError::Resolve {
                host: endpoint.host().to_string(),
                reason: "no addresses returned".into(),
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(self.keep_alive)?;

        let stream = socket
            .connect(addr)
            .await
            .map_err(|source| SocketError::Connect {
                host: endpoint.host().to_string(),
                port: endpoint.port(),
                source,
            })?;
        *local_ip = stream.local_addr().ok().map(|a| a.ip());

        if !endpoint.secure() {
            tracing::debug!(endpoint = %endpoint, "directory socket established");
            return Ok(DirectorySocket::Plain(stream));
        }

        let config = self.client_config(client_cert_nickname)?;
        let host = self
            .tls
            .server_name
            .clone()
            .unwrap_or_else(|| endpoint.host().to_string());
        let server_name = ServerName::try_from(host.clone())
            .map_err(|_| SocketError::Configuration(format!("invalid server name: {host}")))?;

        tracing::debug!(endpoint = %endpoint, server_name = %host, "performing TLS handshake");
        let tls_stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, stream)
            .await
            .map_err(|e| SocketError::HandshakeFailed {
                host: endpoint.host().to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(endpoint = %endpoint, "TLS handshake completed");

        Ok(DirectorySocket::Tls(Box::new(tls_stream)))
    }

    /// Build the rustls client configuration for one connection attempt.
    fn client_config(&self, client_cert_nickname: Option<&str>) -> Result<ClientConfig, SocketError> {
        let builder = if self.tls.trust_server_certificate {
            tracing::warn!(
                "trust_server_certificate is enabled - server certificate validation is \
                 DISABLED; only use this against development or test directories"
            );
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(TrustAnyServerCert))
        } else {
            ClientConfig::builder().with_root_certificates(self.root_store()?)
        };

        let config = match client_cert_nickname {
            Some(nickname) => {
                let identity = self.client_certs.get(nickname).ok_or_else(|| {
                    SocketError::Configuration(format!(
                        "no client certificate with nickname {nickname}"
                    ))
                })?;
                let key = rustls::crypto::ring::sign::any_supported_type(identity.key.as_ref())
                    .map_err(|e| SocketError::InvalidPrivateKey(e.to_string()))?;
                let certified = CertifiedKey::new(identity.chain.clone(), key);
                builder.with_client_cert_resolver(Arc::new(PinnedCertResolver {
                    certified: Arc::new(certified),
                }))
            }
            None => builder.with_no_client_auth(),
        };

        Ok(config)
    }

    fn root_store(&self) -> Result<RootCertStore, SocketError> {
        let mut roots = RootCertStore::empty();
        if self.tls.root_certificates.is_empty() {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        } else {
            for cert in &self.tls.root_certificates {
                roots
                    .add(cert.clone())
                    .map_err(|e| SocketError::InvalidCertificate(e.to_string()))?;
            }
        }
        Ok(roots)
    }
}

impl std::fmt::Debug for SocketProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketProvider")
            .field("tls", &self.tls)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}
