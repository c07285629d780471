//! TLS settings and client certificate storage.

use std::collections::HashMap;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::SocketError;

/// A client identity: certificate chain plus private key.
///
/// The key is wrapped in an Arc because `PrivateKeyDer` doesn't implement
/// Clone.
#[derive(Clone)]
pub struct ClientIdentity {
    /// Client certificate chain.
    pub chain: Vec<CertificateDer<'static>>,
    /// Client private key.
    pub key: Arc<PrivateKeyDer<'static>>,
}

impl ClientIdentity {
    /// Create a client identity from already-parsed DER material.
    pub fn new(chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self {
            chain,
            key: Arc::new(key),
        }
    }

    /// Parse a client identity from PEM-encoded certificate and key bytes.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, SocketError> {
        let chain = rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SocketError::InvalidCertificate(e.to_string()))?;
        if chain.is_empty() {
            return Err(SocketError::InvalidCertificate(
                "no certificate found in PEM input".into(),
            ));
        }
        let key = rustls_pemfile::private_key(&mut &key_pem[..])
            .map_err(|e| SocketError::InvalidPrivateKey(e.to_string()))?
            .ok_or_else(|| SocketError::InvalidPrivateKey("no private key found in PEM input".into()))?;
        Ok(Self::new(chain, key))
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("chain_len", &self.chain.len())
            .field("has_key", &true)
            .finish()
    }
}

/// Nickname-keyed store of client identities.
///
/// The authentication layer names a certificate by nickname; the socket
/// layer looks it up here when building a mutual-TLS connection. Selection
/// is exact: an unknown nickname is a configuration error, never a fallback
/// to some other certificate.
#[derive(Debug, Default, Clone)]
pub struct ClientCertStore {
    entries: HashMap<String, Arc<ClientIdentity>>,
}

impl ClientCertStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity under a nickname, replacing any previous entry.
    pub fn insert(&mut self, nickname: impl Into<String>, identity: ClientIdentity) {
        self.entries.insert(nickname.into(), Arc::new(identity));
    }

    /// Look up an identity by exact nickname.
    #[must_use]
    pub fn get(&self, nickname: &str) -> Option<&Arc<ClientIdentity>> {
        self.entries.get(nickname)
    }

    /// Whether the store holds no identities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// TLS settings for directory connections.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    /// Whether to trust the server certificate without validation.
    ///
    /// **Warning:** insecure; only for development and test directories.
    pub trust_server_certificate: bool,

    /// Custom root certificates to trust.
    ///
    /// If empty, the Mozilla root store is used.
    pub root_certificates: Vec<CertificateDer<'static>>,

    /// Server hostname for certificate validation.
    ///
    /// If not set, the endpoint host is used.
    pub server_name: Option<String>,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            trust_server_certificate: false,
            root_certificates: Vec::new(),
            server_name: None,
        }
    }
}

impl TlsSettings {
    /// Create TLS settings with secure defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust the server certificate without validation.
    ///
    /// **Warning:** insecure; only for development and test directories.
    #[must_use]
    pub fn trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = trust;
        self
    }

    /// Add a custom root certificate to trust.
    #[must_use]
    pub fn add_root_certificate(mut self, cert: CertificateDer<'static>) -> Self {
        self.root_certificates.push(cert);
        self
    }

    /// Set the server name used for certificate validation.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}
