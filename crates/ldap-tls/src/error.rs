//! Socket and TLS error types.

use thiserror::Error;

/// Errors that can occur while establishing a directory socket.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Host name did not resolve to any address.
    #[error("failed to resolve {host}: {reason}")]
    Resolve {
        /// Host name that failed to resolve.
        host: String,
        /// Resolver failure detail.
        reason: String,
    },

    /// TCP connect to the directory failed.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// TLS handshake failed.
    #[error("TLS handshake with {host} failed: {reason}")]
    HandshakeFailed {
        /// Remote host.
        host: String,
        /// Handshake failure detail.
        reason: String,
    },

    /// Invalid certificate material.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Invalid private key material.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Socket layer configuration error, including an unknown client
    /// certificate nickname.
    #[error("socket configuration error: {0}")]
    Configuration(String),

    /// IO error on the raw socket.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Rustls error.
    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),
}
