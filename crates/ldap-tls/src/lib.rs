//! # ldap-tls
//!
//! Socket and TLS layer for LDAP directory connections.
//!
//! This crate produces fully-established transports for the connection pool
//! in `ldap-pool`: plain TCP for `ldap://` endpoints, TLS with a completed
//! handshake for `ldaps://` endpoints. It owns the concerns that live below
//! the directory protocol:
//!
//! - TCP keep-alive on the raw socket
//! - server certificate validation via rustls (Mozilla roots by default,
//!   custom roots, or an explicit trust-anything mode for test directories)
//! - mutual-TLS client certificate selection pinned to a configured
//!   nickname, with no silent fallback
//! - structured audit events for every connection failure
//!
//! The TLS handshake is driven to completion before a socket is handed out,
//! so certificate and client-auth failures surface at connect time rather
//! than on the first directory operation.
//!
//! ```rust,ignore
//! use ldap_tls::{ClientCertStore, Endpoint, SocketProvider, TlsSettings};
//!
//! let provider = SocketProvider::new(TlsSettings::new(), ClientCertStore::new());
//! let endpoint = Endpoint::new("ldap.example.com", 636, true);
//! let socket = provider.connect(&endpoint, None).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod audit;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod provider;

pub use audit::{AuditSink, ConnectionAudit, TracingAuditSink, SYSTEM_PRINCIPAL};
pub use config::{ClientCertStore, ClientIdentity, TlsSettings};
pub use endpoint::Endpoint;
pub use error::SocketError;
pub use provider::{DirectorySocket, SocketProvider};

// Re-export tokio-rustls stream type for convenience
pub use tokio_rustls::client::TlsStream;
