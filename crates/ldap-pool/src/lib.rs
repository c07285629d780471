//! # ldap-pool
//!
//! Bounded, authenticated connection pool for an LDAP directory service.
//!
//! Every subsystem of the surrounding certificate-authority server reaches
//! the directory (identity lookup, certificate and request storage,
//! publishing) through one of these pools. The pool owns the hard parts:
//! correct, deadlock-free concurrent access to a scarce, slow, fallible
//! network resource under two authentication modes (password bind and
//! mutual-TLS client certificate), cheap connection reuse by cloning an
//! authenticated template connection, self-healing of dead pooled
//! connections, and the guarantee that a loaned connection never leaks a
//! prior borrower's per-call settings.
//!
//! ## Layout
//!
//! - [`AuthenticationInfo`] resolves the bind identity and credentials,
//!   with a shared prompt-keyed password cache and opportunistic
//!   verification binds.
//! - [`DirectoryCodec`] is the seam to the wire protocol; the pool never
//!   parses directory messages itself.
//! - [`Connector`] turns sockets from `ldap_tls::SocketProvider` into
//!   [`BoundConnection`]s, fresh or cloned from the master's session
//!   material.
//! - [`ConnectionPool`] owns the bounded free list, the master template
//!   connection, and the acquire/release protocol.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ldap_pool::{AuthenticationInfo, ConnectionPool, Connector, PoolConfig};
//! use ldap_tls::{ClientCertStore, Endpoint, SocketProvider, TlsSettings};
//!
//! let provider = Arc::new(SocketProvider::new(TlsSettings::new(), ClientCertStore::new()));
//! let connector = Connector::new(provider, codec);
//! let auth = AuthenticationInfo::basic("cn=pkidbuser,ou=people,dc=example")
//!     .with_password_store(store);
//! let pool = ConnectionPool::init(
//!     PoolConfig::new().min_conns(3).max_conns(15),
//!     Endpoint::new("ldap.example.com", 636, true),
//!     auth,
//!     connector,
//! )
//! .await?;
//!
//! let conn = pool.get_conn().await?;
//! // ... directory operations ...
//! pool.return_conn(conn).await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod auth;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod pool;

pub use auth::{
    AuthType, AuthenticationInfo, PasswordCache, PasswordStore, DEFAULT_PASSWORD_PROMPT,
    FALLBACK_PROMPT_KEY,
};
pub use codec::{BindIdentity, DirectoryCodec, SessionMaterial};
pub use config::PoolConfig;
pub use connection::{BoundConnection, Connector};
pub use error::DirectoryError;
pub use pool::{ConnectionPool, PoolStatus};

// Re-export the socket layer types callers wire a pool up with.
pub use ldap_tls::{DirectorySocket, Endpoint, SocketProvider};
