//! Wire-protocol seam.
//!
//! The directory protocol itself (message framing, ASN.1) lives outside
//! this crate. The pool only needs three operations from it: authenticate a
//! fresh socket, attach a new socket to an existing authenticated session,
//! and say goodbye. [`DirectoryCodec`] is that seam; the surrounding server
//! supplies the real implementation and tests supply a toy one.

use async_trait::async_trait;
use bytes::Bytes;

use ldap_tls::DirectorySocket;

use crate::error::DirectoryError;

/// Identity presented during a bind.
#[derive(Clone)]
pub enum BindIdentity {
    /// Simple bind with a distinguished name and password.
    Simple {
        /// Bind DN.
        dn: String,
        /// Bind password.
        password: String,
    },
    /// External bind: the identity was already proven by the mutual-TLS
    /// client certificate.
    External,
}

impl std::fmt::Debug for BindIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple { dn, .. } => f
                .debug_struct("Simple")
                .field("dn", dn)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::External => f.debug_struct("External").finish(),
        }
    }
}

/// Opaque authenticated-session material produced by a successful bind.
///
/// A clone of the master connection presents this instead of repeating the
/// full bind round-trip.
#[derive(Clone)]
pub struct SessionMaterial(Bytes);

impl SessionMaterial {
    /// Wrap raw session material.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Raw material bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SessionMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Session material is credential-equivalent; show only its size.
        f.debug_struct("SessionMaterial")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Protocol operations the pool requires from the directory codec.
///
/// Error mapping contract for implementations:
/// - rejected credentials map to [`DirectoryError::Authentication`]
/// - transport-level failures map to [`DirectoryError::Unavailable`]
/// - anything else the directory answers with maps to
///   [`DirectoryError::Protocol`]
#[async_trait]
pub trait DirectoryCodec: Send + Sync {
    /// Authenticate a freshly-connected socket, returning the session
    /// material a clone may later present.
    async fn bind(
        &self,
        socket: &mut DirectorySocket,
        identity: &BindIdentity,
    ) -> Result<SessionMaterial, DirectoryError>;

    /// Attach a new socket to an existing authenticated session without a
    /// full bind round-trip.
    async fn attach(
        &self,
        socket: &mut DirectorySocket,
        material: &SessionMaterial,
    ) -> Result<(), DirectoryError>;

    /// Send an orderly disconnect notice.
    async fn unbind(&self, socket: &mut DirectorySocket) -> Result<(), DirectoryError>;
}
