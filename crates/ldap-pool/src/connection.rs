//! Bound connections and the connector that creates them.

use std::sync::Arc;

use ldap_tls::{DirectorySocket, Endpoint, SocketError, SocketProvider};

use crate::auth::{AuthType, AuthenticationInfo};
use crate::codec::{BindIdentity, DirectoryCodec, SessionMaterial};
use crate::error::DirectoryError;

/// A live, authenticated directory connection.
///
/// A bound connection is exclusively owned: by the pool while it sits in
/// the free list, and by exactly one borrower between `get_conn` and
/// `return_conn`. Nothing here defends against two tasks sharing one loaned
/// connection; that is a caller bug.
pub struct BoundConnection {
    socket: Option<DirectorySocket>,
    material: SessionMaterial,
    codec: Arc<dyn DirectoryCodec>,
    connected: bool,
    size_limit: u32,
    pool_tag: Option<u64>,
}

impl BoundConnection {
    pub(crate) fn new(
        socket: DirectorySocket,
        material: SessionMaterial,
        codec: Arc<dyn DirectoryCodec>,
    ) -> Self {
        Self {
            socket: Some(socket),
            material,
            codec,
            connected: true,
            size_limit: 0,
            pool_tag: None,
        }
    }

    /// Cheap liveness probe.
    ///
    /// This is a cached flag, not a network round-trip: it goes false when
    /// the connection is closed or when a borrower reports a failed
    /// operation via [`BoundConnection::mark_disconnected`]. A transport
    /// severed behind our back is therefore noticed on first failed use,
    /// not at acquire time.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected && self.socket.is_some()
    }

    /// Report that an operation on this connection failed at the transport
    /// level. The pool repairs the connection on its next loan.
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    /// Orderly disconnect: send the unbind notice and release the socket.
    ///
    /// May fail with a protocol error; used at reset, where failures are
    /// logged and the teardown loop continues.
    pub async fn disconnect(&mut self) -> Result<(), DirectoryError> {
        self.connected = false;
        if let Some(mut socket) = self.socket.take() {
            self.codec.unbind(&mut socket).await?;
        }
        Ok(())
    }

    /// Unconditional release of the underlying network resources.
    ///
    /// Never fails; used at shutdown.
    pub fn close(&mut self) {
        self.connected = false;
        self.socket = None;
    }

    /// Set the per-call result-size limit. Zero means unlimited.
    pub fn set_size_limit(&mut self, limit: u32) {
        self.size_limit = limit;
    }

    /// Current result-size limit.
    #[must_use]
    pub fn size_limit(&self) -> u32 {
        self.size_limit
    }

    /// Mutable access to the underlying socket, for callers performing
    /// directory operations. `None` once the connection is closed.
    pub fn socket_mut(&mut self) -> Option<&mut DirectorySocket> {
        self.socket.as_mut()
    }

    /// The codec this connection was bound with.
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn DirectoryCodec> {
        &self.codec
    }

    pub(crate) fn material(&self) -> &SessionMaterial {
        &self.material
    }

    pub(crate) fn pool_tag(&self) -> Option<u64> {
        self.pool_tag
    }

    pub(crate) fn set_pool_tag(&mut self, tag: u64) {
        self.pool_tag = Some(tag);
    }
}

impl std::fmt::Debug for BoundConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundConnection")
            .field("connected", &self.is_connected())
            .field("size_limit", &self.size_limit)
            .field("pool_tag", &self.pool_tag)
            .finish_non_exhaustive()
    }
}

/// Creates bound connections: socket establishment through the provider,
/// authentication through the codec.
#[derive(Clone)]
pub struct Connector {
    provider: Arc<SocketProvider>,
    codec: Arc<dyn DirectoryCodec>,
}

impl Connector {
    /// Create a connector from a socket provider and a protocol codec.
    pub fn new(provider: Arc<SocketProvider>, codec: Arc<dyn DirectoryCodec>) -> Self {
        Self { provider, codec }
    }

    /// Open a fresh connection and fully authenticate it.
    pub async fn open(
        &self,
        endpoint: &Endpoint,
        auth: &AuthenticationInfo,
    ) -> Result<BoundConnection, DirectoryError> {
        match auth.auth_type() {
            AuthType::BasicAuth => {
                let dn = auth
                    .bind_dn()
                    .ok_or_else(|| {
                        DirectoryError::Configuration("BasicAuth requires a bind DN".into())
                    })?
                    .to_string();
                let password = auth
                    .resolve_password(auth.prompt(), endpoint, self)
                    .await?;
                let mut socket = self.connect_socket(endpoint, None).await?;
                let material = self
                    .codec
                    .bind(&mut socket, &BindIdentity::Simple { dn, password })
                    .await?;
                Ok(BoundConnection::new(socket, material, Arc::clone(&self.codec)))
            }
            AuthType::SslClientAuth => {
                let nickname = auth.client_cert_nickname().ok_or_else(|| {
                    DirectoryError::Configuration(
                        "SSLClientAuth requires a client certificate nickname".into(),
                    )
                })?;
                let mut socket = self.connect_socket(endpoint, Some(nickname)).await?;
                let material = self
                    .codec
                    .bind(&mut socket, &BindIdentity::External)
                    .await?;
                Ok(BoundConnection::new(socket, material, Arc::clone(&self.codec)))
            }
        }
    }

    /// Open a new connection that reuses the master's authenticated session
    /// material instead of performing a full bind round-trip.
    ///
    /// Session material only replaces the bind; under client-certificate
    /// authentication the clone's handshake still presents the same pinned
    /// certificate as the master, or a mutual-TLS directory would reject it
    /// at the transport layer.
    pub async fn clone_from(
        &self,
        endpoint: &Endpoint,
        auth: &AuthenticationInfo,
        master: &BoundConnection,
    ) -> Result<BoundConnection, DirectoryError> {
        let mut socket = self.connect_socket(endpoint, clone_nickname(auth)).await?;
        let material = master.material().clone();
        self.codec.attach(&mut socket, &material).await?;
        Ok(BoundConnection::new(socket, material, Arc::clone(&self.codec)))
    }

    /// Attempt a simple bind with explicit credentials.
    ///
    /// Used by password verification; the returned connection is kept by
    /// the caller so repeated verifications reuse it.
    pub(crate) async fn try_bind(
        &self,
        endpoint: &Endpoint,
        dn: &str,
        password: &str,
    ) -> Result<BoundConnection, DirectoryError> {
        let mut socket = self.connect_socket(endpoint, None).await?;
        let material = self
            .codec
            .bind(
                &mut socket,
                &BindIdentity::Simple {
                    dn: dn.to_string(),
                    password: password.to_string(),
                },
            )
            .await?;
        Ok(BoundConnection::new(socket, material, Arc::clone(&self.codec)))
    }

    async fn connect_socket(
        &self,
        endpoint: &Endpoint,
        nickname: Option<&str>,
    ) -> Result<DirectorySocket, DirectoryError> {
        self.provider
            .connect(endpoint, nickname)
            .await
            .map_err(|err| classify_socket_error(endpoint, err))
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

/// Client certificate a cloned connection must present during its
/// handshake.
fn clone_nickname(auth: &AuthenticationInfo) -> Option<&str> {
    match auth.auth_type() {
        AuthType::SslClientAuth => auth.client_cert_nickname(),
        AuthType::BasicAuth => None,
    }
}

/// Sort socket failures into the pool's taxonomy: local misconfiguration is
/// a configuration error, everything else means the directory could not be
/// reached.
fn classify_socket_error(endpoint: &Endpoint, err: SocketError) -> DirectoryError {
    match err {
        SocketError::Configuration(_)
        | SocketError::InvalidCertificate(_)
        | SocketError::InvalidPrivateKey(_) => DirectoryError::Configuration(err.to_string()),
        other => DirectoryError::Unavailable {
            host: endpoint.host().to_string(),
            port: endpoint.port(),
            reason: other.to_string(),
        },
    }
}
