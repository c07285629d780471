//! Shared harness for pool integration tests.
//!
//! Runs an in-process directory stand-in speaking a newline-delimited toy
//! protocol, plus a [`DirectoryCodec`] for it. The real wire protocol is
//! out of scope for the pool; these tests only need bind, attach and
//! unbind semantics with controllable outcomes.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use ldap_pool::{
    AuthenticationInfo, BindIdentity, ConnectionPool, Connector, DirectoryCodec, DirectoryError,
    DirectorySocket, Endpoint, PasswordStore, PoolConfig, SessionMaterial, SocketProvider,
};
use ldap_tls::{ClientCertStore, TlsSettings};

/// How the test server answers bind requests.
#[derive(Debug, Clone)]
pub enum BindPolicy {
    /// Accept binds carrying exactly this password.
    Accept(String),
    /// Reject every bind as bad credentials.
    RejectAll,
    /// Answer every bind with a non-credential protocol error.
    Busy,
}

/// In-process directory stand-in.
pub struct DirServer {
    pub addr: SocketAddr,
    pub binds: Arc<AtomicU32>,
    pub attaches: Arc<AtomicU32>,
    handle: JoinHandle<()>,
}

impl DirServer {
    pub async fn start(policy: BindPolicy) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let binds = Arc::new(AtomicU32::new(0));
        let attaches = Arc::new(AtomicU32::new(0));

        let handle = {
            let binds = binds.clone();
            let attaches = attaches.clone();
            tokio::spawn(async move {
                let mut next_token = 0u32;
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    next_token += 1;
                    tokio::spawn(handle_conn(
                        stream,
                        policy.clone(),
                        next_token,
                        binds.clone(),
                        attaches.clone(),
                    ));
                }
            })
        };

        Self {
            addr,
            binds,
            attaches,
            handle,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.addr.port(), false)
    }

    /// Stop accepting and serving; existing sockets go dead.
    pub fn kill(&self) {
        self.handle.abort();
    }
}

impl Drop for DirServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_conn(
    stream: TcpStream,
    policy: BindPolicy,
    token: u32,
    binds: Arc<AtomicU32>,
    attaches: Arc<AtomicU32>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let reply = if let Some(rest) = line.strip_prefix("BIND ") {
            binds.fetch_add(1, Ordering::SeqCst);
            let password = rest.rsplit_once(' ').map(|(_, pw)| pw).unwrap_or("");
            match &policy {
                BindPolicy::Accept(expected) if password == expected => {
                    format!("OK tkt-{token}\n")
                }
                BindPolicy::Accept(_) | BindPolicy::RejectAll => "ERR auth\n".to_string(),
                BindPolicy::Busy => "ERR busy\n".to_string(),
            }
        } else if line == "EXTERN" {
            binds.fetch_add(1, Ordering::SeqCst);
            format!("OK tkt-{token}\n")
        } else if let Some(presented) = line.strip_prefix("ATTACH ") {
            attaches.fetch_add(1, Ordering::SeqCst);
            if presented.starts_with("tkt-") {
                "OK\n".to_string()
            } else {
                "ERR auth\n".to_string()
            }
        } else if line == "UNBIND" {
            break;
        } else {
            "ERR busy\n".to_string()
        };
        if writer.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }
}

/// Codec for the toy line protocol.
pub struct LineCodec;

impl LineCodec {
    async fn round_trip(
        &self,
        socket: &mut DirectorySocket,
        request: String,
    ) -> Result<String, DirectoryError> {
        socket
            .write_all(request.as_bytes())
            .await
            .map_err(|e| DirectoryError::Protocol(format!("write failed: {e}")))?;
        let mut line = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            let n = socket
                .read(&mut byte)
                .await
                .map_err(|e| DirectoryError::Protocol(format!("read failed: {e}")))?;
            if n == 0 {
                return Err(DirectoryError::Protocol("connection closed".into()));
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    fn check(reply: &str) -> Result<&str, DirectoryError> {
        if let Some(rest) = reply.strip_prefix("OK") {
            Ok(rest.trim())
        } else if reply == "ERR auth" {
            Err(DirectoryError::Authentication("credentials rejected".into()))
        } else {
            Err(DirectoryError::Protocol(format!("directory said: {reply}")))
        }
    }
}

#[async_trait]
impl DirectoryCodec for LineCodec {
    async fn bind(
        &self,
        socket: &mut DirectorySocket,
        identity: &BindIdentity,
    ) -> Result<SessionMaterial, DirectoryError> {
        let request = match identity {
            BindIdentity::Simple { dn, password } => format!("BIND {dn} {password}\n"),
            BindIdentity::External => "EXTERN\n".to_string(),
        };
        let reply = self.round_trip(socket, request).await?;
        let token = Self::check(&reply)?;
        Ok(SessionMaterial::new(token.as_bytes().to_vec()))
    }

    async fn attach(
        &self,
        socket: &mut DirectorySocket,
        material: &SessionMaterial,
    ) -> Result<(), DirectoryError> {
        let token = String::from_utf8_lossy(material.as_bytes()).into_owned();
        let reply = self.round_trip(socket, format!("ATTACH {token}\n")).await?;
        Self::check(&reply)?;
        Ok(())
    }

    async fn unbind(&self, socket: &mut DirectorySocket) -> Result<(), DirectoryError> {
        socket
            .write_all(b"UNBIND\n")
            .await
            .map_err(|e| DirectoryError::Protocol(format!("write failed: {e}")))?;
        Ok(())
    }
}

/// Password the harness pools bind with.
pub const TEST_PASSWORD: &str = "hunter2";

/// Bind DN the harness pools bind as.
pub const TEST_BIND_DN: &str = "cn=pkidbuser,dc=test";

pub fn plain_connector() -> Connector {
    let provider = Arc::new(SocketProvider::new(TlsSettings::new(), ClientCertStore::new()));
    Connector::new(provider, Arc::new(LineCodec))
}

pub fn basic_auth() -> AuthenticationInfo {
    AuthenticationInfo::basic(TEST_BIND_DN).with_password(TEST_PASSWORD)
}

/// Server that accepts the harness credentials.
pub async fn accepting_server() -> DirServer {
    DirServer::start(BindPolicy::Accept(TEST_PASSWORD.to_string())).await
}

pub async fn make_pool(server: &DirServer, config: PoolConfig) -> ConnectionPool {
    ConnectionPool::init(config, server.endpoint(), basic_auth(), plain_connector())
        .await
        .unwrap()
}

/// An endpoint nothing listens on.
pub async fn dead_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::new("127.0.0.1", port, false)
}

/// Password store backed by a fixed prompt/secret pair, with an outage
/// switch and a lookup counter.
pub struct TestPasswordStore {
    prompt: String,
    secret: String,
    available: AtomicBool,
    lookups: AtomicU32,
}

impl TestPasswordStore {
    pub fn new(prompt: &str, secret: &str) -> Arc<Self> {
        Arc::new(Self {
            prompt: prompt.to_string(),
            secret: secret.to_string(),
            available: AtomicBool::new(true),
            lookups: AtomicU32::new(0),
        })
    }

    pub fn go_offline(&self) {
        self.available.store(false, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl PasswordStore for TestPasswordStore {
    fn get(&self, prompt: &str) -> Option<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return None;
        }
        (prompt == self.prompt).then(|| self.secret.clone())
    }
}
