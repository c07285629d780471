//! Bounded directory pool walkthrough.
//!
//! Starts an in-process stand-in directory speaking a toy line protocol,
//! builds a pool against it, and demonstrates acquire/release from
//! concurrent tasks, pool status reporting, and graceful shutdown. No
//! external directory is needed.
//!
//! # Running
//!
//! ```sh
//! cargo run --example bound_pool
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use ldap_pool::{
    AuthenticationInfo, BindIdentity, ConnectionPool, Connector, DirectoryCodec, DirectoryError,
    DirectorySocket, Endpoint, PoolConfig, SessionMaterial, SocketProvider,
};
use ldap_tls::{ClientCertStore, TlsSettings};

const BIND_DN: &str = "cn=pkidbuser,ou=people,dc=example";
const PASSWORD: &str = "demo-password";

/// Codec for the demo line protocol: `BIND`, `ATTACH`, `PING`, `UNBIND`.
struct DemoCodec;

impl DemoCodec {
    async fn round_trip(
        socket: &mut DirectorySocket,
        request: &str,
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
        let reply = String::from_utf8_lossy(&line).into_owned();
        if let Some(rest) = reply.strip_prefix("OK") {
            Ok(rest.trim().to_string())
        } else if reply == "ERR auth" {
            Err(DirectoryError::Authentication("credentials rejected".into()))
        } else {
            Err(DirectoryError::Protocol(format!("directory said: {reply}")))
        }
    }
}

#[async_trait]
impl DirectoryCodec for DemoCodec {
    async fn bind(
        &self,
        socket: &mut DirectorySocket,
        identity: &BindIdentity,
    ) -> Result<SessionMaterial, DirectoryError> {
        let request = match identity {
            BindIdentity::Simple { dn, password } => format!("BIND {dn} {password}\n"),
            BindIdentity::External => "EXTERN\n".to_string(),
        };
        let token = Self::round_trip(socket, &request).await?;
        Ok(SessionMaterial::new(token.into_bytes()))
    }

    async fn attach(
        &self,
        socket: &mut DirectorySocket,
        material: &SessionMaterial,
    ) -> Result<(), DirectoryError> {
        let token = String::from_utf8_lossy(material.as_bytes()).into_owned();
        Self::round_trip(socket, &format!("ATTACH {token}\n")).await?;
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

/// Spawn the stand-in directory; returns the endpoint it listens on.
async fn start_demo_directory() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut next_token = 0u32;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            next_token += 1;
            let token = next_token;
            tokio::spawn(async move {
                let (reader, mut writer) = stream.into_split();
                let mut lines = BufReader::new(reader).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let reply = if let Some(rest) = line.strip_prefix("BIND ") {
                        if rest.ends_with(PASSWORD) {
                            format!("OK tkt-{token}\n")
                        } else {
                            "ERR auth\n".to_string()
                        }
                    } else if line.starts_with("ATTACH tkt-") {
                        "OK\n".to_string()
                    } else if line == "PING" {
                        "OK pong\n".to_string()
                    } else if line == "UNBIND" {
                        break;
                    } else {
                        "ERR unknown\n".to_string()
                    };
                    if writer.write_all(reply.as_bytes()).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    Endpoint::new("127.0.0.1", port, false)
}

async fn print_status(label: &str, pool: &ConnectionPool) {
    let status = pool.status().await;
    println!(
        "[{label}] free={} total={} max={}",
        status.free, status.total, status.max
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let endpoint = start_demo_directory().await;
    println!("stand-in directory listening at {endpoint}");

    let provider = Arc::new(SocketProvider::new(TlsSettings::new(), ClientCertStore::new()));
    let connector = Connector::new(provider, Arc::new(DemoCodec));
    let auth = AuthenticationInfo::basic(BIND_DN).with_password(PASSWORD);

    let pool = Arc::new(
        ConnectionPool::init(
            PoolConfig::new().min_conns(3).max_conns(10).max_results(100),
            endpoint,
            auth,
            connector,
        )
        .await?,
    );
    print_status("after init", &pool);

    // A single borrow-use-return cycle.
    let mut conn = pool.get_conn().await?;
    let socket = conn.socket_mut().expect("loaned connections are live");
    let mut buf = [0u8; 8];
    socket.write_all(b"PING\n").await?;
    let n = socket.read(&mut buf).await?;
    println!("directory answered: {}", String::from_utf8_lossy(&buf[..n]).trim());
    pool.return_conn(conn).await;

    // Eight tasks contend for the pool; the bound holds throughout.
    let mut handles = Vec::new();
    for worker in 0..8u32 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..5 {
                let conn = pool.get_conn().await.expect("acquire");
                tokio::task::yield_now().await;
                pool.return_conn(conn).await;
            }
            worker
        }));
    }
    for handle in handles {
        handle.await?;
    }
    print_status("after churn", &pool);

    pool.shutdown().await;
    print_status("after shutdown", &pool);

    Ok(())
}
