//! Connection-failure audit events.
//!
//! Every failed attempt to reach the directory produces a structured audit
//! event describing both ends of the attempted connection. The surrounding
//! server forwards these to its signed audit log; this crate only defines
//! the event shape and the sink seam.

use std::net::IpAddr;

use crate::endpoint::Endpoint;

/// Principal recorded for connections opened by the server itself rather
/// than on behalf of an authenticated user.
pub const SYSTEM_PRINCIPAL: &str = "SYSTEM";

/// A failed attempt to open a directory connection.
#[derive(Debug, Clone)]
pub struct ConnectionAudit {
    /// Local address the attempt was made from, when the socket got far
    /// enough to have one.
    pub local_ip: Option<IpAddr>,
    /// Remote directory host.
    pub remote_host: String,
    /// Remote directory port.
    pub remote_port: u16,
    /// Acting principal.
    pub principal: &'static str,
    /// What went wrong.
    pub outcome: String,
}

impl ConnectionAudit {
    /// Build a failure event for an attempt against `endpoint`.
    pub fn failure(endpoint: &Endpoint, local_ip: Option<IpAddr>, outcome: impl Into<String>) -> Self {
        Self {
            local_ip,
            remote_host: endpoint.host().to_string(),
            remote_port: endpoint.port(),
            principal: SYSTEM_PRINCIPAL,
            outcome: outcome.into(),
        }
    }
}

/// Sink receiving connection audit events.
pub trait AuditSink: Send + Sync {
    /// Record a failed connection attempt.
    fn connection_failure(&self, event: &ConnectionAudit);
}

/// Default sink that emits audit events as structured tracing records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn connection_failure(&self, event: &ConnectionAudit) {
        tracing::warn!(
            local_ip = ?event.local_ip,
            remote_host = %event.remote_host,
            remote_port = event.remote_port,
            principal = event.principal,
            outcome = %event.outcome,
            "directory connection failure"
        );
    }
}
