//! Pool and directory error types.

use thiserror::Error;

/// Errors surfaced by the connection pool and its collaborators.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Invalid configuration. Fatal at construction time; never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The directory service could not be reached.
    ///
    /// Distinguished from [`DirectoryError::Protocol`] so callers can apply
    /// backoff or degrade gracefully.
    #[error("directory unavailable at {host}:{port}: {reason}")]
    Unavailable {
        /// Directory host.
        host: String,
        /// Directory port.
        port: u16,
        /// Connect failure detail.
        reason: String,
    },

    /// The directory rejected the presented credentials.
    ///
    /// Surfaced to the caller, never auto-retried.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A directory-protocol failure during use.
    #[error("directory protocol error: {0}")]
    Protocol(String),

    /// `reset` was called while connections were still on loan.
    #[error("cannot reset pool: {outstanding} connection(s) still on loan")]
    IllegalReset {
        /// Number of loaned-out connections at the time of the call.
        outstanding: u32,
    },

    /// The pool has been shut down.
    #[error("pool is shut down")]
    PoolClosed,

    /// Socket layer failure.
    #[error(transparent)]
    Socket(#[from] ldap_tls::SocketError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_display() {
        let err = DirectoryError::Unavailable {
            host: "dir.local".into(),
            port: 389,
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "directory unavailable at dir.local:389: connection refused"
        );
    }

    #[test]
    fn test_illegal_reset_display() {
        let err = DirectoryError::IllegalReset { outstanding: 3 };
        assert!(err.to_string().contains("3 connection(s)"));
    }
}
