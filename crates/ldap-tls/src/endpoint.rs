//! Directory endpoint address.

/// Address of a directory service.
///
/// Immutable after construction; the pool and the socket layer share one
/// endpoint value for the lifetime of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
    secure: bool,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
        }
    }

    /// Directory host name.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Directory port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether connections to this endpoint use TLS.
    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.secure { "ldaps" } else { "ldap" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_accessors() {
        let endpoint = Endpoint::new("ldap.example.com", 636, true);
        assert_eq!(endpoint.host(), "ldap.example.com");
        assert_eq!(endpoint.port(), 636);
        assert!(endpoint.secure());
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(
            Endpoint::new("dir.local", 389, false).to_string(),
            "ldap://dir.local:389"
        );
        assert_eq!(
            Endpoint::new("dir.local", 636, true).to_string(),
            "ldaps://dir.local:636"
        );
    }
}
