//! Pool configuration.

use crate::error::DirectoryError;

/// Configuration for the directory connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of pooled connections to maintain.
    pub min_conns: u32,

    /// Maximum number of connections the pool may ever own.
    pub max_conns: u32,

    /// Result-size limit re-armed on every connection before it is loaned
    /// out. Zero means unlimited.
    pub max_results: u32,

    /// Whether a failure to reach the directory at init time is fatal.
    ///
    /// When false, init succeeds with the master connection absent and the
    /// first acquire retries it, permitting startup before the directory is
    /// reachable.
    pub error_if_down: bool,

    /// Whether replica connections are cloned from the master's
    /// authenticated session material instead of performing a full
    /// connect-and-bind each time.
    pub do_cloning: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_conns: 5,
            max_conns: 1000,
            max_results: 0,
            error_if_down: false,
            do_cloning: true,
        }
    }
}

impl PoolConfig {
    /// Create a pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of pooled connections.
    #[must_use]
    pub fn min_conns(mut self, count: u32) -> Self {
        self.min_conns = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_conns(mut self, count: u32) -> Self {
        self.max_conns = count;
        self
    }

    /// Set the result-size limit applied to every loaned connection.
    #[must_use]
    pub fn max_results(mut self, limit: u32) -> Self {
        self.max_results = limit;
        self
    }

    /// Make directory unavailability at init time fatal.
    #[must_use]
    pub fn error_if_down(mut self, fatal: bool) -> Self {
        self.error_if_down = fatal;
        self
    }

    /// Enable or disable cloning replicas from the master connection.
    #[must_use]
    pub fn do_cloning(mut self, enabled: bool) -> Self {
        self.do_cloning = enabled;
        self
    }

    /// Validate the configuration.
    ///
    /// Called before any network activity; an invalid configuration never
    /// reaches the directory.
    pub fn validate(&self) -> Result<(), DirectoryError> {
        if self.min_conns == 0 {
            return Err(DirectoryError::Configuration(
                "min_conns must be at least 1".into(),
            ));
        }
        if self.min_conns > self.max_conns {
            return Err(DirectoryError::Configuration(
                "min_conns cannot be greater than max_conns".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.min_conns, 5);
        assert_eq!(config.max_conns, 1000);
        assert_eq!(config.max_results, 0);
        assert!(!config.error_if_down);
        assert!(config.do_cloning);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = PoolConfig::new()
            .min_conns(2)
            .max_conns(5)
            .max_results(100)
            .error_if_down(true)
            .do_cloning(false);

        assert_eq!(config.min_conns, 2);
        assert_eq!(config.max_conns, 5);
        assert_eq!(config.max_results, 100);
        assert!(config.error_if_down);
        assert!(!config.do_cloning);
    }

    #[test]
    fn test_zero_min_conns_rejected() {
        let config = PoolConfig::new().min_conns(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_min_greater_than_max_rejected() {
        let config = PoolConfig::new().min_conns(20).max_conns(10);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("greater than max_conns"));
    }

    #[test]
    fn test_equal_min_max_accepted() {
        let config = PoolConfig::new().min_conns(5).max_conns(5);
        assert!(config.validate().is_ok());
    }
}
