//! Server configuration

use std::sync::Arc;

use crate::fs::{DiskSource, FileSource};

/// Hard ceiling on worker reactors.
pub const MAX_WORKERS: usize = 1024;

/// Configuration for a server instance. Shared read-only across reactors
/// once the server starts.
#[derive(Clone)]
pub struct ServerConfig {
    /// Listen port; 0 asks the kernel for an ephemeral port.
    pub port: u16,

    /// Number of worker reactors (0 = run everything on the main reactor).
    pub workers: usize,

    /// Accepted fds at or above this value are closed immediately.
    pub max_fds: usize,

    /// Where response bodies come from.
    pub source: Arc<dyn FileSource>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 80,
            workers: 4,
            max_fds: 100_000,
            source: Arc::new(DiskSource::new(".")),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listen port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the worker reactor count
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    /// Set the accepted-fd ceiling
    pub fn max_fds(mut self, n: usize) -> Self {
        self.max_fds = n;
        self
    }

    /// Set the response body source
    pub fn source(mut self, source: Arc<dyn FileSource>) -> Self {
        self.source = source;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.workers > MAX_WORKERS {
            return Err("workers exceeds maximum");
        }
        if self.max_fds < 64 {
            return Err("max_fds must be at least 64");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 80);
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.max_fds, 100_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let cfg = ServerConfig::new().port(8080).workers(2).max_fds(4096);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.max_fds, 4096);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ServerConfig::new().workers(MAX_WORKERS + 1).validate().is_err());
        assert!(ServerConfig::new().max_fds(1).validate().is_err());
        assert!(ServerConfig::new().workers(0).validate().is_ok());
    }
}
