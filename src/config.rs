//! Configuration for respwire connections
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

/// Default number of bytes requested from the socket per read
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

/// Configuration for a single `Connection`
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    // -------------------------------------------------------------------------
    // Timeouts
    // -------------------------------------------------------------------------
    /// End-to-end budget for one `read` or `flush` call.
    /// `None` blocks indefinitely.
    pub timeout: Option<Duration>,

    /// Budget for establishing the connection. Falls back to `timeout`.
    pub connect_timeout: Option<Duration>,

    // -------------------------------------------------------------------------
    // Socket Configuration
    // -------------------------------------------------------------------------
    /// Bytes requested per raw socket read
    pub read_chunk_size: usize,

    /// Disable Nagle's algorithm on TCP connections
    pub tcp_nodelay: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: None,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            tcp_nodelay: true,
        }
    }
}

impl ConnectionConfig {
    /// Create a new config builder
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Timeout used while connecting
    pub fn effective_connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.or(self.timeout)
    }
}

/// Builder for ConnectionConfig
#[derive(Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Set the send/receive timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Set the send/receive timeout (in milliseconds)
    pub fn timeout_ms(self, ms: u64) -> Self {
        self.timeout(Duration::from_millis(ms))
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the socket read chunk size (in bytes, at least 1)
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size.max(1);
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.config.tcp_nodelay = enabled;
        self
    }

    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}
