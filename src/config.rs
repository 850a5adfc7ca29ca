//! Configuration options for connecting a filter to its backing store.

use std::time::Duration;

/// Largest value the store accepts under one key, in bytes.
/// Default: 512MB
pub const DEFAULT_MAX_VALUE_BYTES: u64 = 512 * 1024 * 1024;

/// Bits per shard key derived from [`DEFAULT_MAX_VALUE_BYTES`].
pub const DEFAULT_MAX_SHARD_BITS: u64 = DEFAULT_MAX_VALUE_BYTES * 8;

/// Configuration options for opening a filter against a remote store.
#[derive(Debug, Clone)]
pub struct Options {
    /// Host name or address of the store.
    /// Default: "127.0.0.1"
    pub host: String,

    /// TCP port of the store.
    /// Default: 6379
    pub port: u16,

    /// Numbered namespace (database) selected after connecting.
    /// Filters with the same name in different namespaces are disjoint.
    /// Default: 0
    pub db: u32,

    /// Maximum number of bits stored under a single shard key.
    /// Default: 512MB * 8
    pub max_shard_bits: u64,

    /// Deadline for establishing the TCP connection.
    /// `None` waits for the operating system's own timeout.
    /// Default: 5s
    pub connect_timeout: Option<Duration>,

    /// Deadline for each socket read and write.
    /// `None` blocks until the store answers.
    /// Default: 5s
    pub io_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            max_shard_bits: DEFAULT_MAX_SHARD_BITS,
            connect_timeout: Some(Duration::from_secs(5)),
            io_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the store port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the namespace selected after connecting.
    pub fn db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    /// Sets the maximum number of bits per shard key.
    pub fn max_shard_bits(mut self, bits: u64) -> Self {
        self.max_shard_bits = bits;
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the socket read/write timeout.
    pub fn io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Returns `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.host.is_empty() {
            return Err(crate::Error::invalid_parameter("host must not be empty"));
        }
        if self.port == 0 {
            return Err(crate::Error::invalid_parameter("port must be > 0"));
        }
        if self.max_shard_bits == 0 {
            return Err(crate::Error::invalid_parameter("max_shard_bits must be > 0"));
        }
        if self.connect_timeout == Some(Duration::ZERO) || self.io_timeout == Some(Duration::ZERO)
        {
            // Zero is rejected by the socket API; use None to disable a timeout.
            return Err(crate::Error::invalid_parameter("timeouts must be > 0"));
        }
        Ok(())
    }
}
