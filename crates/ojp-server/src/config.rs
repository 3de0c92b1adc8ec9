//! Configuration for the server dispatcher.

/// Configuration for one proxy server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub(crate) address: String,
    pub(crate) default_fetch_size: u32,
}

impl ServerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// The `host:port` this server reports as `target_server`.
    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    address: String,
    default_fetch_size: u32,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            address: "localhost:1059".to_string(),
            default_fetch_size: 100,
        }
    }

    /// Sets the `host:port` echoed as `target_server` on every reply.
    ///
    /// Default: "localhost:1059"
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Rows per result-set page when the request does not specify one.
    ///
    /// Default: 100
    pub fn default_fetch_size(mut self, fetch_size: u32) -> Self {
        self.default_fetch_size = fetch_size.max(1);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            address: self.address,
            default_fetch_size: self.default_fetch_size,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
