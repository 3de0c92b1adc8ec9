//! Configuration for the session manager.

use std::time::Duration;

/// Configuration for server-side session management.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub(crate) name: String,
    pub(crate) cleanup_enabled: bool,
    pub(crate) session_timeout: Duration,
    pub(crate) cleanup_interval: Duration,
}

impl SessionConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug)]
pub struct SessionConfigBuilder {
    name: String,
    cleanup_enabled: bool,
    session_timeout: Duration,
    cleanup_interval: Duration,
}

impl SessionConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: "sessions".to_string(),
            cleanup_enabled: true,
            session_timeout: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }

    /// Sets the manager name used in logs and metrics.
    ///
    /// Default: "sessions"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables the background idle-session reaper.
    ///
    /// Default: true
    pub fn cleanup_enabled(mut self, enabled: bool) -> Self {
        self.cleanup_enabled = enabled;
        self
    }

    /// Idle time after which a session is terminated by the reaper.
    ///
    /// Default: 30 minutes
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Interval between reaper scans.
    ///
    /// Default: 5 minutes
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            name: self.name,
            cleanup_enabled: self.cleanup_enabled,
            session_timeout: self.session_timeout,
            cleanup_interval: self.cleanup_interval,
        }
    }
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
