//! Configuration for the multinode client.

use crate::events::EndpointEvent;
use ojp_core::events::{EventListeners, FnListener};
use ojp_core::Endpoint;
use std::time::Duration;

/// Credentials the health monitor uses for probe connections.
///
/// A probe is a real `connect` RPC; the resulting test session is
/// terminated immediately.
#[derive(Debug, Clone, Default)]
pub struct ProbeCredentials {
    /// Backend URL forwarded on the probe connect.
    pub url: String,
    /// Probe user.
    pub user: String,
    /// Probe password.
    pub password: String,
}

/// Configuration for the multinode client core.
#[derive(Clone)]
pub struct MultinodeConfig {
    pub(crate) name: String,
    pub(crate) endpoints: Vec<Endpoint>,
    pub(crate) retry_attempts: u32,
    pub(crate) retry_delay: Duration,
    pub(crate) health_interval: Duration,
    pub(crate) recovery_threshold: Duration,
    pub(crate) probe_timeout: Duration,
    pub(crate) probe_credentials: ProbeCredentials,
    pub(crate) load_aware: bool,
    pub(crate) xa_mode: bool,
    pub(crate) redistribution_enabled: bool,
    pub(crate) idle_rebalance_fraction: f64,
    pub(crate) max_close_per_recovery: usize,
    pub(crate) event_listeners: EventListeners<EndpointEvent>,
}

impl MultinodeConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> MultinodeConfigBuilder {
        MultinodeConfigBuilder::new()
    }
}

/// Builder for [`MultinodeConfig`].
pub struct MultinodeConfigBuilder {
    name: String,
    endpoints: Vec<Endpoint>,
    retry_attempts: u32,
    retry_delay: Duration,
    health_interval: Duration,
    recovery_threshold: Duration,
    probe_timeout: Duration,
    probe_credentials: ProbeCredentials,
    load_aware: bool,
    xa_mode: bool,
    redistribution_enabled: bool,
    idle_rebalance_fraction: f64,
    max_close_per_recovery: usize,
    event_listeners: EventListeners<EndpointEvent>,
}

impl MultinodeConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: "multinode".to_string(),
            endpoints: Vec::new(),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(500),
            health_interval: Duration::from_secs(5),
            recovery_threshold: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
            probe_credentials: ProbeCredentials::default(),
            load_aware: true,
            xa_mode: false,
            redistribution_enabled: true,
            idle_rebalance_fraction: 1.0,
            max_close_per_recovery: 100,
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the manager name used in logs, metrics and events.
    ///
    /// Default: "multinode"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a known proxy endpoint.
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Adds several known proxy endpoints.
    pub fn endpoints(mut self, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        self.endpoints.extend(endpoints);
        self
    }

    /// Selection retries for brand-new sessions. Bound sessions are never
    /// retried.
    ///
    /// Default: 3
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Delay between selection retries.
    ///
    /// Default: 500 ms
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Interval between health-monitor passes.
    ///
    /// Default: 5 s
    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Minimum time an endpoint stays unhealthy before a recovery probe.
    ///
    /// Default: 5 s
    pub fn recovery_threshold(mut self, threshold: Duration) -> Self {
        self.recovery_threshold = threshold;
        self
    }

    /// Timeout for an individual probe connect.
    ///
    /// Default: 5 s
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Credentials for probe connections.
    pub fn probe_credentials(mut self, credentials: ProbeCredentials) -> Self {
        self.probe_credentials = credentials;
        self
    }

    /// Enables least-bound-sessions selection for new sessions. When
    /// disabled, selection is pure round-robin.
    ///
    /// Default: true
    pub fn load_aware(mut self, enabled: bool) -> Self {
        self.load_aware = enabled;
        self
    }

    /// XA mode: the monitor also probes currently-healthy endpoints, and
    /// recovery triggers connection redistribution.
    ///
    /// Default: false
    pub fn xa_mode(mut self, enabled: bool) -> Self {
        self.xa_mode = enabled;
        self
    }

    /// Enables rebalancing of open connections when an endpoint recovers
    /// (XA mode only).
    ///
    /// Default: true
    pub fn redistribution_enabled(mut self, enabled: bool) -> Self {
        self.redistribution_enabled = enabled;
        self
    }

    /// Fraction of an endpoint's idle connections a single rebalance pass
    /// may invalidate. Clamped to `[0.0, 1.0]`.
    ///
    /// Default: 1.0
    pub fn idle_rebalance_fraction(mut self, fraction: f64) -> Self {
        self.idle_rebalance_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Maximum connections a single rebalance pass may invalidate.
    ///
    /// Default: 100
    pub fn max_close_per_recovery(mut self, max: usize) -> Self {
        self.max_close_per_recovery = max;
        self
    }

    /// Registers a callback invoked when an endpoint becomes unhealthy.
    ///
    /// Callbacks run synchronously on the observing task and must not
    /// block.
    pub fn on_endpoint_unhealthy<F>(mut self, f: F) -> Self
    where
        F: Fn(&Endpoint) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let EndpointEvent::Unhealthy { endpoint, .. } = event {
                f(endpoint);
            }
        }));
        self
    }

    /// Registers a callback invoked when an endpoint recovers.
    ///
    /// Callbacks run synchronously on the observing task and must not
    /// block.
    pub fn on_endpoint_recovered<F>(mut self, f: F) -> Self
    where
        F: Fn(&Endpoint) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let EndpointEvent::Recovered { endpoint, .. } = event {
                f(endpoint);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> MultinodeConfig {
        MultinodeConfig {
            name: self.name,
            endpoints: self.endpoints,
            retry_attempts: self.retry_attempts,
            retry_delay: self.retry_delay,
            health_interval: self.health_interval,
            recovery_threshold: self.recovery_threshold,
            probe_timeout: self.probe_timeout,
            probe_credentials: self.probe_credentials,
            load_aware: self.load_aware,
            xa_mode: self.xa_mode,
            redistribution_enabled: self.redistribution_enabled,
            idle_rebalance_fraction: self.idle_rebalance_fraction,
            max_close_per_recovery: self.max_close_per_recovery,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for MultinodeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
