//! Endpoint registry: known proxy nodes with their health state.

use ojp_core::{format_cluster_health, Endpoint};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Health state of one registered endpoint.
///
/// An endpoint turns unhealthy only through a connection-class error or a
/// failed probe, and healthy again only through a successful probe.
pub struct EndpointState {
    endpoint: Endpoint,
    healthy: AtomicBool,
    // Nanoseconds since the registry origin; 0 means "never failed".
    last_failure_nanos: AtomicU64,
}

impl EndpointState {
    fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            healthy: AtomicBool::new(true),
            last_failure_nanos: AtomicU64::new(0),
        }
    }

    /// The endpoint identity.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Current health flag.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }
}

/// The set of known proxy endpoints.
pub struct EndpointRegistry {
    endpoints: RwLock<Vec<Arc<EndpointState>>>,
    origin: Instant,
}

impl EndpointRegistry {
    /// Creates a registry over the given endpoints, all initially healthy.
    /// Duplicate addresses are dropped; insertion order is preserved.
    pub fn new(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        let registry = Self {
            endpoints: RwLock::new(Vec::new()),
            origin: Instant::now(),
        };
        for endpoint in endpoints {
            registry.add(endpoint);
        }
        registry
    }

    fn now_nanos(&self) -> u64 {
        // 0 is the "never failed" sentinel.
        (self.origin.elapsed().as_nanos() as u64).max(1)
    }

    /// Adds an endpoint if its address is not already registered.
    /// Returns false on a duplicate.
    pub fn add(&self, endpoint: Endpoint) -> bool {
        let mut endpoints = self.endpoints.write().unwrap();
        if endpoints.iter().any(|s| s.endpoint == endpoint) {
            return false;
        }
        endpoints.push(Arc::new(EndpointState::new(endpoint)));
        true
    }

    /// All registered endpoint states, in registration order.
    pub fn all(&self) -> Vec<Arc<EndpointState>> {
        self.endpoints.read().unwrap().clone()
    }

    /// The state for one endpoint, if registered.
    pub fn get(&self, endpoint: &Endpoint) -> Option<Arc<EndpointState>> {
        self.endpoints
            .read()
            .unwrap()
            .iter()
            .find(|s| &s.endpoint == endpoint)
            .cloned()
    }

    /// Whether the endpoint is registered.
    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.get(endpoint).is_some()
    }

    /// States of the currently-healthy endpoints, in registration order.
    pub fn healthy_states(&self) -> Vec<Arc<EndpointState>> {
        self.endpoints
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.is_healthy())
            .cloned()
            .collect()
    }

    /// Addresses of the currently-healthy endpoints.
    pub fn healthy_endpoints(&self) -> Vec<Endpoint> {
        self.healthy_states()
            .into_iter()
            .map(|s| s.endpoint.clone())
            .collect()
    }

    /// States of the currently-unhealthy endpoints.
    pub fn unhealthy_states(&self) -> Vec<Arc<EndpointState>> {
        self.endpoints
            .read()
            .unwrap()
            .iter()
            .filter(|s| !s.is_healthy())
            .cloned()
            .collect()
    }

    /// Marks an endpoint unhealthy and stamps its failure time.
    /// Returns true if this call performed the healthy→unhealthy
    /// transition.
    pub fn mark_unhealthy(&self, endpoint: &Endpoint) -> bool {
        let Some(state) = self.get(endpoint) else {
            return false;
        };
        state
            .last_failure_nanos
            .store(self.now_nanos(), Ordering::Release);
        let transitioned = state.healthy.swap(false, Ordering::AcqRel);
        if transitioned {
            tracing::debug!(endpoint = %endpoint, "endpoint marked unhealthy");
        }
        transitioned
    }

    /// Refreshes the failure timestamp of an already-unhealthy endpoint
    /// (a failed recovery probe).
    pub fn refresh_failure(&self, endpoint: &Endpoint) {
        if let Some(state) = self.get(endpoint) {
            state
                .last_failure_nanos
                .store(self.now_nanos(), Ordering::Release);
        }
    }

    /// Marks an endpoint healthy after a successful probe.
    /// Returns true if this call performed the unhealthy→healthy
    /// transition.
    pub fn mark_healthy(&self, endpoint: &Endpoint) -> bool {
        let Some(state) = self.get(endpoint) else {
            return false;
        };
        let transitioned = !state.healthy.swap(true, Ordering::AcqRel);
        if transitioned {
            tracing::debug!(endpoint = %endpoint, "endpoint marked healthy");
        }
        transitioned
    }

    /// Time elapsed since the endpoint's last recorded failure, or `None`
    /// if it never failed.
    pub fn elapsed_since_failure(&self, state: &EndpointState) -> Option<Duration> {
        let failed_at = state.last_failure_nanos.load(Ordering::Acquire);
        if failed_at == 0 {
            return None;
        }
        let now = self.origin.elapsed().as_nanos() as u64;
        Some(Duration::from_nanos(now.saturating_sub(failed_at)))
    }

    /// Renders the cluster-health field for outgoing requests:
    /// `host1:port1(UP);host2:port2(DOWN);...`.
    pub fn cluster_health(&self) -> String {
        let endpoints = self.endpoints.read().unwrap();
        format_cluster_health(
            endpoints
                .iter()
                .map(|s| (&s.endpoint, s.is_healthy()))
                .collect::<Vec<_>>(),
        )
    }
}
