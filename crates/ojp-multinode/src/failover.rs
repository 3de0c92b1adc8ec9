//! Failure handling and post-recovery connection redistribution.
//!
//! The failure path runs when an RPC or probe observes a connection-class
//! error: the endpoint is marked unhealthy, its channel entry unlinked, its
//! session bindings dropped, and its tracked client connections invalidated
//! so the client pool discards and replaces them.
//!
//! The recovery path is event-driven: the redistributor subscribes to
//! `endpoint_recovered` events and trims the survivors' connection excess so
//! the pool refills evenly across the enlarged healthy set. There are no
//! back-pointers between the two paths.

use crate::channel::ChannelCache;
use crate::config::MultinodeConfig;
use crate::events::EndpointEvent;
use crate::registry::EndpointRegistry;
use crate::tracker::SessionTracker;
use ojp_core::events::{EventListener, EventListeners};
use ojp_core::{Endpoint, ProxyError};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// A client-side pooled connection the core can invalidate.
///
/// Implementations wrap whatever the client pool hands out; `mark_invalid`
/// plus `close` make the pool discard the physical connection and open a
/// replacement through endpoint selection.
pub trait TrackedConnection: Send + Sync {
    /// Endpoint this connection is pinned to.
    fn endpoint(&self) -> Endpoint;

    /// Whether the connection is currently idle (eligible for rebalancing).
    fn is_idle(&self) -> bool;

    /// Marks the connection invalid so the pool will not reuse it.
    fn mark_invalid(&self);

    /// Closes the connection.
    fn close(&self);
}

/// Registry of open tracked connections.
pub struct ConnectionLedger {
    connections: RwLock<Vec<Arc<dyn TrackedConnection>>>,
}

impl ConnectionLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(Vec::new()),
        }
    }

    /// Registers an open connection.
    pub fn register(&self, connection: Arc<dyn TrackedConnection>) {
        self.connections.write().unwrap().push(connection);
    }

    /// Removes a connection (compared by identity).
    pub fn unregister(&self, connection: &Arc<dyn TrackedConnection>) {
        self.connections
            .write()
            .unwrap()
            .retain(|c| !Arc::ptr_eq(c, connection));
    }

    /// Connections pinned to `endpoint`.
    pub fn for_endpoint(&self, endpoint: &Endpoint) -> Vec<Arc<dyn TrackedConnection>> {
        self.connections
            .read()
            .unwrap()
            .iter()
            .filter(|c| &c.endpoint() == endpoint)
            .cloned()
            .collect()
    }

    /// Total open connections.
    pub fn open_count(&self) -> usize {
        self.connections.read().unwrap().len()
    }

    /// Number of connections pinned to `endpoint`.
    pub fn count_for(&self, endpoint: &Endpoint) -> usize {
        self.connections
            .read()
            .unwrap()
            .iter()
            .filter(|c| &c.endpoint() == endpoint)
            .count()
    }
}

impl Default for ConnectionLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the connection-class failure path.
pub struct FailureHandler {
    name: String,
    registry: Arc<EndpointRegistry>,
    channels: Arc<ChannelCache>,
    tracker: Arc<SessionTracker>,
    ledger: Arc<ConnectionLedger>,
    events: Arc<EventListeners<EndpointEvent>>,
}

impl FailureHandler {
    /// Wires the handler over the shared multinode state.
    pub fn new(
        name: impl Into<String>,
        registry: Arc<EndpointRegistry>,
        channels: Arc<ChannelCache>,
        tracker: Arc<SessionTracker>,
        ledger: Arc<ConnectionLedger>,
        events: Arc<EventListeners<EndpointEvent>>,
    ) -> Self {
        Self {
            name: name.into(),
            registry,
            channels,
            tracker,
            ledger,
            events,
        }
    }

    /// Inspects an RPC error; runs the failure path when it is
    /// connection-class. Returns whether the error was connection-class.
    pub fn handle_rpc_error(&self, endpoint: &Endpoint, error: &ProxyError) -> bool {
        if !error.is_connection_class() {
            return false;
        }
        self.on_connection_failure(endpoint);
        true
    }

    /// Marks `endpoint` unhealthy and invalidates everything bound to it:
    /// the channel entry, every session binding, and every tracked open
    /// connection.
    pub fn on_connection_failure(&self, endpoint: &Endpoint) {
        let transitioned = self.registry.mark_unhealthy(endpoint);
        self.channels.invalidate(endpoint);

        let dropped_sessions = self.tracker.invalidate_endpoint(endpoint);
        if !dropped_sessions.is_empty() {
            tracing::debug!(
                endpoint = %endpoint,
                sessions = dropped_sessions.len(),
                "dropped session bindings of failed endpoint"
            );
        }

        let connections = self.ledger.for_endpoint(endpoint);
        for connection in &connections {
            connection.mark_invalid();
            connection.close();
            self.ledger.unregister(connection);
        }

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "ojp_connections_invalidated_total",
            "manager" => self.name.clone(),
            "reason" => "failure"
        )
        .increment(connections.len() as u64);

        if transitioned {
            tracing::warn!(
                endpoint = %endpoint,
                sessions = dropped_sessions.len(),
                connections = connections.len(),
                "endpoint failed; sessions and connections invalidated"
            );
            self.events.emit(&EndpointEvent::Unhealthy {
                source: self.name.clone(),
                timestamp: Instant::now(),
                endpoint: endpoint.clone(),
            });
        }
    }
}

/// Rebalances open connections after an endpoint recovers.
///
/// Registered as an event listener on the shared health events; operates on
/// the ledger and registry only.
pub struct Redistributor {
    name: String,
    registry: Arc<EndpointRegistry>,
    ledger: Arc<ConnectionLedger>,
    enabled: bool,
    idle_rebalance_fraction: f64,
    max_close_per_recovery: usize,
}

impl Redistributor {
    /// Creates a redistributor from the multinode configuration.
    pub fn new(
        config: &MultinodeConfig,
        registry: Arc<EndpointRegistry>,
        ledger: Arc<ConnectionLedger>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            registry,
            ledger,
            enabled: config.xa_mode && config.redistribution_enabled,
            idle_rebalance_fraction: config.idle_rebalance_fraction,
            max_close_per_recovery: config.max_close_per_recovery,
        }
    }

    /// One rebalance pass for a newly recovered endpoint.
    ///
    /// The recovered endpoint is exempt from invalidation; survivors give up
    /// their excess over `⌊N/|H|⌋` (remainder spread first-k-get-one) and the
    /// client pool refills through the load-aware selector. Convergence to
    /// the even split is eventual.
    pub fn rebalance_for(&self, recovered: &Endpoint) {
        if !self.enabled {
            return;
        }

        let healthy = self.registry.healthy_endpoints();
        if healthy.len() < 2 {
            return;
        }

        let total = self.ledger.open_count();
        let target = total / healthy.len();
        let remainder = total % healthy.len();

        let mut budget = self.max_close_per_recovery;
        let mut invalidated = 0usize;

        for (index, endpoint) in healthy.iter().enumerate() {
            if endpoint == recovered || budget == 0 {
                continue;
            }

            let allowed = target + usize::from(index < remainder);
            let connections = self.ledger.for_endpoint(endpoint);
            let excess = connections.len().saturating_sub(allowed);
            if excess == 0 {
                continue;
            }

            let idle: Vec<_> = connections.into_iter().filter(|c| c.is_idle()).collect();
            let idle_cap = (idle.len() as f64 * self.idle_rebalance_fraction).floor() as usize;
            let to_close = excess.min(idle_cap).min(budget);

            for connection in idle.into_iter().take(to_close) {
                connection.mark_invalid();
                connection.close();
                self.ledger.unregister(&connection);
            }

            budget -= to_close;
            invalidated += to_close;
        }

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "ojp_connections_invalidated_total",
            "manager" => self.name.clone(),
            "reason" => "rebalance"
        )
        .increment(invalidated as u64);

        tracing::info!(
            manager = %self.name,
            recovered = %recovered,
            healthy = healthy.len(),
            invalidated,
            target,
            "rebalanced connections after endpoint recovery"
        );
    }
}

impl EventListener<EndpointEvent> for Redistributor {
    fn on_event(&self, event: &EndpointEvent) {
        if let EndpointEvent::Recovered { endpoint, .. } = event {
            self.rebalance_for(endpoint);
        }
    }
}
