//! Health events published by the multinode core.

use ojp_core::{Endpoint, ProxyEvent};
use std::time::Instant;

/// Events emitted when an endpoint's health changes.
///
/// Delivered to listeners in the order the monitor observes them;
/// listener invocations are synchronous and must not block.
#[derive(Debug, Clone)]
pub enum EndpointEvent {
    /// The endpoint failed a probe or an RPC with a connection-class
    /// error. Its sessions and channel entry have been invalidated.
    Unhealthy {
        /// Name of the emitting manager.
        source: String,
        /// When the transition was observed.
        timestamp: Instant,
        /// The endpoint that went down.
        endpoint: Endpoint,
    },
    /// A previously unhealthy endpoint passed a probe.
    Recovered {
        /// Name of the emitting manager.
        source: String,
        /// When the transition was observed.
        timestamp: Instant,
        /// The endpoint that came back.
        endpoint: Endpoint,
    },
}

impl EndpointEvent {
    /// The endpoint this event is about.
    pub fn endpoint(&self) -> &Endpoint {
        match self {
            EndpointEvent::Unhealthy { endpoint, .. } => endpoint,
            EndpointEvent::Recovered { endpoint, .. } => endpoint,
        }
    }
}

impl ProxyEvent for EndpointEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EndpointEvent::Unhealthy { .. } => "endpoint_unhealthy",
            EndpointEvent::Recovered { .. } => "endpoint_recovered",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            EndpointEvent::Unhealthy { timestamp, .. } => *timestamp,
            EndpointEvent::Recovered { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            EndpointEvent::Unhealthy { source, .. } => source,
            EndpointEvent::Recovered { source, .. } => source,
        }
    }
}
