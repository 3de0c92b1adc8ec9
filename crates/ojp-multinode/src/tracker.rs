//! Session tracker: session→endpoint bindings and connect fan-out sets.

use ojp_core::Endpoint;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Tracks which endpoint each live session is glued to, and which
/// endpoints have seen `connect()` for each logical connection hash.
///
/// The tracker never reaches inside channels or sessions; it is pure
/// bookkeeping shared by the façade, the selector and the failure handler.
pub struct SessionTracker {
    sessions: RwLock<HashMap<String, Endpoint>>,
    connections: RwLock<HashMap<String, HashSet<Endpoint>>>,
}

impl SessionTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Binds a session to an endpoint, overwriting any previous binding.
    /// An empty session uuid is rejected with a warning.
    pub fn bind(&self, session_uuid: &str, endpoint: Endpoint) {
        if session_uuid.is_empty() {
            tracing::warn!("ignoring bind of empty session uuid");
            return;
        }
        self.sessions
            .write()
            .unwrap()
            .insert(session_uuid.to_string(), endpoint);
    }

    /// Removes a session binding. Idempotent.
    pub fn unbind(&self, session_uuid: &str) {
        self.sessions.write().unwrap().remove(session_uuid);
    }

    /// The endpoint a session is bound to, if any. Never synthesises a
    /// binding.
    pub fn lookup(&self, session_uuid: &str) -> Option<Endpoint> {
        self.sessions.read().unwrap().get(session_uuid).cloned()
    }

    /// Records that `endpoint` accepted `connect()` for this connection
    /// hash.
    pub fn record_connect(&self, conn_hash: &str, endpoint: Endpoint) {
        if conn_hash.is_empty() {
            tracing::warn!("ignoring connect record for empty connection hash");
            return;
        }
        self.connections
            .write()
            .unwrap()
            .entry(conn_hash.to_string())
            .or_default()
            .insert(endpoint);
    }

    /// Every endpoint that has seen `connect()` for this connection hash.
    pub fn endpoints_for_connection(&self, conn_hash: &str) -> Vec<Endpoint> {
        self.connections
            .read()
            .unwrap()
            .get(conn_hash)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops the connect fan-out set of a connection hash. Idempotent.
    pub fn forget_connection(&self, conn_hash: &str) {
        self.connections.write().unwrap().remove(conn_hash);
    }

    /// Atomically drops every session bound to `endpoint`, returning the
    /// dropped session uuids.
    pub fn invalidate_endpoint(&self, endpoint: &Endpoint) -> Vec<String> {
        let mut sessions = self.sessions.write().unwrap();
        let dropped: Vec<String> = sessions
            .iter()
            .filter(|(_, bound)| *bound == endpoint)
            .map(|(uuid, _)| uuid.clone())
            .collect();
        for uuid in &dropped {
            sessions.remove(uuid);
        }
        dropped
    }

    /// Number of sessions currently bound to `endpoint`. Feeds the
    /// load-aware selector.
    pub fn bound_count(&self, endpoint: &Endpoint) -> usize {
        self.sessions
            .read()
            .unwrap()
            .values()
            .filter(|bound| *bound == endpoint)
            .count()
    }

    /// Total number of bound sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Whether no sessions are bound.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}
