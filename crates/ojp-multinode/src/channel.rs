//! Channel cache: one transport channel + stub per endpoint.

use ojp_core::rpc::ProxyRpc;
use ojp_core::{Endpoint, ProxyError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Opens a transport channel to an endpoint and returns its RPC stub.
///
/// Construction failures are transient: the caller marks the endpoint
/// unhealthy and retries later through the health monitor.
pub trait Connector: Send + Sync {
    /// Opens a channel to `endpoint`.
    fn open(&self, endpoint: &Endpoint) -> Result<Arc<dyn ProxyRpc>, ProxyError>;
}

impl<F> Connector for F
where
    F: Fn(&Endpoint) -> Result<Arc<dyn ProxyRpc>, ProxyError> + Send + Sync,
{
    fn open(&self, endpoint: &Endpoint) -> Result<Arc<dyn ProxyRpc>, ProxyError> {
        self(endpoint)
    }
}

/// A cached stub plus the generation it was created under.
///
/// Callers that held a stub across a failure compare the generation they
/// used against the cache's current entry to detect replacement.
#[derive(Clone)]
pub struct ChannelEntry {
    stub: Arc<dyn ProxyRpc>,
    generation: u64,
}

impl std::fmt::Debug for ChannelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEntry")
            .field("generation", &self.generation)
            .finish()
    }
}

impl ChannelEntry {
    /// The RPC stub bound to this channel.
    pub fn stub(&self) -> &Arc<dyn ProxyRpc> {
        &self.stub
    }

    /// Generation the channel was created under; advances on every
    /// replacement.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Maintains one channel entry per endpoint.
///
/// `invalidate` unlinks the entry atomically but never tears the channel
/// down: in-flight RPCs on the old stub run to completion and fail (or
/// succeed) on their own terms. The next `get_or_create` builds a fresh
/// channel under a new generation.
pub struct ChannelCache {
    connector: Arc<dyn Connector>,
    entries: RwLock<HashMap<Endpoint, ChannelEntry>>,
    next_generation: AtomicU64,
}

impl ChannelCache {
    /// Creates an empty cache over the given connector.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            entries: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Returns the current entry for `endpoint`, creating the channel on
    /// first use or after an invalidation.
    pub fn get_or_create(&self, endpoint: &Endpoint) -> Result<ChannelEntry, ProxyError> {
        if let Some(entry) = self.entries.read().unwrap().get(endpoint) {
            return Ok(entry.clone());
        }

        let stub = self.connector.open(endpoint)?;
        let mut entries = self.entries.write().unwrap();
        // Another task may have raced the creation; its entry wins and the
        // extra channel is dropped unused.
        if let Some(entry) = entries.get(endpoint) {
            return Ok(entry.clone());
        }
        let entry = ChannelEntry {
            stub,
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
        };
        tracing::debug!(endpoint = %endpoint, generation = entry.generation, "channel created");
        entries.insert(endpoint.clone(), entry.clone());
        Ok(entry)
    }

    /// The current entry for `endpoint` without creating one.
    pub fn current(&self, endpoint: &Endpoint) -> Option<ChannelEntry> {
        self.entries.read().unwrap().get(endpoint).cloned()
    }

    /// Unlinks the entry for `endpoint`. Returns true if an entry was
    /// present. The old channel is left to die with its in-flight calls.
    pub fn invalidate(&self, endpoint: &Endpoint) -> bool {
        let removed = self.entries.write().unwrap().remove(endpoint);
        if removed.is_some() {
            tracing::debug!(endpoint = %endpoint, "channel entry invalidated");
        }
        removed.is_some()
    }

    /// Whether a stub obtained under `generation` has been replaced (or
    /// dropped) since.
    pub fn is_stale(&self, endpoint: &Endpoint, generation: u64) -> bool {
        match self.entries.read().unwrap().get(endpoint) {
            Some(entry) => entry.generation != generation,
            None => true,
        }
    }
}
