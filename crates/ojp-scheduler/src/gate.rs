//! The slow-query execution gate.
//!
//! Every server-side query execution runs through the gate: the query hash
//! is classified against the rolling statistics, a slot of the matching
//! class is acquired with that class's wait budget, the operation runs, the
//! measured duration is recorded, and the slot is released on every exit
//! path (success, SQL error, cancellation) through the permit's drop guard.

use crate::config::SchedulerConfig;
use crate::error::SlotError;
use crate::slots::{SlotClass, SlotPool};
use crate::stats::QueryStats;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// Gates query execution through the fast/slow slot pool.
#[derive(Clone)]
pub struct QueryGate {
    pool: SlotPool,
    stats: Arc<QueryStats>,
    enabled: bool,
    slow_wait: Duration,
    fast_wait: Duration,
}

impl QueryGate {
    /// Creates a gate (slot pool plus statistics) from the configuration.
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            pool: SlotPool::new(config),
            stats: Arc::new(QueryStats::new(config.update_global_avg_interval)),
            enabled: config.enabled,
            slow_wait: config.slow_timeout,
            fast_wait: config.fast_timeout,
        }
    }

    /// The underlying slot pool.
    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }

    /// The query statistics feeding the classifier.
    pub fn stats(&self) -> &Arc<QueryStats> {
        &self.stats
    }

    /// The class `query_hash` would currently be scheduled under.
    pub fn classify(&self, query_hash: &str) -> SlotClass {
        if self.stats.is_slow(query_hash) {
            SlotClass::Slow
        } else {
            SlotClass::Fast
        }
    }

    /// Runs `op` under a slot of the appropriate class, recording its
    /// duration in the statistics whatever the outcome.
    ///
    /// When the gate is disabled it degenerates into a pass-through that
    /// still records timings.
    pub async fn execute<T, E, F, Fut>(&self, query_hash: &str, op: F) -> Result<T, E>
    where
        E: From<SlotError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.enabled {
            let started = Instant::now();
            let result = op().await;
            self.record(query_hash, started);
            return result;
        }

        let class = self.classify(query_hash);
        let permit = match class {
            SlotClass::Slow => self.pool.acquire_slow(self.slow_wait).await,
            SlotClass::Fast => self.pool.acquire_fast(self.fast_wait).await,
        }
        .map_err(E::from)?;

        // The permit's drop guard releases the slot on every exit path,
        // including cancellation of this future.
        let started = Instant::now();
        let result = op().await;
        self.record(query_hash, started);
        drop(permit);

        result
    }

    fn record(&self, query_hash: &str, started: Instant) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.stats.record(query_hash, elapsed_ms);
    }
}
