//! Per-query-hash performance tracking.
//!
//! Each query hash keeps a weighted rolling average
//! (`avg' = (avg * 4 + sample) / 5`). The overall average across hashes is
//! recomputed immediately when a new hash appears, and otherwise at most
//! once per configured interval; a known hash's sample inside the interval
//! window is discarded entirely, keeping the per-hash averages and the
//! overall average in lockstep.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::{Duration, Instant};

struct StatsInner {
    averages: HashMap<String, f64>,
    overall: f64,
    last_global_update: Option<Instant>,
}

/// Rolling query-performance statistics for one datasource.
pub struct QueryStats {
    update_interval: Duration,
    inner: Mutex<StatsInner>,
}

impl QueryStats {
    /// Creates empty statistics. `update_interval` gates how often samples
    /// of known hashes are folded in; zero folds every sample.
    pub fn new(update_interval: Duration) -> Self {
        Self {
            update_interval,
            inner: Mutex::new(StatsInner {
                averages: HashMap::new(),
                overall: 0.0,
                last_global_update: None,
            }),
        }
    }

    /// Records one execution sample in milliseconds.
    ///
    /// An unseen hash is stored immediately and triggers a recomputation of
    /// the overall average. A known hash folds its sample (and recomputes
    /// the overall average) only when the update interval has elapsed.
    pub fn record(&self, query_hash: &str, duration_ms: f64) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        match inner.averages.get(query_hash).copied() {
            None => {
                inner
                    .averages
                    .insert(query_hash.to_string(), duration_ms);
                Self::recompute_overall(&mut inner, now);
            }
            Some(average) => {
                let due = self.update_interval.is_zero()
                    || inner.last_global_update.map_or(true, |at| {
                        now.saturating_duration_since(at) >= self.update_interval
                    });
                if !due {
                    return;
                }
                let folded = (average * 4.0 + duration_ms) / 5.0;
                inner.averages.insert(query_hash.to_string(), folded);
                Self::recompute_overall(&mut inner, now);
            }
        }
    }

    fn recompute_overall(inner: &mut StatsInner, now: Instant) {
        let count = inner.averages.len();
        inner.overall = if count == 0 {
            0.0
        } else {
            inner.averages.values().sum::<f64>() / count as f64
        };
        inner.last_global_update = Some(now);
    }

    /// The rolling average for one query hash, if tracked.
    pub fn average_for(&self, query_hash: &str) -> Option<f64> {
        self.inner.lock().unwrap().averages.get(query_hash).copied()
    }

    /// The overall average across all tracked hashes.
    pub fn overall_average(&self) -> f64 {
        self.inner.lock().unwrap().overall
    }

    /// Number of distinct query hashes tracked.
    pub fn tracked_count(&self) -> usize {
        self.inner.lock().unwrap().averages.len()
    }

    /// Whether `query_hash` is currently classified as slow: its rolling
    /// average is at least twice the overall average. Unknown hashes are
    /// fast.
    pub fn is_slow(&self, query_hash: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        if inner.overall <= 0.0 {
            return false;
        }
        inner
            .averages
            .get(query_hash)
            .map_or(false, |average| *average >= 2.0 * inner.overall)
    }

    /// Resets all statistics and the interval timer.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.averages.clear();
        inner.overall = 0.0;
        inner.last_global_update = None;
    }
}
