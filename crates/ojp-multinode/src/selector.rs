//! Load-aware endpoint selection for new sessions.

use crate::registry::EndpointState;
use crate::tracker::SessionTracker;
use ojp_core::Endpoint;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Selection policy for brand-new sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Pick the endpoint with the fewest bound sessions; when every
    /// candidate carries the same count, fall back to round-robin.
    #[default]
    LoadAware,
    /// Pure round-robin over the candidates.
    RoundRobin,
}

/// Chooses an endpoint for a session that has no binding yet.
///
/// Selection is side-effect-free apart from the round-robin counter,
/// which advances once per selection.
pub struct EndpointSelector {
    policy: SelectionPolicy,
    round_robin_counter: AtomicUsize,
}

impl EndpointSelector {
    /// Creates a selector with the given policy.
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            round_robin_counter: AtomicUsize::new(0),
        }
    }

    /// Picks one of `candidates` (already filtered to healthy endpoints).
    /// Returns `None` when the slice is empty.
    pub fn select(
        &self,
        candidates: &[Arc<EndpointState>],
        tracker: &SessionTracker,
    ) -> Option<Endpoint> {
        if candidates.is_empty() {
            return None;
        }

        let index = match self.policy {
            SelectionPolicy::RoundRobin => self.round_robin(candidates.len()),
            SelectionPolicy::LoadAware => {
                let counts: Vec<usize> = candidates
                    .iter()
                    .map(|state| tracker.bound_count(state.endpoint()))
                    .collect();

                let all_equal = counts.windows(2).all(|pair| pair[0] == pair[1]);
                if all_equal {
                    self.round_robin(candidates.len())
                } else {
                    let min = *counts.iter().min().expect("candidates is non-empty");
                    counts
                        .iter()
                        .position(|count| *count == min)
                        .expect("min came from counts")
                }
            }
        };

        Some(candidates[index].endpoint().clone())
    }

    fn round_robin(&self, len: usize) -> usize {
        self.round_robin_counter.fetch_add(1, Ordering::Relaxed) % len
    }
}
