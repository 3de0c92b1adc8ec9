//! The fast/slow slot pool.
//!
//! Each datasource gets `total_slots` units of execution concurrency,
//! split into a slow and a fast pool. A class out of native slots may
//! borrow a free slot from the opposite pool, but only once that pool has
//! been used at least once and has since gone idle. Releases pay borrowed
//! slots back first (the most recent acquisition sits on the borrowed
//! account until that account is empty).

use crate::config::SchedulerConfig;
use crate::error::SlotError;
use crate::events::SlotEvent;
use ojp_core::events::EventListeners;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant as StdInstant;
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};

/// Which pool an operation is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotClass {
    /// Queries running at or above twice the overall average.
    Slow,
    /// Everything else.
    Fast,
}

impl SlotClass {
    fn opposite(self) -> Self {
        match self {
            SlotClass::Slow => SlotClass::Fast,
            SlotClass::Fast => SlotClass::Slow,
        }
    }
}

impl fmt::Display for SlotClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SlotClass::Slow => "slow",
            SlotClass::Fast => "fast",
        })
    }
}

/// Point-in-time view of the slot counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSnapshot {
    /// Slow operations holding native slow slots.
    pub active_slow: usize,
    /// Fast operations holding native fast slots.
    pub active_fast: usize,
    /// Slow operations holding borrowed fast slots.
    pub borrowed_fast_to_slow: usize,
    /// Fast operations holding borrowed slow slots.
    pub borrowed_slow_to_fast: usize,
    /// Configured slow-slot count.
    pub slow_slots: usize,
    /// Configured fast-slot count.
    pub fast_slots: usize,
}

impl SlotSnapshot {
    /// Total operations currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.active_slow + self.active_fast + self.borrowed_fast_to_slow + self.borrowed_slow_to_fast
    }
}

#[derive(Default)]
struct Counters {
    active_slow: usize,
    active_fast: usize,
    borrowed_fast_to_slow: usize,
    borrowed_slow_to_fast: usize,
    slow_last_activity: Option<Instant>,
    fast_last_activity: Option<Instant>,
}

struct PoolShared {
    name: String,
    slow_slots: usize,
    fast_slots: usize,
    idle_timeout: Duration,
    enabled: AtomicBool,
    state: Mutex<Counters>,
    notify: Notify,
    events: EventListeners<SlotEvent>,
}

impl PoolShared {
    fn try_acquire(&self, class: SlotClass) -> Option<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        let (native, borrow) = match class {
            SlotClass::Slow => (
                state.active_slow + state.borrowed_slow_to_fast < self.slow_slots,
                self.can_borrow(&state, SlotClass::Fast, now),
            ),
            SlotClass::Fast => (
                state.active_fast + state.borrowed_fast_to_slow < self.fast_slots,
                self.can_borrow(&state, SlotClass::Slow, now),
            ),
        };

        if native {
            match class {
                SlotClass::Slow => state.active_slow += 1,
                SlotClass::Fast => state.active_fast += 1,
            }
        } else if borrow {
            match class {
                SlotClass::Slow => state.borrowed_fast_to_slow += 1,
                SlotClass::Fast => state.borrowed_slow_to_fast += 1,
            }
        } else {
            return None;
        }

        match class {
            SlotClass::Slow => state.slow_last_activity = Some(now),
            SlotClass::Fast => state.fast_last_activity = Some(now),
        }
        Some(!native)
    }

    /// Whether `lender`'s free capacity may be borrowed: it must have been
    /// used at least once, been idle for the idle timeout, and have a free
    /// slot.
    fn can_borrow(&self, state: &Counters, lender: SlotClass, now: Instant) -> bool {
        match lender {
            SlotClass::Fast => {
                let Some(last) = state.fast_last_activity else {
                    return false;
                };
                now.saturating_duration_since(last) >= self.idle_timeout
                    && state.active_fast + state.borrowed_fast_to_slow < self.fast_slots
            }
            SlotClass::Slow => {
                let Some(last) = state.slow_last_activity else {
                    return false;
                };
                now.saturating_duration_since(last) >= self.idle_timeout
                    && state.active_slow + state.borrowed_slow_to_fast < self.slow_slots
            }
        }
    }

    /// Borrowed slots are paid back before native ones.
    fn release(&self, class: SlotClass) {
        let now = Instant::now();
        {
            let mut state = self.state.lock().unwrap();
            match class {
                SlotClass::Slow => {
                    if state.borrowed_fast_to_slow > 0 {
                        state.borrowed_fast_to_slow -= 1;
                    } else {
                        state.active_slow = state.active_slow.saturating_sub(1);
                    }
                    state.slow_last_activity = Some(now);
                }
                SlotClass::Fast => {
                    if state.borrowed_slow_to_fast > 0 {
                        state.borrowed_slow_to_fast -= 1;
                    } else {
                        state.active_fast = state.active_fast.saturating_sub(1);
                    }
                    state.fast_last_activity = Some(now);
                }
            }
        }

        self.events.emit(&SlotEvent::Released {
            source: self.name.clone(),
            timestamp: StdInstant::now(),
            class,
        });
        self.notify.notify_waiters();
    }

    fn snapshot(&self) -> SlotSnapshot {
        let state = self.state.lock().unwrap();
        SlotSnapshot {
            active_slow: state.active_slow,
            active_fast: state.active_fast,
            borrowed_fast_to_slow: state.borrowed_fast_to_slow,
            borrowed_slow_to_fast: state.borrowed_slow_to_fast,
            slow_slots: self.slow_slots,
            fast_slots: self.fast_slots,
        }
    }
}

/// An acquired execution slot. Released on drop, so every exit path of the
/// guarded operation pays the slot back.
pub struct SlotPermit {
    shared: Arc<PoolShared>,
    class: SlotClass,
    counted: bool,
}

impl std::fmt::Debug for SlotPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPermit")
            .field("class", &self.class)
            .field("counted", &self.counted)
            .finish()
    }
}

impl SlotPermit {
    /// Which pool this permit was drawn from.
    pub fn class(&self) -> SlotClass {
        self.class
    }

    /// Releases the slot explicitly (equivalent to dropping the permit).
    pub fn release(self) {}
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        if self.counted {
            self.shared.release(self.class);
        }
    }
}

/// The per-datasource fast/slow slot pool.
#[derive(Clone)]
pub struct SlotPool {
    shared: Arc<PoolShared>,
}

impl SlotPool {
    /// Creates a pool from the scheduler configuration.
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                name: config.name.clone(),
                slow_slots: config.slow_slots(),
                fast_slots: config.fast_slots(),
                idle_timeout: config.idle_timeout,
                enabled: AtomicBool::new(config.enabled),
                state: Mutex::new(Counters::default()),
                notify: Notify::new(),
                events: config.event_listeners.clone(),
            }),
        }
    }

    /// Acquires a slow slot, waiting up to `wait`.
    pub async fn acquire_slow(&self, wait: Duration) -> Result<SlotPermit, SlotError> {
        self.acquire(SlotClass::Slow, wait).await
    }

    /// Acquires a fast slot, waiting up to `wait`.
    pub async fn acquire_fast(&self, wait: Duration) -> Result<SlotPermit, SlotError> {
        self.acquire(SlotClass::Fast, wait).await
    }

    /// Acquires a slot of the given class, waiting up to `wait`.
    pub async fn acquire(&self, class: SlotClass, wait: Duration) -> Result<SlotPermit, SlotError> {
        if !self.shared.enabled.load(Ordering::Acquire) {
            // Pass-through permit: nothing was counted, nothing to release.
            return Ok(SlotPermit {
                shared: Arc::clone(&self.shared),
                class,
                counted: false,
            });
        }

        let deadline = Instant::now() + wait;
        loop {
            // Register for wakeups before checking, so a release between
            // the check and the await cannot be missed.
            let notified = self.shared.notify.notified();

            if let Some(borrowed) = self.shared.try_acquire(class) {
                self.shared.events.emit(&SlotEvent::Acquired {
                    source: self.shared.name.clone(),
                    timestamp: StdInstant::now(),
                    class,
                    borrowed,
                });

                #[cfg(feature = "metrics")]
                {
                    metrics::counter!(
                        "ojp_slots_acquired_total",
                        "pool" => self.shared.name.clone(),
                        "class" => class.to_string(),
                        "borrowed" => borrowed.to_string()
                    )
                    .increment(1);
                    metrics::gauge!(
                        "ojp_slots_in_flight",
                        "pool" => self.shared.name.clone()
                    )
                    .set(self.shared.snapshot().in_flight() as f64);
                }

                if borrowed {
                    tracing::debug!(
                        pool = %self.shared.name,
                        %class,
                        lender = %class.opposite(),
                        "borrowed an idle slot from the opposite pool"
                    );
                }

                return Ok(SlotPermit {
                    shared: Arc::clone(&self.shared),
                    class,
                    counted: true,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                self.shared.events.emit(&SlotEvent::Rejected {
                    source: self.shared.name.clone(),
                    timestamp: StdInstant::now(),
                    class,
                });

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "ojp_slots_rejected_total",
                    "pool" => self.shared.name.clone(),
                    "class" => class.to_string()
                )
                .increment(1);

                return Err(SlotError::AcquireTimeout {
                    class,
                    waited: wait,
                });
            }

            let remaining = deadline.saturating_duration_since(now);
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    /// Enables or disables the scheduler at runtime. Permits counted while
    /// enabled are still released correctly after a disable.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Release);
        if !enabled {
            self.shared.notify.notify_waiters();
        }
    }

    /// Whether segregation is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Current counter values.
    pub fn snapshot(&self) -> SlotSnapshot {
        self.shared.snapshot()
    }
}
