//! Configuration for the per-datasource scheduler.

use crate::events::SlotEvent;
use crate::slots::SlotClass;
use ojp_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for one datasource's slot scheduler and query statistics.
#[derive(Clone)]
pub struct SchedulerConfig {
    pub(crate) name: String,
    pub(crate) enabled: bool,
    pub(crate) total_slots: usize,
    pub(crate) slow_percentage: u8,
    pub(crate) idle_timeout: Duration,
    pub(crate) slow_timeout: Duration,
    pub(crate) fast_timeout: Duration,
    pub(crate) update_global_avg_interval: Duration,
    pub(crate) event_listeners: EventListeners<SlotEvent>,
}

impl SchedulerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::new()
    }

    /// Number of slow slots after clamping: at least one whenever the pool
    /// has any slots at all.
    pub fn slow_slots(&self) -> usize {
        if self.total_slots == 0 {
            return 0;
        }
        (self.total_slots * usize::from(self.slow_percentage) / 100)
            .max(1)
            .min(self.total_slots)
    }

    /// Number of fast slots.
    pub fn fast_slots(&self) -> usize {
        self.total_slots - self.slow_slots()
    }
}

/// Builder for [`SchedulerConfig`].
pub struct SchedulerConfigBuilder {
    name: String,
    enabled: bool,
    total_slots: usize,
    slow_percentage: u8,
    idle_timeout: Duration,
    slow_timeout: Duration,
    fast_timeout: Duration,
    update_global_avg_interval: Duration,
    event_listeners: EventListeners<SlotEvent>,
}

impl SchedulerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: "scheduler".to_string(),
            enabled: true,
            total_slots: 10,
            slow_percentage: 20,
            idle_timeout: Duration::from_secs(1),
            slow_timeout: Duration::from_secs(10),
            fast_timeout: Duration::from_secs(5),
            update_global_avg_interval: Duration::from_secs(60),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the datasource name used in logs, metrics and events.
    ///
    /// Default: "scheduler"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables slow/fast segregation. When disabled the scheduler is a
    /// pass-through that still records query timings.
    ///
    /// Default: true
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Total concurrent execution slots, normally the effective backend
    /// pool size.
    ///
    /// Default: 10
    pub fn total_slots(mut self, total: usize) -> Self {
        self.total_slots = total;
        self
    }

    /// Percentage of slots reserved for slow queries, clamped to 0–100.
    /// At least one slot is slow whenever the pool is non-empty.
    ///
    /// Default: 20
    pub fn slow_percentage(mut self, percentage: u8) -> Self {
        self.slow_percentage = percentage.min(100);
        self
    }

    /// How long a pool must be inactive before the opposite class may
    /// borrow its free slots.
    ///
    /// Default: 1 s
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Wait budget for slow-slot acquisition used by the execution gate.
    ///
    /// Default: 10 s
    pub fn slow_timeout(mut self, timeout: Duration) -> Self {
        self.slow_timeout = timeout;
        self
    }

    /// Wait budget for fast-slot acquisition used by the execution gate.
    ///
    /// Default: 5 s
    pub fn fast_timeout(mut self, timeout: Duration) -> Self {
        self.fast_timeout = timeout;
        self
    }

    /// Minimum interval between recomputations of the overall query
    /// average for already-known query hashes. Zero recomputes on every
    /// sample.
    ///
    /// Default: 60 s
    pub fn update_global_avg_interval(mut self, interval: Duration) -> Self {
        self.update_global_avg_interval = interval;
        self
    }

    /// Registers a callback invoked when a slot acquisition times out.
    pub fn on_slot_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(SlotClass) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let SlotEvent::Rejected { class, .. } = event {
                f(*class);
            }
        }));
        self
    }

    /// Registers a callback invoked when a slot is granted; the boolean is
    /// true for borrowed slots.
    pub fn on_slot_acquired<F>(mut self, f: F) -> Self
    where
        F: Fn(SlotClass, bool) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let SlotEvent::Acquired {
                class, borrowed, ..
            } = event
            {
                f(*class, *borrowed);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> SchedulerConfig {
        SchedulerConfig {
            name: self.name,
            enabled: self.enabled,
            total_slots: self.total_slots,
            slow_percentage: self.slow_percentage,
            idle_timeout: self.idle_timeout,
            slow_timeout: self.slow_timeout,
            fast_timeout: self.fast_timeout,
            update_global_avg_interval: self.update_global_avg_interval,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
