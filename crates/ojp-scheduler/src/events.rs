//! Events emitted by the slot scheduler.

use crate::slots::SlotClass;
use ojp_core::ProxyEvent;
use std::time::Instant;

/// Events emitted as operations move through the slot pools.
#[derive(Debug, Clone)]
pub enum SlotEvent {
    /// A slot was granted.
    Acquired {
        /// Name of the pool instance.
        source: String,
        /// When the slot was granted.
        timestamp: Instant,
        /// Which pool the operation was classified into.
        class: SlotClass,
        /// Whether the slot was borrowed from the opposite pool.
        borrowed: bool,
    },
    /// The wait budget elapsed without a slot.
    Rejected {
        /// Name of the pool instance.
        source: String,
        /// When the rejection happened.
        timestamp: Instant,
        /// Which pool the operation was waiting on.
        class: SlotClass,
    },
    /// A slot was handed back.
    Released {
        /// Name of the pool instance.
        source: String,
        /// When the slot was released.
        timestamp: Instant,
        /// Which pool the operation belonged to.
        class: SlotClass,
    },
}

impl ProxyEvent for SlotEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SlotEvent::Acquired { .. } => "slot_acquired",
            SlotEvent::Rejected { .. } => "slot_rejected",
            SlotEvent::Released { .. } => "slot_released",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            SlotEvent::Acquired { timestamp, .. } => *timestamp,
            SlotEvent::Rejected { timestamp, .. } => *timestamp,
            SlotEvent::Released { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            SlotEvent::Acquired { source, .. } => source,
            SlotEvent::Rejected { source, .. } => source,
            SlotEvent::Released { source, .. } => source,
        }
    }
}
