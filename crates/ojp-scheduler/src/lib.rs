//! Fast/slow slot scheduling for the OJP SQL proxy.
//!
//! Server-side SQL execution is gated by a per-datasource slot pool split
//! into a slow and a fast side. Rolling per-query-hash statistics classify
//! each query; queries averaging at least twice the overall mean are
//! scheduled on the slow side so a burst of heavy queries cannot starve
//! cheap ones. A side that is out of native slots may borrow a free slot
//! from the opposite side once it has gone idle.
//!
//! # Example
//!
//! ```rust
//! use ojp_scheduler::SchedulerConfig;
//! use std::time::Duration;
//!
//! let config = SchedulerConfig::builder()
//!     .name("orders-db")
//!     .total_slots(10)
//!     .slow_percentage(20)
//!     .idle_timeout(Duration::from_millis(500))
//!     .build();
//! assert_eq!(config.slow_slots(), 2);
//! assert_eq!(config.fast_slots(), 8);
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod slots;
pub mod stats;

pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use error::{Result, SlotError};
pub use events::SlotEvent;
pub use gate::QueryGate;
pub use slots::{SlotClass, SlotPermit, SlotPool, SlotSnapshot};
pub use stats::QueryStats;
