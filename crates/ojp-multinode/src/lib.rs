//! Multinode client core for the OJP remote SQL proxy.
//!
//! A fleet of proxy servers fronts the backend databases; this crate keeps
//! thin clients correctly glued to that fleet:
//!
//! - **Stickiness** — a session created on one endpoint stays on it for its
//!   whole life. A dead endpoint surfaces as *session lost*, never as a
//!   silent re-route.
//! - **Load-aware selection** — new sessions go to the healthy endpoint
//!   with the fewest bound sessions, round-robin on ties.
//! - **Health awareness** — a background monitor probes unhealthy endpoints
//!   for recovery (and, in XA mode, healthy endpoints for silent failure),
//!   publishing `endpoint_unhealthy` / `endpoint_recovered` events.
//! - **Redistribution** — after a recovery, open client connections are
//!   trimmed from the survivors so the pool refills evenly across the
//!   enlarged healthy set.
//!
//! # Example
//!
//! ```rust
//! use ojp_multinode::{MultinodeConfig, MultinodeUrl};
//! use std::time::Duration;
//!
//! let url = MultinodeUrl::parse("ojp[proxy-a:1059,proxy-b:1059]_postgresql://db/app").unwrap();
//! assert!(url.is_multinode());
//!
//! let config = MultinodeConfig::builder()
//!     .name("app-cluster")
//!     .endpoints(url.endpoints.clone())
//!     .health_interval(Duration::from_secs(5))
//!     .recovery_threshold(Duration::from_secs(5))
//!     .on_endpoint_unhealthy(|endpoint| {
//!         eprintln!("proxy {endpoint} is down");
//!     })
//!     .build();
//! # let _ = config;
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod facade;
pub mod failover;
pub mod monitor;
pub mod registry;
pub mod selector;
pub mod tracker;
pub mod url;

pub use channel::{ChannelCache, ChannelEntry, Connector};
pub use config::{MultinodeConfig, MultinodeConfigBuilder, ProbeCredentials};
pub use error::{MultinodeError, Result};
pub use events::EndpointEvent;
pub use facade::MultinodeClient;
pub use failover::{ConnectionLedger, FailureHandler, Redistributor, TrackedConnection};
pub use monitor::HealthMonitor;
pub use registry::{EndpointRegistry, EndpointState};
pub use selector::{EndpointSelector, SelectionPolicy};
pub use tracker::SessionTracker;
pub use url::{MultinodeUrl, UrlParseError};
