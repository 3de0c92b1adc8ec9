//! Core infrastructure for the OJP remote SQL proxy.
//!
//! This crate holds what every other layer shares: the wire error taxonomy,
//! the event-listener infrastructure, endpoint identity and cluster-health
//! snapshots, the session metadata carried on every RPC, XA transaction
//! identifiers, and the [`rpc::ProxyRpc`] surface itself.
//!
//! # Example
//!
//! ```rust
//! use ojp_core::{Endpoint, format_cluster_health};
//!
//! let a = Endpoint::parse("proxy-a:1059").unwrap();
//! let b = Endpoint::parse("proxy-b:1059").unwrap();
//! let health = format_cluster_health([(&a, true), (&b, false)]);
//! assert_eq!(health, "proxy-a:1059(UP);proxy-b:1059(DOWN)");
//! ```

pub mod endpoint;
pub mod error;
pub mod events;
pub mod rpc;
pub mod session;
pub mod xid;

pub use endpoint::{format_cluster_health, parse_cluster_health, Endpoint, EndpointParseError};
pub use error::{ErrorKind, ProxyError};
pub use events::{EventListener, EventListeners, FnListener, ProxyEvent};
pub use session::{SessionCarrier, SessionInfo};
pub use xid::{Xid, XidError};
