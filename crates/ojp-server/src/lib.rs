//! Server-side dispatcher for the OJP SQL proxy.
//!
//! Knits the session manager, the slow-query gate and the XA registry into
//! one implementation of the [`ojp_core::rpc::ProxyRpc`] surface. The
//! transport (TLS framing, row streaming) and the concrete database
//! adapters sit on either side of this crate.

pub mod adapter;
pub mod config;
pub mod dispatcher;

pub use adapter::BackendAdapter;
pub use config::{ServerConfig, ServerConfigBuilder};
pub use dispatcher::ProxyServer;
