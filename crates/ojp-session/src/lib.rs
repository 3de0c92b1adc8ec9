//! Server-side session management for the OJP SQL proxy.
//!
//! Every logical client session maps to one [`Session`] on exactly one
//! proxy server. The session owns its backend connection, its open result
//! cursors and its buffered large objects; the [`SessionManager`] tracks
//! the live set, stamps activity, and reaps sessions idle past the
//! configured timeout.

pub mod config;
pub mod connection;
pub mod manager;
pub mod session;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use connection::BackendConnection;
pub use manager::SessionManager;
pub use session::{LobHandle, ResultCursor, Session};
