//! Session metadata carried on every RPC.

use serde::{Deserialize, Serialize};

/// Session metadata attached to every request and echoed on every response.
///
/// A request without a `session_uuid` asks the server to establish a new
/// logical session; the reply carries the assigned uuid plus the server's
/// `target_server` self-identification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Logical session identity; `None` until the first `connect` reply.
    pub session_uuid: Option<String>,
    /// Hash of the client's logical connection configuration.
    pub conn_hash: Option<String>,
    /// Stable identity of the client process.
    pub client_uuid: Option<String>,
    /// Whether this session participates in XA transactions.
    pub is_xa: bool,
    /// Client's current view of cluster health,
    /// `host1:port1(UP);host2:port2(DOWN);...`. Populated by the client.
    pub cluster_health: Option<String>,
    /// `host:port` of the server that actually handled the request.
    /// Populated by the server.
    pub target_server: Option<String>,
}

impl SessionInfo {
    /// Metadata for a brand-new session of the given connection hash.
    pub fn for_new_session(conn_hash: impl Into<String>, client_uuid: impl Into<String>) -> Self {
        Self {
            conn_hash: Some(conn_hash.into()),
            client_uuid: Some(client_uuid.into()),
            ..Self::default()
        }
    }

    /// True once the server has assigned a session uuid.
    pub fn is_established(&self) -> bool {
        self.session_uuid.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Implemented by every RPC reply; gives the façade uniform access to the
/// echoed session metadata.
pub trait SessionCarrier {
    /// The echoed session metadata.
    fn session(&self) -> &SessionInfo;
}
