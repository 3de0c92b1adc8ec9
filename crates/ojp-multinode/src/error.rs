//! Error types for the multinode client.

use ojp_core::ProxyError;

/// Errors surfaced by the multinode façade.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MultinodeError {
    /// Every known endpoint is unhealthy, even after a last-resort
    /// recovery pass.
    #[error("no healthy proxy server available")]
    NoHealthyServer,

    /// The session's bound endpoint is no longer valid. The binding has
    /// been removed; retrying the same session keeps failing.
    #[error("session '{0}' lost: its bound server is no longer available")]
    SessionLost(String),

    /// An error reported by the server or the transport, propagated
    /// unchanged after any failure bookkeeping.
    #[error(transparent)]
    Rpc(#[from] ProxyError),
}

/// Result alias for multinode operations.
pub type Result<T> = std::result::Result<T, MultinodeError>;
