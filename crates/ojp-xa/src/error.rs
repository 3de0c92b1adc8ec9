//! Error types for XA coordination.

use ojp_core::{ErrorKind, ProxyError, Xid};

/// Errors surfaced by the XA transaction registry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum XaError {
    /// A verb arrived in a state the transition table forbids.
    #[error("xa protocol error: {0}")]
    Protocol(String),

    /// A verb named an Xid the registry does not know.
    #[error("unknown xid {0}")]
    NotATransaction(Xid),

    /// A recoverable resource-manager fault: durable-store I/O or backend
    /// pool exhaustion.
    #[error("resource manager error: {0}")]
    RmError(String),

    /// The backend connection was lost mid-transaction.
    #[error("resource manager failure: {0}")]
    RmFail(String),

    /// The backend completed the branch heuristically; outcomes may be
    /// mixed. Only `xaForget` clears this.
    #[error("heuristic completion of xid {0}")]
    HeuristicMixed(Xid),
}

impl XaError {
    /// The wire error kind this error maps to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            XaError::Protocol(_) => ErrorKind::Protocol,
            XaError::NotATransaction(_) => ErrorKind::NotATransaction,
            XaError::RmError(_) => ErrorKind::RmError,
            XaError::RmFail(_) => ErrorKind::RmFail,
            XaError::HeuristicMixed(_) => ErrorKind::RmError,
        }
    }
}

impl From<XaError> for ProxyError {
    fn from(error: XaError) -> Self {
        ProxyError::new(error.kind(), error.to_string())
    }
}

/// Result alias for XA operations.
pub type Result<T> = std::result::Result<T, XaError>;
