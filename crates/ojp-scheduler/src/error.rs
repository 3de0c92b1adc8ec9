//! Error types for slot scheduling.

use crate::slots::SlotClass;
use ojp_core::{ErrorKind, ProxyError};
use std::time::Duration;

/// Errors that can occur when acquiring an execution slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    /// The wait budget elapsed with no slot available. Slot accounting is
    /// unchanged.
    #[error("timed out after {waited:?} waiting for a {class} slot")]
    AcquireTimeout {
        /// Which pool the caller was waiting on.
        class: SlotClass,
        /// The wait budget that elapsed.
        waited: Duration,
    },
}

/// Result alias for slot operations.
pub type Result<T> = std::result::Result<T, SlotError>;

// Saturation is resource pressure, not connectivity: the wire error must
// never be connection-class, or a busy server would be marked unhealthy.
impl From<SlotError> for ProxyError {
    fn from(error: SlotError) -> Self {
        ProxyError::new(ErrorKind::Sql, error.to_string())
    }
}
