//! Error taxonomy for the proxy wire protocol.
//!
//! Every failure that crosses the RPC boundary is a [`ProxyError`]: a typed
//! [`ErrorKind`], a human-readable message, and the SQL state / vendor code
//! reported by the backend where one exists. The kind drives client-side
//! policy — only connection-class failures may mark an endpoint unhealthy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire-level failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Generic SQL failure (syntax, constraint violation, ...).
    Sql,
    /// SQL failure rooted in the data itself (truncation, conversion, ...).
    /// Clients map this to their "data" failure variant.
    SqlData,
    /// Transport failure: server unreachable, deadline exceeded, or the
    /// call was cancelled.
    Connection,
    /// Protocol violation: malformed request or an invalid state
    /// transition (including the XA transition table).
    Protocol,
    /// An XA verb named an Xid the resource manager does not know.
    NotATransaction,
    /// Resource-manager failure: durable store I/O, backend pool
    /// exhaustion, or another recoverable RM-side fault.
    RmError,
    /// The resource manager lost its backend connection mid-transaction.
    RmFail,
    /// A status the transport could not classify.
    Unknown,
}

impl ErrorKind {
    /// Stable lower-case name, used in log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Sql => "sql",
            ErrorKind::SqlData => "sql_data",
            ErrorKind::Connection => "connection",
            ErrorKind::Protocol => "protocol",
            ErrorKind::NotATransaction => "not_a_transaction",
            ErrorKind::RmError => "rm_error",
            ErrorKind::RmFail => "rm_fail",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error carried across the RPC boundary and between core components.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ProxyError {
    /// Failure class; drives endpoint-health policy on the client.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// SQLSTATE reported by the backend, if any.
    pub sql_state: Option<String>,
    /// Vendor-specific error code reported by the backend, if any.
    pub vendor_code: Option<i32>,
}

impl ProxyError {
    /// Creates an error of the given kind with no SQL state or vendor code.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sql_state: None,
            vendor_code: None,
        }
    }

    /// Generic SQL failure with backend diagnostics.
    pub fn sql(
        message: impl Into<String>,
        sql_state: Option<String>,
        vendor_code: Option<i32>,
    ) -> Self {
        Self {
            kind: ErrorKind::Sql,
            message: message.into(),
            sql_state,
            vendor_code,
        }
    }

    /// Transport failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Protocol violation.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    /// Attaches a SQL state.
    pub fn with_sql_state(mut self, state: impl Into<String>) -> Self {
        self.sql_state = Some(state.into());
        self
    }

    /// Attaches a vendor code.
    pub fn with_vendor_code(mut self, code: i32) -> Self {
        self.vendor_code = Some(code);
        self
    }

    /// Whether this failure must mark the responsible endpoint unhealthy.
    ///
    /// Connection-class failures are transport unavailability, breached
    /// deadlines, cancellations, and unknown statuses whose message names a
    /// connection problem. SQL failures, protocol failures, pool exhaustion
    /// (`RmError`) and session-invalidated errors are never
    /// connection-class.
    pub fn is_connection_class(&self) -> bool {
        match self.kind {
            ErrorKind::Connection => true,
            ErrorKind::Unknown => {
                let message = self.message.to_ascii_lowercase();
                message.contains("connection")
            }
            _ => false,
        }
    }
}

/// Result alias for operations that fail with a [`ProxyError`].
pub type Result<T> = std::result::Result<T, ProxyError>;
