//! The backend-connection seam.
//!
//! Database adapters live outside the core; the session layer consumes
//! them through this capability set only. Adapter variants (PostgreSQL,
//! Oracle, ...) are tagged behind the trait object and never leak into the
//! multinode core.

use async_trait::async_trait;
use ojp_core::rpc::{Row, SqlValue};
use ojp_core::ProxyError;

/// One physical connection to a backend database.
#[async_trait]
pub trait BackendConnection: Send {
    /// Executes a statement returning an update count.
    async fn execute_update(&mut self, sql: &str, params: &[SqlValue])
        -> Result<u64, ProxyError>;

    /// Executes a query returning the full row set; the session layer
    /// handles paging.
    async fn execute_query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Row>, ProxyError>;

    /// Opens an explicit transaction.
    async fn begin(&mut self) -> Result<(), ProxyError>;

    /// Commits the open transaction.
    async fn commit(&mut self) -> Result<(), ProxyError>;

    /// Rolls back the open transaction.
    async fn rollback(&mut self) -> Result<(), ProxyError>;

    /// Whether the physical connection is still usable.
    fn is_healthy(&self) -> bool;

    /// Returns the connection to a clean state (no open transaction, no
    /// session settings).
    async fn reset(&mut self) -> Result<(), ProxyError>;

    /// Closes the physical connection.
    async fn close(&mut self) -> Result<(), ProxyError>;
}
