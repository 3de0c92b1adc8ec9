//! The backend-adapter seam.

use async_trait::async_trait;
use ojp_core::ProxyError;
use ojp_session::BackendConnection;
use std::collections::HashMap;

/// Opens backend connections for non-XA sessions.
///
/// Concrete adapters (PostgreSQL, Oracle, ...) live outside the core; the
/// dispatcher forwards the client's underlying URL and credentials
/// unchanged.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Opens one physical connection.
    async fn open(
        &self,
        url: &str,
        user: &str,
        password: &str,
        properties: &HashMap<String, String>,
    ) -> Result<Box<dyn BackendConnection>, ProxyError>;
}
