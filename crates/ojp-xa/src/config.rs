//! Configuration for the XA transaction registry.

use std::path::PathBuf;
use std::time::Duration;

/// Which durable prepared-record store backs the registry.
///
/// Other engines plug in behind the [`crate::store::PreparedStore`] trait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedStoreKind {
    /// Append-only log file (the default, durable).
    File,
    /// In-memory store: no durability, for tests and opt-out deployments.
    Memory,
}

/// Configuration for XA coordination on one datasource.
#[derive(Debug, Clone)]
pub struct XaConfig {
    pub(crate) resource_name: String,
    pub(crate) pool_max_total: usize,
    pub(crate) pool_min_idle: usize,
    pub(crate) pool_max_wait: Duration,
    pub(crate) store_kind: PreparedStoreKind,
    pub(crate) store_path: PathBuf,
    pub(crate) store_fsync: bool,
    pub(crate) store_checksum: bool,
    pub(crate) default_timeout_seconds: u32,
}

impl XaConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> XaConfigBuilder {
        XaConfigBuilder::new()
    }

    /// The resource-manager identity used by `xaIsSameRM`.
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }
}

/// Builder for [`XaConfig`].
#[derive(Debug)]
pub struct XaConfigBuilder {
    resource_name: String,
    pool_max_total: usize,
    pool_min_idle: usize,
    pool_max_wait: Duration,
    store_kind: PreparedStoreKind,
    store_path: PathBuf,
    store_fsync: bool,
    store_checksum: bool,
    default_timeout_seconds: u32,
}

impl XaConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            resource_name: "xa".to_string(),
            pool_max_total: 10,
            pool_min_idle: 0,
            pool_max_wait: Duration::from_secs(30),
            store_kind: PreparedStoreKind::File,
            store_path: PathBuf::from("ojp-prepared.log"),
            store_fsync: true,
            store_checksum: true,
            default_timeout_seconds: 300,
        }
    }

    /// Sets the resource-manager identity used by `xaIsSameRM` and in
    /// logs.
    ///
    /// Default: "xa"
    pub fn resource_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = name.into();
        self
    }

    /// Maximum backend sessions in the XA pool.
    ///
    /// Default: 10
    pub fn pool_max_total(mut self, max: usize) -> Self {
        self.pool_max_total = max;
        self
    }

    /// Backend sessions kept warm in the pool.
    ///
    /// Default: 0
    pub fn pool_min_idle(mut self, min: usize) -> Self {
        self.pool_min_idle = min;
        self
    }

    /// How long `xaStart` waits for a pooled backend session before
    /// failing with an RM error.
    ///
    /// Default: 30 s
    pub fn pool_max_wait(mut self, wait: Duration) -> Self {
        self.pool_max_wait = wait;
        self
    }

    /// Which prepared-record store to use.
    ///
    /// Default: [`PreparedStoreKind::File`]
    pub fn store_kind(mut self, kind: PreparedStoreKind) -> Self {
        self.store_kind = kind;
        self
    }

    /// Path of the file store's append-only log.
    ///
    /// Default: "ojp-prepared.log"
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    /// Whether every store append is fsynced before prepare returns.
    ///
    /// Default: true
    pub fn store_fsync(mut self, fsync: bool) -> Self {
        self.store_fsync = fsync;
        self
    }

    /// Whether record checksums are verified on recovery scans.
    ///
    /// Default: true
    pub fn store_checksum(mut self, checksum: bool) -> Self {
        self.store_checksum = checksum;
        self
    }

    /// Default transaction timeout reported by
    /// `xaGetTransactionTimeout`.
    ///
    /// Default: 300 s
    pub fn default_timeout_seconds(mut self, seconds: u32) -> Self {
        self.default_timeout_seconds = seconds;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> XaConfig {
        XaConfig {
            resource_name: self.resource_name,
            pool_max_total: self.pool_max_total,
            pool_min_idle: self.pool_min_idle,
            pool_max_wait: self.pool_max_wait,
            store_kind: self.store_kind,
            store_path: self.store_path,
            store_fsync: self.store_fsync,
            store_checksum: self.store_checksum,
            default_timeout_seconds: self.default_timeout_seconds,
        }
    }
}

impl Default for XaConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
