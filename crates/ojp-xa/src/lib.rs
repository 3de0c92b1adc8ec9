//! XA distributed-transaction coordination for the OJP SQL proxy.
//!
//! The [`XaTransactionRegistry`] drives the branch state machine
//! (`ACTIVE → ENDED → PREPARED → COMMITTED/ROLLEDBACK`), pins one backend
//! session to each branch for its whole life, and persists a prepared
//! record before `xaPrepare` ever returns `XA_OK` — so a crash between
//! prepare and commit leaves the branch visible to `xaRecover` and
//! completable after restart.

pub mod config;
pub mod error;
pub mod pool;
pub mod registry;
pub mod state;
pub mod store;

pub use config::{PreparedStoreKind, XaConfig, XaConfigBuilder};
pub use error::{Result, XaError};
pub use pool::{XaBackend, XaSessionFactory, XaSessionPool};
pub use registry::XaTransactionRegistry;
pub use state::XaState;
pub use store::{FilePreparedStore, MemoryPreparedStore, PreparedRecord, PreparedStore};
