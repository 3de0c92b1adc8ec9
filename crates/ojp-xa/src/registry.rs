//! The Xid-keyed XA transaction registry.
//!
//! Enforces the branch state machine, pins one backend session to each
//! branch from `xaStart` through its terminal verb, and writes a durable
//! prepared record before `xaPrepare` returns `XA_OK`. Terminal verbs are
//! idempotent per verb: repeating `xaCommit` on a committed branch (or
//! `xaRollback` on a rolled-back one) succeeds without touching the
//! backend.

use crate::config::{PreparedStoreKind, XaConfig};
use crate::error::XaError;
use crate::pool::{XaBackend, XaSessionFactory, XaSessionPool};
use crate::state::XaState;
use crate::store::{FilePreparedStore, MemoryPreparedStore, PreparedRecord, PreparedStore};
use ojp_core::rpc::{XaEndFlags, XaStartFlags, XaVote};
use ojp_core::Xid;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

struct TxContext {
    state: XaState,
    session: Option<Box<dyn XaBackend>>,
    #[allow(dead_code)]
    created_at: Instant,
    last_access: Instant,
}

impl TxContext {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            state: XaState::Active,
            session: None,
            created_at: now,
            last_access: now,
        }
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
    }
}

type SharedContext = Arc<tokio::sync::Mutex<TxContext>>;

/// The XA registry for one datasource.
pub struct XaTransactionRegistry {
    config: XaConfig,
    store: Arc<dyn PreparedStore>,
    pool: Arc<XaSessionPool>,
    contexts: Mutex<HashMap<Xid, SharedContext>>,
    timeout_seconds: AtomicU32,
}

impl XaTransactionRegistry {
    /// Creates a registry over an explicit store.
    pub fn new(
        config: XaConfig,
        store: Arc<dyn PreparedStore>,
        factory: Box<dyn XaSessionFactory>,
    ) -> Self {
        let pool = Arc::new(XaSessionPool::new(
            factory,
            config.pool_max_total,
            config.pool_max_wait,
        ));
        let timeout = config.default_timeout_seconds;
        Self {
            config,
            store,
            pool,
            contexts: Mutex::new(HashMap::new()),
            timeout_seconds: AtomicU32::new(timeout),
        }
    }

    /// Creates a registry, building the store from the configuration.
    pub fn with_default_store(
        config: XaConfig,
        factory: Box<dyn XaSessionFactory>,
    ) -> Result<Self, XaError> {
        let store: Arc<dyn PreparedStore> = match config.store_kind {
            PreparedStoreKind::File => Arc::new(FilePreparedStore::open(
                &config.store_path,
                config.store_fsync,
                config.store_checksum,
            )?),
            PreparedStoreKind::Memory => Arc::new(MemoryPreparedStore::new()),
        };
        Ok(Self::new(config, store, factory))
    }

    /// The backend session pool.
    pub fn pool(&self) -> &Arc<XaSessionPool> {
        &self.pool
    }

    /// The durable prepared-record store.
    pub fn store(&self) -> &Arc<dyn PreparedStore> {
        &self.store
    }

    /// Warms the pool to the configured minimum idle size.
    pub async fn prewarm(&self) -> Result<(), XaError> {
        self.pool.prewarm(self.config.pool_min_idle).await
    }

    /// Current state of a branch, if the registry tracks it.
    pub async fn state_of(&self, xid: &Xid) -> Option<XaState> {
        let ctx = self.context_of(xid)?;
        let guard = ctx.lock().await;
        Some(guard.state)
    }

    fn context_of(&self, xid: &Xid) -> Option<SharedContext> {
        self.contexts.lock().unwrap().get(xid).cloned()
    }

    /// Starts, joins, or resumes a branch.
    ///
    /// `NoFlags` allocates a backend session and pins it to the branch;
    /// pool exhaustion surfaces as an RM error. `Join` requires the branch
    /// to be active on this registry. `Resume` reactivates an ended
    /// branch.
    pub async fn xa_start(&self, xid: &Xid, flags: XaStartFlags) -> Result<(), XaError> {
        match flags {
            XaStartFlags::NoFlags => self.start_new(xid).await,
            XaStartFlags::Join => {
                let ctx = self
                    .context_of(xid)
                    .ok_or_else(|| XaError::NotATransaction(xid.clone()))?;
                let mut ctx = ctx.lock().await;
                if ctx.state != XaState::Active {
                    return Err(XaError::Protocol(format!(
                        "xaStart(JOIN) on {} branch {xid}",
                        ctx.state
                    )));
                }
                ctx.touch();
                Ok(())
            }
            XaStartFlags::Resume => {
                let ctx = self
                    .context_of(xid)
                    .ok_or_else(|| XaError::NotATransaction(xid.clone()))?;
                let mut ctx = ctx.lock().await;
                if ctx.state != XaState::Ended {
                    return Err(XaError::Protocol(format!(
                        "xaStart(RESUME) on {} branch {xid}",
                        ctx.state
                    )));
                }
                let session = ctx
                    .session
                    .as_mut()
                    .ok_or_else(|| XaError::RmError(format!("branch {xid} has no pinned session")))?;
                session.start(xid, XaStartFlags::Resume).await?;
                ctx.state = XaState::Active;
                ctx.touch();
                Ok(())
            }
        }
    }

    async fn start_new(&self, xid: &Xid) -> Result<(), XaError> {
        let ctx_arc = {
            let mut contexts = self.contexts.lock().unwrap();
            if contexts.contains_key(xid) {
                return Err(XaError::Protocol(format!("duplicate xid {xid}")));
            }
            let arc: SharedContext = Arc::new(tokio::sync::Mutex::new(TxContext::new()));
            contexts.insert(xid.clone(), Arc::clone(&arc));
            arc
        };

        let mut session = match self.pool.acquire().await {
            Ok(session) => session,
            Err(error) => {
                self.contexts.lock().unwrap().remove(xid);
                return Err(error);
            }
        };

        if let Err(error) = session.start(xid, XaStartFlags::NoFlags).await {
            self.contexts.lock().unwrap().remove(xid);
            self.pool.release(session).await;
            return Err(error);
        }

        let mut ctx = ctx_arc.lock().await;
        ctx.session = Some(session);
        ctx.state = XaState::Active;
        ctx.touch();
        tracing::debug!(%xid, "xa branch started");
        Ok(())
    }

    /// Ends the association with an active branch.
    pub async fn xa_end(&self, xid: &Xid, flags: XaEndFlags) -> Result<(), XaError> {
        let ctx = self
            .context_of(xid)
            .ok_or_else(|| XaError::NotATransaction(xid.clone()))?;
        let mut ctx = ctx.lock().await;
        if ctx.state != XaState::Active {
            return Err(XaError::Protocol(format!(
                "xaEnd on {} branch {xid}",
                ctx.state
            )));
        }
        let session = ctx
            .session
            .as_mut()
            .ok_or_else(|| XaError::RmError(format!("branch {xid} has no pinned session")))?;
        session.end(xid, flags).await?;
        ctx.state = XaState::Ended;
        ctx.touch();
        Ok(())
    }

    /// Prepares an ended branch.
    ///
    /// A durable prepared record is written before `XA_OK` is returned; a
    /// store failure fails the prepare and leaves the branch ENDED. A
    /// read-only vote short-circuits straight to COMMITTED and unpins the
    /// session.
    pub async fn xa_prepare(&self, xid: &Xid) -> Result<XaVote, XaError> {
        let ctx = self
            .context_of(xid)
            .ok_or_else(|| XaError::NotATransaction(xid.clone()))?;
        let mut ctx = ctx.lock().await;
        if ctx.state != XaState::Ended {
            return Err(XaError::Protocol(format!(
                "xaPrepare on {} branch {xid}",
                ctx.state
            )));
        }

        let session = ctx
            .session
            .as_mut()
            .ok_or_else(|| XaError::RmError(format!("branch {xid} has no pinned session")))?;
        let vote = session.prepare(xid).await?;
        ctx.touch();

        match vote {
            XaVote::ReadOnly => {
                ctx.state = XaState::Committed;
                if let Some(session) = ctx.session.take() {
                    self.pool.release(session).await;
                }
                tracing::debug!(%xid, "read-only branch committed at prepare");
            }
            XaVote::Ok => {
                // Durability before the vote escapes: a crash after this
                // write must leave the xid visible to xaRecover.
                self.store
                    .append_prepared(&PreparedRecord::new(xid.clone(), None))?;
                ctx.state = XaState::Prepared;
                tracing::debug!(%xid, "branch prepared");
            }
        }
        Ok(vote)
    }

    /// Commits a branch.
    ///
    /// One-phase commit applies to an ENDED branch; a PREPARED branch
    /// commits two-phase only. Repeating the verb on a COMMITTED branch
    /// succeeds without a backend call. Unknown Xids are checked against
    /// the durable store so commit works across a restart.
    pub async fn xa_commit(&self, xid: &Xid, one_phase: bool) -> Result<(), XaError> {
        let Some(ctx) = self.context_of(xid) else {
            return self.finish_recovered(xid, true).await;
        };
        let mut ctx = ctx.lock().await;
        ctx.touch();

        match ctx.state {
            XaState::Committed => {
                tracing::debug!(%xid, "xaCommit on committed branch; no backend call");
                Ok(())
            }
            XaState::RolledBack => Err(XaError::Protocol(format!(
                "xaCommit on rolled-back branch {xid}"
            ))),
            XaState::HeuristicMixed => Err(XaError::HeuristicMixed(xid.clone())),
            XaState::Active => Err(XaError::Protocol(format!(
                "xaCommit on ACTIVE branch {xid}; xaEnd first"
            ))),
            XaState::Ended if one_phase => {
                let session = ctx
                    .session
                    .as_mut()
                    .ok_or_else(|| XaError::RmError(format!("branch {xid} has no pinned session")))?;
                match session.commit(xid, true).await {
                    Ok(()) => {
                        ctx.state = XaState::Committed;
                        if let Some(session) = ctx.session.take() {
                            self.pool.release(session).await;
                        }
                        Ok(())
                    }
                    Err(XaError::HeuristicMixed(x)) => {
                        ctx.state = XaState::HeuristicMixed;
                        Err(XaError::HeuristicMixed(x))
                    }
                    Err(error) => Err(error),
                }
            }
            XaState::Ended => Err(XaError::Protocol(format!(
                "two-phase xaCommit on unprepared branch {xid}"
            ))),
            XaState::Prepared if one_phase => Err(XaError::Protocol(format!(
                "one-phase xaCommit on prepared branch {xid}"
            ))),
            XaState::Prepared => {
                let session = ctx
                    .session
                    .as_mut()
                    .ok_or_else(|| XaError::RmError(format!("branch {xid} has no pinned session")))?;
                match session.commit(xid, false).await {
                    Ok(()) => {
                        self.store.append_clear(xid)?;
                        ctx.state = XaState::Committed;
                        if let Some(session) = ctx.session.take() {
                            self.pool.release(session).await;
                        }
                        Ok(())
                    }
                    Err(XaError::HeuristicMixed(x)) => {
                        ctx.state = XaState::HeuristicMixed;
                        Err(XaError::HeuristicMixed(x))
                    }
                    // Branch stays PREPARED and pinned; commit may be
                    // retried.
                    Err(error) => Err(error),
                }
            }
        }
    }

    /// Rolls a branch back.
    ///
    /// Legal from ACTIVE, ENDED and PREPARED; idempotent on a rolled-back
    /// branch. Unknown Xids are checked against the durable store so
    /// rollback works across a restart.
    pub async fn xa_rollback(&self, xid: &Xid) -> Result<(), XaError> {
        let Some(ctx) = self.context_of(xid) else {
            return self.finish_recovered(xid, false).await;
        };
        let mut ctx = ctx.lock().await;
        ctx.touch();

        match ctx.state {
            XaState::RolledBack => {
                tracing::debug!(%xid, "xaRollback on rolled-back branch; no backend call");
                Ok(())
            }
            XaState::Committed => Err(XaError::Protocol(format!(
                "xaRollback on committed branch {xid}"
            ))),
            XaState::HeuristicMixed => Err(XaError::HeuristicMixed(xid.clone())),
            XaState::Active | XaState::Ended | XaState::Prepared => {
                let was_prepared = ctx.state == XaState::Prepared;
                let session = ctx
                    .session
                    .as_mut()
                    .ok_or_else(|| XaError::RmError(format!("branch {xid} has no pinned session")))?;
                session.rollback(xid).await?;
                if was_prepared {
                    self.store.append_clear(xid)?;
                }
                ctx.state = XaState::RolledBack;
                if let Some(session) = ctx.session.take() {
                    self.pool.release(session).await;
                }
                Ok(())
            }
        }
    }

    /// Completes a branch known only to the durable store (post-restart).
    async fn finish_recovered(&self, xid: &Xid, commit: bool) -> Result<(), XaError> {
        let persisted = self
            .store
            .load_prepared()?
            .into_iter()
            .any(|record| &record.xid == xid);
        if !persisted {
            return Err(XaError::NotATransaction(xid.clone()));
        }

        let mut session = self.pool.acquire().await?;
        let outcome = if commit {
            session.commit(xid, false).await
        } else {
            session.rollback(xid).await
        };

        match outcome {
            Ok(()) => {
                self.store.append_clear(xid)?;
                let state = if commit {
                    XaState::Committed
                } else {
                    XaState::RolledBack
                };
                let mut ctx = TxContext::new();
                ctx.state = state;
                self.contexts
                    .lock()
                    .unwrap()
                    .insert(xid.clone(), Arc::new(tokio::sync::Mutex::new(ctx)));
                self.pool.release(session).await;
                tracing::info!(%xid, %state, "recovered branch completed");
                Ok(())
            }
            Err(error) => {
                self.pool.release(session).await;
                Err(error)
            }
        }
    }

    /// Branches currently persisted in PREPARED state. `start_scan`
    /// mirrors TMSTARTRSCAN; without it the scan returns nothing.
    pub fn xa_recover(&self, start_scan: bool) -> Result<Vec<Xid>, XaError> {
        if !start_scan {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .load_prepared()?
            .into_iter()
            .map(|record| record.xid)
            .collect())
    }

    /// Forgets a heuristically completed branch, clearing its durable
    /// record.
    pub async fn xa_forget(&self, xid: &Xid) -> Result<(), XaError> {
        let ctx = self
            .context_of(xid)
            .ok_or_else(|| XaError::NotATransaction(xid.clone()))?;
        let mut guard = ctx.lock().await;
        if guard.state != XaState::HeuristicMixed {
            return Err(XaError::Protocol(format!(
                "xaForget on {} branch {xid}",
                guard.state
            )));
        }
        if let Some(session) = guard.session.as_mut() {
            session.forget(xid).await?;
        }
        self.store.append_clear(xid)?;
        if let Some(session) = guard.session.take() {
            self.pool.release(session).await;
        }
        drop(guard);
        self.contexts.lock().unwrap().remove(xid);
        Ok(())
    }

    /// Sets the transaction timeout; zero restores the configured default.
    pub fn xa_set_transaction_timeout(&self, seconds: u32) -> bool {
        let value = if seconds == 0 {
            self.config.default_timeout_seconds
        } else {
            seconds
        };
        self.timeout_seconds.store(value, Ordering::Release);
        true
    }

    /// The current transaction timeout in seconds.
    pub fn xa_get_transaction_timeout(&self) -> u32 {
        self.timeout_seconds.load(Ordering::Acquire)
    }

    /// Whether `resource` names the same resource manager.
    pub fn xa_is_same_rm(&self, resource: &str) -> bool {
        resource == self.config.resource_name
    }
}
