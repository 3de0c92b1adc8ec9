//! Bounded pool of backend XA sessions.

use crate::error::XaError;
use async_trait::async_trait;
use ojp_core::rpc::{XaEndFlags, XaStartFlags, XaVote};
use ojp_core::Xid;
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};

/// One backend session capable of running XA verbs against the real
/// resource manager. Adapters (PostgreSQL `PREPARE TRANSACTION`, Oracle
/// OCI, ...) implement this; the registry pins one session per branch from
/// `xaStart` through the terminal verb.
#[async_trait]
pub trait XaBackend: Send {
    /// Associates the session with a branch.
    async fn start(&mut self, xid: &Xid, flags: XaStartFlags) -> Result<(), XaError>;

    /// Ends the association with a branch.
    async fn end(&mut self, xid: &Xid, flags: XaEndFlags) -> Result<(), XaError>;

    /// Prepares the branch on the backend.
    async fn prepare(&mut self, xid: &Xid) -> Result<XaVote, XaError>;

    /// Commits the branch on the backend.
    async fn commit(&mut self, xid: &Xid, one_phase: bool) -> Result<(), XaError>;

    /// Rolls the branch back on the backend.
    async fn rollback(&mut self, xid: &Xid) -> Result<(), XaError>;

    /// Forgets a heuristically completed branch on the backend.
    async fn forget(&mut self, xid: &Xid) -> Result<(), XaError>;

    /// Returns the session to a clean state before it re-enters the pool.
    async fn reset(&mut self) -> Result<(), XaError>;
}

/// Creates backend XA sessions for the pool.
#[async_trait]
pub trait XaSessionFactory: Send + Sync {
    /// Opens a new backend session.
    async fn create(&self) -> Result<Box<dyn XaBackend>, XaError>;
}

struct PoolState {
    idle: Vec<Box<dyn XaBackend>>,
    total: usize,
}

/// Bounded idle-pool of backend XA sessions.
///
/// `acquire` waits up to the configured budget; exhaustion surfaces as an
/// RM error, never as a connection failure.
pub struct XaSessionPool {
    factory: Box<dyn XaSessionFactory>,
    max_total: usize,
    max_wait: Duration,
    state: Mutex<PoolState>,
    notify: Notify,
}

impl XaSessionPool {
    /// Creates an empty pool.
    pub fn new(factory: Box<dyn XaSessionFactory>, max_total: usize, max_wait: Duration) -> Self {
        Self {
            factory,
            max_total: max_total.max(1),
            max_wait,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                total: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Opens `count` sessions ahead of demand.
    pub async fn prewarm(&self, count: usize) -> Result<(), XaError> {
        for _ in 0..count.min(self.max_total) {
            {
                let mut state = self.state.lock().unwrap();
                if state.total >= self.max_total {
                    break;
                }
                state.total += 1;
            }
            match self.factory.create().await {
                Ok(session) => self.release(session).await,
                Err(error) => {
                    self.state.lock().unwrap().total -= 1;
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    /// Takes a session, reusing an idle one or opening a new one under the
    /// total cap; waits up to the pool budget otherwise.
    pub async fn acquire(&self) -> Result<Box<dyn XaBackend>, XaError> {
        let deadline = Instant::now() + self.max_wait;
        loop {
            let notified = self.notify.notified();

            enum Plan {
                Reuse(Box<dyn XaBackend>),
                Create,
                Wait,
            }

            let plan = {
                let mut state = self.state.lock().unwrap();
                if let Some(session) = state.idle.pop() {
                    Plan::Reuse(session)
                } else if state.total < self.max_total {
                    state.total += 1;
                    Plan::Create
                } else {
                    Plan::Wait
                }
            };

            match plan {
                Plan::Reuse(session) => return Ok(session),
                Plan::Create => {
                    return match self.factory.create().await {
                        Ok(session) => Ok(session),
                        Err(error) => {
                            self.state.lock().unwrap().total -= 1;
                            self.notify.notify_waiters();
                            Err(error)
                        }
                    };
                }
                Plan::Wait => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(XaError::RmError(format!(
                            "timed out after {:?} waiting for a backend session",
                            self.max_wait
                        )));
                    }
                    let remaining = deadline.saturating_duration_since(now);
                    let _ = tokio::time::timeout(remaining, notified).await;
                }
            }
        }
    }

    /// Returns a clean session to the idle set.
    pub async fn release(&self, mut session: Box<dyn XaBackend>) {
        match session.reset().await {
            Ok(()) => {
                self.state.lock().unwrap().idle.push(session);
                self.notify.notify_waiters();
            }
            Err(error) => {
                tracing::warn!(%error, "backend session reset failed; discarding");
                self.discard();
            }
        }
    }

    /// Drops a broken session, freeing its slot in the total cap.
    pub fn discard(&self) {
        let mut state = self.state.lock().unwrap();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.notify.notify_waiters();
    }

    /// Sessions currently open (idle plus lent out).
    pub fn total(&self) -> usize {
        self.state.lock().unwrap().total
    }

    /// Sessions currently idle.
    pub fn idle(&self) -> usize {
        self.state.lock().unwrap().idle.len()
    }
}
