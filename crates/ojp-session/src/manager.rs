//! The server-side session manager.

use crate::config::SessionConfig;
use crate::connection::BackendConnection;
use crate::session::Session;
use ojp_core::ProxyError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Creates, tracks, times out and cleans up server-side sessions.
pub struct SessionManager {
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    // conn_hash → client_uuid, registered ahead of session creation.
    clients: RwLock<HashMap<String, String>>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Creates a manager. The cleanup task starts separately via
    /// [`SessionManager::start_cleanup`].
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            cleanup_task: Mutex::new(None),
        }
    }

    /// Registers the client uuid behind a connection hash. Called before
    /// any session is created for that client.
    pub fn register_client_uuid(&self, conn_hash: &str, client_uuid: &str) {
        if conn_hash.is_empty() || client_uuid.is_empty() {
            tracing::warn!("ignoring client registration with empty conn_hash or client_uuid");
            return;
        }
        self.clients
            .write()
            .unwrap()
            .insert(conn_hash.to_string(), client_uuid.to_string());
    }

    /// The client uuid registered for a connection hash.
    pub fn client_for(&self, conn_hash: &str) -> Option<String> {
        self.clients.read().unwrap().get(conn_hash).cloned()
    }

    /// Creates and tracks a session, assigning a fresh uuid.
    pub fn create_session(
        &self,
        conn_hash: Option<String>,
        client_uuid: Option<String>,
        is_xa: bool,
        backend: Option<Box<dyn BackendConnection>>,
    ) -> Arc<Session> {
        let session_uuid = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(
            session_uuid.clone(),
            conn_hash,
            client_uuid,
            is_xa,
            backend,
        ));
        session.touch();
        self.sessions
            .write()
            .unwrap()
            .insert(session_uuid.clone(), Arc::clone(&session));

        #[cfg(feature = "metrics")]
        metrics::gauge!("ojp_sessions_live", "manager" => self.config.name.clone())
            .set(self.len() as f64);

        tracing::debug!(session = %session_uuid, is_xa, "session created");
        session
    }

    /// Looks up a live session.
    pub fn get_session(&self, session_id: &str) -> Result<Arc<Session>, ProxyError> {
        self.sessions
            .read()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ProxyError::protocol(format!("unknown session '{session_id}'")))
    }

    /// Stamps activity on a session, keeping the reaper away.
    pub fn update_activity(&self, session_id: &str) {
        if let Ok(session) = self.get_session(session_id) {
            session.touch();
        }
    }

    /// Terminates and forgets a session. Unknown ids are an error;
    /// resource release follows [`Session::terminate`] ordering.
    pub async fn terminate_session(&self, session_id: &str) -> Result<(), ProxyError> {
        let session = {
            let mut sessions = self.sessions.write().unwrap();
            sessions.remove(session_id)
        }
        .ok_or_else(|| ProxyError::protocol(format!("unknown session '{session_id}'")))?;

        session.terminate().await;

        #[cfg(feature = "metrics")]
        metrics::gauge!("ojp_sessions_live", "manager" => self.config.name.clone())
            .set(self.len() as f64);

        Ok(())
    }

    /// Every live session.
    pub fn all_sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().unwrap().values().cloned().collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Whether no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }

    /// Starts the background reaper, if enabled.
    pub fn start_cleanup(self: &Arc<Self>) {
        if !self.config.cleanup_enabled {
            return;
        }
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.config.cleanup_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                manager.cleanup_pass().await;
            }
        });
        let mut guard = self.cleanup_task.lock().unwrap();
        if let Some(previous) = guard.replace(task) {
            previous.abort();
        }
    }

    /// Stops the background reaper.
    pub fn stop_cleanup(&self) {
        if let Some(task) = self.cleanup_task.lock().unwrap().take() {
            task.abort();
        }
    }

    /// One reaper scan: terminates every session idle past the timeout.
    /// Returns how many sessions were reaped.
    pub async fn cleanup_pass(&self) -> usize {
        let expired: Vec<Arc<Session>> = self
            .sessions
            .read()
            .unwrap()
            .values()
            .filter(|session| session.idle_for() > self.config.session_timeout)
            .cloned()
            .collect();

        let mut reaped = 0;
        for session in expired {
            let id = session.id().to_string();
            tracing::info!(
                session = %id,
                idle = ?session.idle_for(),
                "terminating idle session"
            );
            if self.terminate_session(&id).await.is_ok() {
                reaped += 1;
            }
        }

        #[cfg(feature = "metrics")]
        if reaped > 0 {
            metrics::counter!("ojp_sessions_expired_total", "manager" => self.config.name.clone())
                .increment(reaped as u64);
        }

        reaped
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.cleanup_task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}
