//! The multinode RPC façade.
//!
//! Every remote operation goes through one wrapper that stamps the outgoing
//! cluster-health view, resolves the target endpoint (sticky for
//! established sessions, load-aware selection for new ones), resolves the
//! channel through the cache, invokes the RPC, and performs failure
//! bookkeeping on connection-class errors. Once a session is bound, the
//! façade never re-routes it: a dead endpoint surfaces as *session lost*.

use crate::channel::{ChannelCache, ChannelEntry, Connector};
use crate::config::MultinodeConfig;
use crate::error::MultinodeError;
use crate::failover::{ConnectionLedger, FailureHandler, Redistributor};
use crate::monitor::HealthMonitor;
use crate::registry::EndpointRegistry;
use crate::selector::{EndpointSelector, SelectionPolicy};
use crate::tracker::SessionTracker;
use futures::future::BoxFuture;
use ojp_core::rpc::{
    Ack, BoolReply, ConnectReply, ConnectRequest, CreateLobRequest, FetchRequest, LobRef,
    LobSegment, ProxyRpc, QueryPage, ReadLobRequest, RecoverRequest, RecoveredXids,
    StatementRequest, TimeoutReply, UpdateReply, XaEndFlags, XaRequest, XaStartFlags, XaVoteReply,
};
use ojp_core::{Endpoint, ProxyError, SessionCarrier, SessionInfo};
use std::sync::Arc;
use std::time::Duration;

/// The multinode client: one value owns the registry, channel cache,
/// tracker, selector, health monitor and failure handler for a cluster of
/// proxy endpoints. No process-global state.
pub struct MultinodeClient {
    name: String,
    retry_attempts: u32,
    retry_delay: Duration,
    registry: Arc<EndpointRegistry>,
    channels: Arc<ChannelCache>,
    tracker: Arc<SessionTracker>,
    ledger: Arc<ConnectionLedger>,
    selector: EndpointSelector,
    failure: Arc<FailureHandler>,
    monitor: Arc<HealthMonitor>,
}

impl MultinodeClient {
    /// Builds a client over the configured endpoints and the transport
    /// connector. The health monitor is created stopped; call
    /// [`MultinodeClient::start`] to begin probing.
    pub fn new(config: MultinodeConfig, connector: Arc<dyn Connector>) -> Self {
        let registry = Arc::new(EndpointRegistry::new(config.endpoints.clone()));
        let channels = Arc::new(ChannelCache::new(connector));
        let tracker = Arc::new(SessionTracker::new());
        let ledger = Arc::new(ConnectionLedger::new());

        let mut listeners = config.event_listeners.clone();
        listeners.add(Redistributor::new(
            &config,
            Arc::clone(&registry),
            Arc::clone(&ledger),
        ));
        let events = Arc::new(listeners);

        let failure = Arc::new(FailureHandler::new(
            config.name.clone(),
            Arc::clone(&registry),
            Arc::clone(&channels),
            Arc::clone(&tracker),
            Arc::clone(&ledger),
            Arc::clone(&events),
        ));
        let monitor = Arc::new(HealthMonitor::new(
            &config,
            Arc::clone(&registry),
            Arc::clone(&channels),
            Arc::clone(&failure),
            events,
        ));
        let selector = EndpointSelector::new(if config.load_aware {
            SelectionPolicy::LoadAware
        } else {
            SelectionPolicy::RoundRobin
        });

        Self {
            name: config.name,
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay,
            registry,
            channels,
            tracker,
            ledger,
            selector,
            failure,
            monitor,
        }
    }

    /// Starts the background health monitor.
    pub fn start(&self) {
        self.monitor.start();
    }

    /// Stops the background health monitor.
    pub fn shutdown(&self) {
        self.monitor.stop();
    }

    /// Manager name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The endpoint registry.
    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    /// The session tracker.
    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    /// The open-connection ledger.
    pub fn ledger(&self) -> &Arc<ConnectionLedger> {
        &self.ledger
    }

    /// The channel cache.
    pub fn channels(&self) -> &Arc<ChannelCache> {
        &self.channels
    }

    /// The health monitor (for triggering explicit passes in tests and
    /// administrative tooling).
    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// The failure handler (exposed for transports that detect failures
    /// out of band).
    pub fn failure_handler(&self) -> &Arc<FailureHandler> {
        &self.failure
    }

    /// Establishes or rejoins a logical session.
    pub async fn connect(&self, request: ConnectRequest) -> Result<ConnectReply, MultinodeError> {
        let conn_hash = request.session.conn_hash.clone();
        let base_session = request.session.clone();
        let (reply, contacted) = self
            .invoke_inner(base_session, move |stub, session| {
                let mut request = request.clone();
                request.session = session;
                Box::pin(async move { stub.connect(request).await })
            })
            .await?;
        if let Some(hash) = conn_hash {
            self.tracker.record_connect(&hash, contacted);
        }
        Ok(reply)
    }

    /// Executes a statement that returns an update count.
    pub async fn execute_update(
        &self,
        request: StatementRequest,
    ) -> Result<UpdateReply, MultinodeError> {
        let session = request.session.clone();
        self.invoke(session, move |stub, session| {
            let mut request = request.clone();
            request.session = session;
            Box::pin(async move { stub.execute_update(request).await })
        })
        .await
    }

    /// Executes a query, returning the first page of rows.
    pub async fn execute_query(
        &self,
        request: StatementRequest,
    ) -> Result<QueryPage, MultinodeError> {
        let session = request.session.clone();
        self.invoke(session, move |stub, session| {
            let mut request = request.clone();
            request.session = session;
            Box::pin(async move { stub.execute_query(request).await })
        })
        .await
    }

    /// Fetches the next page of an open result set.
    pub async fn fetch_next_rows(
        &self,
        request: FetchRequest,
    ) -> Result<QueryPage, MultinodeError> {
        let session = request.session.clone();
        self.invoke(session, move |stub, session| {
            let mut request = request.clone();
            request.session = session;
            Box::pin(async move { stub.fetch_next_rows(request).await })
        })
        .await
    }

    /// Uploads a large object scoped to the session.
    pub async fn create_lob(&self, request: CreateLobRequest) -> Result<LobRef, MultinodeError> {
        let session = request.session.clone();
        self.invoke(session, move |stub, session| {
            let mut request = request.clone();
            request.session = session;
            Box::pin(async move { stub.create_lob(request).await })
        })
        .await
    }

    /// Reads a slice of a session-scoped large object.
    pub async fn read_lob(&self, request: ReadLobRequest) -> Result<LobSegment, MultinodeError> {
        let session = request.session.clone();
        self.invoke(session, move |stub, session| {
            let mut request = request.clone();
            request.session = session;
            Box::pin(async move { stub.read_lob(request).await })
        })
        .await
    }

    /// Opens an explicit local transaction.
    pub async fn start_transaction(&self, session: SessionInfo) -> Result<Ack, MultinodeError> {
        self.invoke(session, move |stub, session| {
            Box::pin(async move { stub.start_transaction(session).await })
        })
        .await
    }

    /// Commits the session's local transaction.
    pub async fn commit_transaction(&self, session: SessionInfo) -> Result<Ack, MultinodeError> {
        self.invoke(session, move |stub, session| {
            Box::pin(async move { stub.commit_transaction(session).await })
        })
        .await
    }

    /// Rolls back the session's local transaction.
    pub async fn rollback_transaction(&self, session: SessionInfo) -> Result<Ack, MultinodeError> {
        self.invoke(session, move |stub, session| {
            Box::pin(async move { stub.rollback_transaction(session).await })
        })
        .await
    }

    /// Starts, joins, or resumes an XA branch.
    pub async fn xa_start(
        &self,
        request: XaRequest,
        flags: XaStartFlags,
    ) -> Result<Ack, MultinodeError> {
        let session = request.session.clone();
        self.invoke(session, move |stub, session| {
            let mut request = request.clone();
            request.session = session;
            Box::pin(async move { stub.xa_start(request, flags).await })
        })
        .await
    }

    /// Ends the active association with an XA branch.
    pub async fn xa_end(
        &self,
        request: XaRequest,
        flags: XaEndFlags,
    ) -> Result<Ack, MultinodeError> {
        let session = request.session.clone();
        self.invoke(session, move |stub, session| {
            let mut request = request.clone();
            request.session = session;
            Box::pin(async move { stub.xa_end(request, flags).await })
        })
        .await
    }

    /// Prepares an XA branch.
    pub async fn xa_prepare(&self, request: XaRequest) -> Result<XaVoteReply, MultinodeError> {
        let session = request.session.clone();
        self.invoke(session, move |stub, session| {
            let mut request = request.clone();
            request.session = session;
            Box::pin(async move { stub.xa_prepare(request).await })
        })
        .await
    }

    /// Commits an XA branch.
    pub async fn xa_commit(
        &self,
        request: XaRequest,
        one_phase: bool,
    ) -> Result<Ack, MultinodeError> {
        let session = request.session.clone();
        self.invoke(session, move |stub, session| {
            let mut request = request.clone();
            request.session = session;
            Box::pin(async move { stub.xa_commit(request, one_phase).await })
        })
        .await
    }

    /// Rolls back an XA branch.
    pub async fn xa_rollback(&self, request: XaRequest) -> Result<Ack, MultinodeError> {
        let session = request.session.clone();
        self.invoke(session, move |stub, session| {
            let mut request = request.clone();
            request.session = session;
            Box::pin(async move { stub.xa_rollback(request).await })
        })
        .await
    }

    /// Lists branches persisted in PREPARED state.
    pub async fn xa_recover(
        &self,
        request: RecoverRequest,
    ) -> Result<RecoveredXids, MultinodeError> {
        let session = request.session.clone();
        self.invoke(session, move |stub, session| {
            let mut request = request.clone();
            request.session = session;
            Box::pin(async move { stub.xa_recover(request).await })
        })
        .await
    }

    /// Forgets a heuristically completed branch.
    pub async fn xa_forget(&self, request: XaRequest) -> Result<Ack, MultinodeError> {
        let session = request.session.clone();
        self.invoke(session, move |stub, session| {
            let mut request = request.clone();
            request.session = session;
            Box::pin(async move { stub.xa_forget(request).await })
        })
        .await
    }

    /// Sets the session's XA transaction timeout.
    pub async fn xa_set_transaction_timeout(
        &self,
        session: SessionInfo,
        seconds: u32,
    ) -> Result<BoolReply, MultinodeError> {
        self.invoke(session, move |stub, session| {
            Box::pin(async move { stub.xa_set_transaction_timeout(session, seconds).await })
        })
        .await
    }

    /// Reads the session's XA transaction timeout.
    pub async fn xa_get_transaction_timeout(
        &self,
        session: SessionInfo,
    ) -> Result<TimeoutReply, MultinodeError> {
        self.invoke(session, move |stub, session| {
            Box::pin(async move { stub.xa_get_transaction_timeout(session).await })
        })
        .await
    }

    /// Whether the session's server fronts the same resource manager.
    pub async fn xa_is_same_rm(
        &self,
        session: SessionInfo,
        resource: String,
    ) -> Result<BoolReply, MultinodeError> {
        self.invoke(session, move |stub, session| {
            let resource = resource.clone();
            Box::pin(async move { stub.xa_is_same_rm(session, resource).await })
        })
        .await
    }

    /// Terminates a session.
    ///
    /// A bound session is terminated on its endpoint only; an unbound
    /// session with a known connection hash is terminated on every endpoint
    /// that saw `connect()` for it, so no server leaks resources. Tracker
    /// state is cleaned up either way. Per-endpoint failures are logged and
    /// fed to the failure handler but do not fail the termination.
    pub async fn terminate_session(&self, session: SessionInfo) -> Result<(), MultinodeError> {
        let mut session = session;
        session.cluster_health = Some(self.registry.cluster_health());

        let uuid = session.session_uuid.clone().filter(|u| !u.is_empty());
        let conn_hash = session.conn_hash.clone();

        if let Some(uuid) = &uuid {
            if let Some(endpoint) = self.tracker.lookup(uuid) {
                self.terminate_on(&endpoint, session).await;
                self.tracker.unbind(uuid);
                if let Some(hash) = &conn_hash {
                    self.tracker.forget_connection(hash);
                }
                return Ok(());
            }
        }

        if let Some(hash) = &conn_hash {
            for endpoint in self.tracker.endpoints_for_connection(hash) {
                self.terminate_on(&endpoint, session.clone()).await;
            }
            self.tracker.forget_connection(hash);
        }
        if let Some(uuid) = &uuid {
            self.tracker.unbind(uuid);
        }
        Ok(())
    }

    async fn terminate_on(&self, endpoint: &Endpoint, session: SessionInfo) {
        match self.channel_for(endpoint) {
            Ok(entry) => {
                if let Err(error) = entry.stub().terminate_session(session).await {
                    self.failure.handle_rpc_error(endpoint, &error);
                    tracing::warn!(endpoint = %endpoint, %error, "session terminate failed");
                }
            }
            Err(error) => {
                tracing::warn!(endpoint = %endpoint, %error, "no channel for session terminate");
            }
        }
    }

    async fn invoke<R, F>(&self, session: SessionInfo, op: F) -> Result<R, MultinodeError>
    where
        R: SessionCarrier + Send + 'static,
        F: Fn(Arc<dyn ProxyRpc>, SessionInfo) -> BoxFuture<'static, Result<R, ProxyError>>
            + Send
            + Sync,
    {
        self.invoke_inner(session, op).await.map(|(reply, _)| reply)
    }

    /// The per-RPC wrapper. Returns the reply plus the endpoint actually
    /// contacted.
    async fn invoke_inner<R, F>(
        &self,
        mut session: SessionInfo,
        op: F,
    ) -> Result<(R, Endpoint), MultinodeError>
    where
        R: SessionCarrier + Send + 'static,
        F: Fn(Arc<dyn ProxyRpc>, SessionInfo) -> BoxFuture<'static, Result<R, ProxyError>>
            + Send
            + Sync,
    {
        session.cluster_health = Some(self.registry.cluster_health());

        if session.is_established() {
            self.invoke_sticky(session, &op).await
        } else {
            self.invoke_with_selection(session, &op).await
        }
    }

    /// A bound session reaches its endpoint or fails; it is never
    /// re-routed.
    async fn invoke_sticky<R, F>(
        &self,
        session: SessionInfo,
        op: &F,
    ) -> Result<(R, Endpoint), MultinodeError>
    where
        R: SessionCarrier + Send + 'static,
        F: Fn(Arc<dyn ProxyRpc>, SessionInfo) -> BoxFuture<'static, Result<R, ProxyError>>
            + Send
            + Sync,
    {
        let uuid = session
            .session_uuid
            .clone()
            .expect("established session carries a uuid");

        let endpoint = self
            .tracker
            .lookup(&uuid)
            .ok_or_else(|| MultinodeError::SessionLost(uuid.clone()))?;

        let healthy = self
            .registry
            .get(&endpoint)
            .map(|state| state.is_healthy())
            .unwrap_or(false);
        if !healthy {
            self.tracker.unbind(&uuid);
            tracing::warn!(session = %uuid, endpoint = %endpoint, "bound endpoint is down; session lost");
            return Err(MultinodeError::SessionLost(uuid));
        }

        let entry = self.channel_for(&endpoint)?;
        match op(Arc::clone(entry.stub()), session).await {
            Ok(reply) => Ok((reply, endpoint)),
            Err(error) => {
                self.failure.handle_rpc_error(&endpoint, &error);
                Err(error.into())
            }
        }
    }

    /// A new session tries healthy endpoints under the selection policy,
    /// up to the configured retry budget. Only connection-class failures
    /// consume retries; server-reported errors propagate immediately.
    async fn invoke_with_selection<R, F>(
        &self,
        session: SessionInfo,
        op: &F,
    ) -> Result<(R, Endpoint), MultinodeError>
    where
        R: SessionCarrier + Send + 'static,
        F: Fn(Arc<dyn ProxyRpc>, SessionInfo) -> BoxFuture<'static, Result<R, ProxyError>>
            + Send
            + Sync,
    {
        let attempts = self.retry_attempts.max(1);
        let mut last_error: Option<MultinodeError> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }

            let endpoint = match self.select_endpoint().await {
                Ok(endpoint) => endpoint,
                Err(error) => {
                    last_error = Some(error);
                    continue;
                }
            };

            let entry = match self.channel_for(&endpoint) {
                Ok(entry) => entry,
                Err(error) => {
                    last_error = Some(error.into());
                    continue;
                }
            };

            match op(Arc::clone(entry.stub()), session.clone()).await {
                Ok(reply) => {
                    self.bind_fresh_session(&endpoint, reply.session());
                    return Ok((reply, endpoint));
                }
                Err(error) => {
                    let connection_class = self.failure.handle_rpc_error(&endpoint, &error);
                    if !connection_class {
                        return Err(error.into());
                    }
                    tracing::debug!(
                        endpoint = %endpoint,
                        attempt,
                        %error,
                        "selection attempt failed with connection-class error"
                    );
                    last_error = Some(error.into());
                }
            }
        }

        Err(last_error.unwrap_or(MultinodeError::NoHealthyServer))
    }

    /// Picks a healthy endpoint for a new session, running a last-resort
    /// recovery pass first when none is available.
    async fn select_endpoint(&self) -> Result<Endpoint, MultinodeError> {
        let mut candidates = self.registry.healthy_states();
        if candidates.is_empty() {
            self.monitor.recovery_pass().await;
            candidates = self.registry.healthy_states();
        }
        self.selector
            .select(&candidates, &self.tracker)
            .ok_or(MultinodeError::NoHealthyServer)
    }

    /// Resolves the channel entry for an endpoint. Fetching the entry from
    /// the cache on every call is what refreshes stubs made stale by a
    /// failure/recovery cycle; the entry generation identifies the channel
    /// incarnation for callers that cache stubs across calls.
    fn channel_for(&self, endpoint: &Endpoint) -> Result<ChannelEntry, ProxyError> {
        self.channels.get_or_create(endpoint).map_err(|error| {
            self.failure.on_connection_failure(endpoint);
            error
        })
    }

    /// Binds a freshly created session (request had no uuid, reply has
    /// one) to the server that handled it, preferring the server-echoed
    /// `target_server` when it names a known endpoint.
    fn bind_fresh_session(&self, contacted: &Endpoint, reply: &SessionInfo) {
        let Some(uuid) = reply.session_uuid.as_deref().filter(|u| !u.is_empty()) else {
            return;
        };

        let echoed = reply
            .target_server
            .as_deref()
            .and_then(|address| Endpoint::parse(address).ok());

        let endpoint = match echoed {
            Some(echoed) if self.registry.contains(&echoed) => {
                if &echoed != contacted {
                    tracing::warn!(
                        session = uuid,
                        contacted = %contacted,
                        echoed = %echoed,
                        "server echoed a different target server; binding to the echoed endpoint"
                    );
                }
                echoed
            }
            Some(echoed) => {
                tracing::warn!(
                    session = uuid,
                    contacted = %contacted,
                    echoed = %echoed,
                    "server echoed an unknown target server; binding to the contacted endpoint"
                );
                contacted.clone()
            }
            None => contacted.clone(),
        };

        self.tracker.bind(uuid, endpoint);
    }
}
