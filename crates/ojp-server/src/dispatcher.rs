//! The server-side RPC dispatcher.
//!
//! One [`ProxyServer`] implements the full [`ProxyRpc`] surface: it routes
//! each arriving request to its session, stamps activity, runs SQL through
//! the slow-query gate, pages result sets through the session's statement
//! table, buffers LOBs in the session's LOB table, and forwards XA verbs
//! to the transaction registry.

use crate::adapter::BackendAdapter;
use crate::config::ServerConfig;
use async_trait::async_trait;
use ojp_core::rpc::{
    Ack, BoolReply, ConnectReply, ConnectRequest, CreateLobRequest, FetchRequest, LobRef,
    LobSegment, ProxyRpc, QueryPage, ReadLobRequest, RecoverRequest, RecoveredXids,
    StatementRequest, TimeoutReply, UpdateReply, XaEndFlags, XaRequest, XaStartFlags, XaVoteReply,
};
use ojp_core::{ErrorKind, ProxyError, SessionInfo};
use ojp_scheduler::QueryGate;
use ojp_session::{LobHandle, ResultCursor, Session, SessionManager};
use ojp_xa::XaTransactionRegistry;
use std::sync::Arc;
use uuid::Uuid;

/// Stable per-statement hash feeding the slow-query classifier.
fn query_hash(sql: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    sql.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// The server-side dispatcher for one proxy node.
pub struct ProxyServer {
    config: ServerConfig,
    adapter: Arc<dyn BackendAdapter>,
    sessions: Arc<SessionManager>,
    gate: QueryGate,
    xa: Option<Arc<XaTransactionRegistry>>,
}

impl ProxyServer {
    /// Assembles a dispatcher. Pass `None` for `xa` on servers without XA
    /// support; XA verbs then fail with an RM error.
    pub fn new(
        config: ServerConfig,
        adapter: Arc<dyn BackendAdapter>,
        sessions: Arc<SessionManager>,
        gate: QueryGate,
        xa: Option<Arc<XaTransactionRegistry>>,
    ) -> Self {
        Self {
            config,
            adapter,
            sessions,
            gate,
            xa,
        }
    }

    /// The session manager.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// The execution gate.
    pub fn gate(&self) -> &QueryGate {
        &self.gate
    }

    fn echo(&self, mut session: SessionInfo) -> SessionInfo {
        session.target_server = Some(self.config.address.clone());
        session
    }

    fn session_for(&self, info: &SessionInfo) -> Result<Arc<Session>, ProxyError> {
        let uuid = info
            .session_uuid
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ProxyError::protocol("request carries no session uuid"))?;
        let session = self.sessions.get_session(uuid)?;
        session.touch();
        Ok(session)
    }

    fn xa_registry(&self) -> Result<&Arc<XaTransactionRegistry>, ProxyError> {
        self.xa
            .as_ref()
            .ok_or_else(|| ProxyError::new(ErrorKind::RmError, "xa is not enabled on this server"))
    }

    fn touch_if_known(&self, info: &SessionInfo) {
        if let Some(uuid) = info.session_uuid.as_deref() {
            self.sessions.update_activity(uuid);
        }
    }
}

#[async_trait]
impl ProxyRpc for ProxyServer {
    async fn connect(&self, request: ConnectRequest) -> Result<ConnectReply, ProxyError> {
        let info = request.session.clone();

        // Rejoin: the session already exists on this node.
        if let Some(uuid) = info.session_uuid.as_deref().filter(|u| !u.is_empty()) {
            let session = self.sessions.get_session(uuid)?;
            session.touch();
            return Ok(ConnectReply {
                session: self.echo(info),
            });
        }

        if let (Some(hash), Some(client)) = (info.conn_hash.as_deref(), info.client_uuid.as_deref())
        {
            self.sessions.register_client_uuid(hash, client);
        }

        // XA sessions draw backend sessions from the XA pool at xaStart;
        // only plain sessions get a dedicated backend connection here.
        let backend = if info.is_xa {
            None
        } else {
            Some(
                self.adapter
                    .open(
                        &request.url,
                        &request.user,
                        &request.password,
                        &request.properties,
                    )
                    .await?,
            )
        };

        let session = self.sessions.create_session(
            info.conn_hash.clone(),
            info.client_uuid.clone(),
            info.is_xa,
            backend,
        );

        tracing::debug!(
            session = %session.id(),
            is_xa = session.is_xa(),
            "connect established a new session"
        );
        let mut reply = self.echo(info);
        reply.session_uuid = Some(session.id().to_string());
        Ok(ConnectReply { session: reply })
    }

    async fn execute_update(&self, request: StatementRequest) -> Result<UpdateReply, ProxyError> {
        let session = self.session_for(&request.session)?;
        let hash = query_hash(&request.sql);

        let affected = self
            .gate
            .execute(&hash, || async {
                let mut backend = session.backend().lock().await;
                let connection = backend.as_mut().ok_or_else(|| {
                    ProxyError::protocol("session has no backend connection")
                })?;
                connection
                    .execute_update(&request.sql, &request.params)
                    .await
            })
            .await?;

        Ok(UpdateReply {
            session: self.echo(request.session),
            affected_rows: affected,
        })
    }

    async fn execute_query(&self, request: StatementRequest) -> Result<QueryPage, ProxyError> {
        let session = self.session_for(&request.session)?;
        let hash = query_hash(&request.sql);

        let rows = self
            .gate
            .execute(&hash, || async {
                let mut backend = session.backend().lock().await;
                let connection = backend.as_mut().ok_or_else(|| {
                    ProxyError::protocol("session has no backend connection")
                })?;
                connection.execute_query(&request.sql, &request.params).await
            })
            .await?;

        let fetch_size = if request.fetch_size == 0 {
            self.config.default_fetch_size
        } else {
            request.fetch_size
        };

        let result_set_uuid = Uuid::new_v4().to_string();
        let mut cursor = ResultCursor::new(rows);
        let (page, has_more) = cursor.next_page(fetch_size);
        if has_more {
            session.store_cursor(result_set_uuid.clone(), cursor);
        }

        Ok(QueryPage {
            session: self.echo(request.session),
            result_set_uuid,
            rows: page,
            has_more,
        })
    }

    async fn fetch_next_rows(&self, request: FetchRequest) -> Result<QueryPage, ProxyError> {
        let session = self.session_for(&request.session)?;
        let fetch_size = if request.fetch_size == 0 {
            self.config.default_fetch_size
        } else {
            request.fetch_size
        };
        let (rows, has_more) = session.fetch_from_cursor(&request.result_set_uuid, fetch_size)?;
        Ok(QueryPage {
            session: self.echo(request.session),
            result_set_uuid: request.result_set_uuid,
            rows,
            has_more,
        })
    }

    async fn create_lob(&self, request: CreateLobRequest) -> Result<LobRef, ProxyError> {
        let session = self.session_for(&request.session)?;
        let lob_uuid = Uuid::new_v4().to_string();
        session.store_lob(lob_uuid.clone(), LobHandle::new(request.kind, request.data));
        Ok(LobRef {
            session: self.echo(request.session),
            lob_uuid,
        })
    }

    async fn read_lob(&self, request: ReadLobRequest) -> Result<LobSegment, ProxyError> {
        let session = self.session_for(&request.session)?;
        let data = session.read_lob(&request.lob_uuid, request.offset, request.length)?;
        Ok(LobSegment {
            session: self.echo(request.session),
            data,
        })
    }

    async fn start_transaction(&self, session_info: SessionInfo) -> Result<Ack, ProxyError> {
        let session = self.session_for(&session_info)?;
        let mut backend = session.backend().lock().await;
        let connection = backend
            .as_mut()
            .ok_or_else(|| ProxyError::protocol("session has no backend connection"))?;
        connection.begin().await?;
        drop(backend);
        Ok(Ack {
            session: self.echo(session_info),
        })
    }

    async fn commit_transaction(&self, session_info: SessionInfo) -> Result<Ack, ProxyError> {
        let session = self.session_for(&session_info)?;
        let mut backend = session.backend().lock().await;
        let connection = backend
            .as_mut()
            .ok_or_else(|| ProxyError::protocol("session has no backend connection"))?;
        connection.commit().await?;
        drop(backend);
        Ok(Ack {
            session: self.echo(session_info),
        })
    }

    async fn rollback_transaction(&self, session_info: SessionInfo) -> Result<Ack, ProxyError> {
        let session = self.session_for(&session_info)?;
        let mut backend = session.backend().lock().await;
        let connection = backend
            .as_mut()
            .ok_or_else(|| ProxyError::protocol("session has no backend connection"))?;
        connection.rollback().await?;
        drop(backend);
        Ok(Ack {
            session: self.echo(session_info),
        })
    }

    async fn xa_start(&self, request: XaRequest, flags: XaStartFlags) -> Result<Ack, ProxyError> {
        self.touch_if_known(&request.session);
        self.xa_registry()?.xa_start(&request.xid, flags).await?;
        Ok(Ack {
            session: self.echo(request.session),
        })
    }

    async fn xa_end(&self, request: XaRequest, flags: XaEndFlags) -> Result<Ack, ProxyError> {
        self.touch_if_known(&request.session);
        self.xa_registry()?.xa_end(&request.xid, flags).await?;
        Ok(Ack {
            session: self.echo(request.session),
        })
    }

    async fn xa_prepare(&self, request: XaRequest) -> Result<XaVoteReply, ProxyError> {
        self.touch_if_known(&request.session);
        let vote = self.xa_registry()?.xa_prepare(&request.xid).await?;
        Ok(XaVoteReply {
            session: self.echo(request.session),
            vote,
        })
    }

    async fn xa_commit(&self, request: XaRequest, one_phase: bool) -> Result<Ack, ProxyError> {
        self.touch_if_known(&request.session);
        self.xa_registry()?
            .xa_commit(&request.xid, one_phase)
            .await?;
        Ok(Ack {
            session: self.echo(request.session),
        })
    }

    async fn xa_rollback(&self, request: XaRequest) -> Result<Ack, ProxyError> {
        self.touch_if_known(&request.session);
        self.xa_registry()?.xa_rollback(&request.xid).await?;
        Ok(Ack {
            session: self.echo(request.session),
        })
    }

    async fn xa_recover(&self, request: RecoverRequest) -> Result<RecoveredXids, ProxyError> {
        self.touch_if_known(&request.session);
        let xids = self.xa_registry()?.xa_recover(request.start_scan)?;
        Ok(RecoveredXids {
            session: self.echo(request.session),
            xids,
        })
    }

    async fn xa_forget(&self, request: XaRequest) -> Result<Ack, ProxyError> {
        self.touch_if_known(&request.session);
        self.xa_registry()?.xa_forget(&request.xid).await?;
        Ok(Ack {
            session: self.echo(request.session),
        })
    }

    async fn xa_set_transaction_timeout(
        &self,
        session: SessionInfo,
        seconds: u32,
    ) -> Result<BoolReply, ProxyError> {
        self.touch_if_known(&session);
        let value = self.xa_registry()?.xa_set_transaction_timeout(seconds);
        Ok(BoolReply {
            session: self.echo(session),
            value,
        })
    }

    async fn xa_get_transaction_timeout(
        &self,
        session: SessionInfo,
    ) -> Result<TimeoutReply, ProxyError> {
        self.touch_if_known(&session);
        let seconds = self.xa_registry()?.xa_get_transaction_timeout();
        Ok(TimeoutReply {
            session: self.echo(session),
            seconds,
        })
    }

    async fn xa_is_same_rm(
        &self,
        session: SessionInfo,
        resource: String,
    ) -> Result<BoolReply, ProxyError> {
        self.touch_if_known(&session);
        let value = self.xa_registry()?.xa_is_same_rm(&resource);
        Ok(BoolReply {
            session: self.echo(session),
            value,
        })
    }

    async fn terminate_session(&self, session_info: SessionInfo) -> Result<Ack, ProxyError> {
        let uuid = session_info
            .session_uuid
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ProxyError::protocol("terminate carries no session uuid"))?;
        self.sessions.terminate_session(uuid).await?;
        Ok(Ack {
            session: self.echo(session_info),
        })
    }
}
