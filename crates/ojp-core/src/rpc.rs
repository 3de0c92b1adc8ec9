//! The remote-procedure surface between thin clients and proxy servers.
//!
//! [`ProxyRpc`] is the seam both sides share: proxy servers implement it,
//! the multinode façade consumes it through a per-endpoint stub. The
//! transport (TLS framing, streaming row delivery) lives behind whatever
//! implements the trait; the types here are the logical message shapes.

use crate::error::ProxyError;
use crate::session::{SessionCarrier, SessionInfo};
use crate::xid::Xid;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single SQL parameter or column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 32-bit integer.
    Int32(i32),
    /// 64-bit integer.
    Int64(i64),
    /// Double-precision float.
    Double(f64),
    /// Character data.
    Text(String),
    /// Binary data.
    Bytes(Vec<u8>),
}

/// One result-set row.
pub type Row = Vec<SqlValue>;

/// Establishes or rejoins a logical session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Session metadata; a missing `session_uuid` requests a new session.
    pub session: SessionInfo,
    /// Backend URL, forwarded to the adapter unchanged.
    pub url: String,
    /// Backend user.
    pub user: String,
    /// Backend password.
    pub password: String,
    /// Driver properties forwarded to the adapter.
    pub properties: HashMap<String, String>,
}

/// Reply to [`ProxyRpc::connect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectReply {
    /// Echoed metadata with `session_uuid` and `target_server` populated.
    pub session: SessionInfo,
}

/// A statement to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementRequest {
    /// Session metadata.
    pub session: SessionInfo,
    /// Statement text.
    pub sql: String,
    /// Positional parameters.
    pub params: Vec<SqlValue>,
    /// Rows per page for queries; ignored by updates.
    pub fetch_size: u32,
}

/// Reply to [`ProxyRpc::execute_update`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReply {
    /// Echoed session metadata.
    pub session: SessionInfo,
    /// Rows affected.
    pub affected_rows: u64,
}

/// One page of a streamed result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPage {
    /// Echoed session metadata.
    pub session: SessionInfo,
    /// Server-side cursor handle; valid until the session terminates.
    pub result_set_uuid: String,
    /// Rows in this page.
    pub rows: Vec<Row>,
    /// Whether another page may follow.
    pub has_more: bool,
}

/// Requests the next page of an open result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Session metadata.
    pub session: SessionInfo,
    /// Cursor handle from the originating [`QueryPage`].
    pub result_set_uuid: String,
    /// Rows to return.
    pub fetch_size: u32,
}

/// Large-object flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobKind {
    /// Binary large object.
    Blob,
    /// Character large object.
    Clob,
}

/// Uploads a large object into the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLobRequest {
    /// Session metadata.
    pub session: SessionInfo,
    /// BLOB or CLOB.
    pub kind: LobKind,
    /// Object content.
    pub data: Vec<u8>,
}

/// Handle to a session-scoped large object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobRef {
    /// Echoed session metadata.
    pub session: SessionInfo,
    /// Handle valid until the session terminates.
    pub lob_uuid: String,
}

/// Reads a slice of a large object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadLobRequest {
    /// Session metadata.
    pub session: SessionInfo,
    /// Handle from [`LobRef`].
    pub lob_uuid: String,
    /// Byte offset to read from.
    pub offset: u64,
    /// Bytes to read.
    pub length: u32,
}

/// A slice of large-object content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobSegment {
    /// Echoed session metadata.
    pub session: SessionInfo,
    /// The requested bytes; shorter than asked at end of object.
    pub data: Vec<u8>,
}

/// Reply for operations that only echo session metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    /// Echoed session metadata.
    pub session: SessionInfo,
}

/// Flags for [`ProxyRpc::xa_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XaStartFlags {
    /// Start a new transaction branch.
    NoFlags,
    /// Join an already-active branch.
    Join,
    /// Resume a suspended (ended) branch.
    Resume,
}

/// Flags for [`ProxyRpc::xa_end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XaEndFlags {
    /// The branch completed its work.
    Success,
    /// The branch failed; the transaction should roll back.
    Fail,
}

/// Outcome of [`ProxyRpc::xa_prepare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XaVote {
    /// Prepared; a durable record exists and commit may follow.
    Ok,
    /// Read-only branch; committed as a short-circuit, nothing to do.
    ReadOnly,
}

/// An XA verb addressed at one transaction branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaRequest {
    /// Session metadata.
    pub session: SessionInfo,
    /// The branch.
    pub xid: Xid,
}

/// Reply to [`ProxyRpc::xa_prepare`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaVoteReply {
    /// Echoed session metadata.
    pub session: SessionInfo,
    /// The resource manager's vote.
    pub vote: XaVote,
}

/// Asks for the persisted in-doubt transaction branches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverRequest {
    /// Session metadata.
    pub session: SessionInfo,
    /// TMSTARTRSCAN: begin a recovery scan.
    pub start_scan: bool,
    /// TMENDRSCAN: end the recovery scan.
    pub end_scan: bool,
}

/// Reply to [`ProxyRpc::xa_recover`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveredXids {
    /// Echoed session metadata.
    pub session: SessionInfo,
    /// Branches persisted in PREPARED state.
    pub xids: Vec<Xid>,
}

/// Boolean reply (`xa_set_transaction_timeout`, `xa_is_same_rm`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoolReply {
    /// Echoed session metadata.
    pub session: SessionInfo,
    /// The verb's outcome.
    pub value: bool,
}

/// Reply to [`ProxyRpc::xa_get_transaction_timeout`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutReply {
    /// Echoed session metadata.
    pub session: SessionInfo,
    /// Transaction timeout in seconds.
    pub seconds: u32,
}

macro_rules! impl_session_carrier {
    ($($reply:ty),* $(,)?) => {
        $(impl SessionCarrier for $reply {
            fn session(&self) -> &SessionInfo {
                &self.session
            }
        })*
    };
}

impl_session_carrier!(
    ConnectReply,
    UpdateReply,
    QueryPage,
    LobRef,
    LobSegment,
    Ack,
    XaVoteReply,
    RecoveredXids,
    BoolReply,
    TimeoutReply,
);

/// The remote-procedure surface a proxy server exposes.
///
/// Every request carries a [`SessionInfo`]; every reply echoes it with the
/// server-side `target_server` filled in. Implementations must be safe to
/// share across tasks: one stub serves all sessions bound to its endpoint.
#[async_trait]
pub trait ProxyRpc: Send + Sync {
    /// Establishes or rejoins a logical session.
    async fn connect(&self, request: ConnectRequest) -> Result<ConnectReply, ProxyError>;

    /// Executes a statement that returns an update count.
    async fn execute_update(&self, request: StatementRequest) -> Result<UpdateReply, ProxyError>;

    /// Executes a query, returning the first page of rows.
    async fn execute_query(&self, request: StatementRequest) -> Result<QueryPage, ProxyError>;

    /// Fetches the next page of an open result set.
    async fn fetch_next_rows(&self, request: FetchRequest) -> Result<QueryPage, ProxyError>;

    /// Uploads a large object scoped to the session.
    async fn create_lob(&self, request: CreateLobRequest) -> Result<LobRef, ProxyError>;

    /// Reads a slice of a session-scoped large object.
    async fn read_lob(&self, request: ReadLobRequest) -> Result<LobSegment, ProxyError>;

    /// Opens an explicit local transaction.
    async fn start_transaction(&self, session: SessionInfo) -> Result<Ack, ProxyError>;

    /// Commits the session's local transaction.
    async fn commit_transaction(&self, session: SessionInfo) -> Result<Ack, ProxyError>;

    /// Rolls back the session's local transaction.
    async fn rollback_transaction(&self, session: SessionInfo) -> Result<Ack, ProxyError>;

    /// Starts, joins, or resumes an XA branch.
    async fn xa_start(&self, request: XaRequest, flags: XaStartFlags) -> Result<Ack, ProxyError>;

    /// Ends the active association with an XA branch.
    async fn xa_end(&self, request: XaRequest, flags: XaEndFlags) -> Result<Ack, ProxyError>;

    /// Prepares an XA branch; a durable record exists before `Ok` returns.
    async fn xa_prepare(&self, request: XaRequest) -> Result<XaVoteReply, ProxyError>;

    /// Commits an XA branch, one- or two-phase.
    async fn xa_commit(&self, request: XaRequest, one_phase: bool) -> Result<Ack, ProxyError>;

    /// Rolls back an XA branch.
    async fn xa_rollback(&self, request: XaRequest) -> Result<Ack, ProxyError>;

    /// Lists branches persisted in PREPARED state.
    async fn xa_recover(&self, request: RecoverRequest) -> Result<RecoveredXids, ProxyError>;

    /// Forgets a heuristically completed branch.
    async fn xa_forget(&self, request: XaRequest) -> Result<Ack, ProxyError>;

    /// Sets the session's XA transaction timeout; returns whether applied.
    async fn xa_set_transaction_timeout(
        &self,
        session: SessionInfo,
        seconds: u32,
    ) -> Result<BoolReply, ProxyError>;

    /// Reads the session's XA transaction timeout.
    async fn xa_get_transaction_timeout(
        &self,
        session: SessionInfo,
    ) -> Result<TimeoutReply, ProxyError>;

    /// Whether this server fronts the same resource manager as `resource`.
    async fn xa_is_same_rm(
        &self,
        session: SessionInfo,
        resource: String,
    ) -> Result<BoolReply, ProxyError>;

    /// Terminates the session, releasing statements, LOBs and the backend
    /// connection.
    async fn terminate_session(&self, session: SessionInfo) -> Result<Ack, ProxyError>;
}
