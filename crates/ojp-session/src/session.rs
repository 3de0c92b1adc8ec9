//! One server-side session and the resources it owns.

use crate::connection::BackendConnection;
use ojp_core::rpc::{LobKind, Row};
use ojp_core::ProxyError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// An open result set being paged to the client.
pub struct ResultCursor {
    rows: VecDeque<Row>,
}

impl ResultCursor {
    /// Wraps a fully materialised row set.
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into(),
        }
    }

    /// Takes up to `fetch_size` rows (at least one, so a zero fetch size
    /// cannot loop forever); the boolean reports whether rows remain.
    pub fn next_page(&mut self, fetch_size: u32) -> (Vec<Row>, bool) {
        let take = if self.rows.is_empty() {
            0
        } else {
            (fetch_size.max(1) as usize).min(self.rows.len())
        };
        let page: Vec<Row> = self.rows.drain(..take).collect();
        (page, !self.rows.is_empty())
    }

    /// Rows not yet fetched.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

/// A session-scoped large object.
pub struct LobHandle {
    /// BLOB or CLOB.
    pub kind: LobKind,
    data: Vec<u8>,
}

impl LobHandle {
    /// Buffers an uploaded object.
    pub fn new(kind: LobKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Reads `length` bytes starting at `offset`; short at end of object.
    pub fn read(&self, offset: u64, length: u32) -> Vec<u8> {
        let start = (offset as usize).min(self.data.len());
        let end = start.saturating_add(length as usize).min(self.data.len());
        self.data[start..end].to_vec()
    }

    /// Object size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the object is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One logical client session on this server.
///
/// Owns the backend connection plus the statement (cursor) and LOB tables.
/// All owned resources are released by [`Session::terminate`]; a failure in
/// one release step never skips the remaining steps.
pub struct Session {
    session_uuid: String,
    conn_hash: Option<String>,
    client_uuid: Option<String>,
    is_xa: bool,
    created_at: Instant,
    // Nanoseconds since created_at, monotonic under concurrent touches.
    last_activity_nanos: AtomicU64,
    backend: tokio::sync::Mutex<Option<Box<dyn BackendConnection>>>,
    cursors: Mutex<HashMap<String, ResultCursor>>,
    lobs: Mutex<HashMap<String, LobHandle>>,
}

impl Session {
    /// Creates a session. The uuid is assigned by the session manager.
    pub(crate) fn new(
        session_uuid: String,
        conn_hash: Option<String>,
        client_uuid: Option<String>,
        is_xa: bool,
        backend: Option<Box<dyn BackendConnection>>,
    ) -> Self {
        Self {
            session_uuid,
            conn_hash,
            client_uuid,
            is_xa,
            created_at: Instant::now(),
            last_activity_nanos: AtomicU64::new(0),
            backend: tokio::sync::Mutex::new(backend),
            cursors: Mutex::new(HashMap::new()),
            lobs: Mutex::new(HashMap::new()),
        }
    }

    /// The session uuid.
    pub fn id(&self) -> &str {
        &self.session_uuid
    }

    /// The client's connection hash, if sent.
    pub fn conn_hash(&self) -> Option<&str> {
        self.conn_hash.as_deref()
    }

    /// The client uuid, if sent.
    pub fn client_uuid(&self) -> Option<&str> {
        self.client_uuid.as_deref()
    }

    /// Whether this session participates in XA transactions.
    pub fn is_xa(&self) -> bool {
        self.is_xa
    }

    /// When the session was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Stamps activity now. Monotonic: a stale concurrent touch never moves
    /// the stamp backwards.
    pub fn touch(&self) {
        let nanos = self.created_at.elapsed().as_nanos() as u64;
        self.last_activity_nanos.fetch_max(nanos, Ordering::AcqRel);
    }

    /// Time since the last activity stamp (or creation).
    pub fn idle_for(&self) -> Duration {
        let last = self.last_activity_nanos.load(Ordering::Acquire);
        let now = self.created_at.elapsed().as_nanos() as u64;
        Duration::from_nanos(now.saturating_sub(last))
    }

    /// The backend connection slot.
    pub fn backend(&self) -> &tokio::sync::Mutex<Option<Box<dyn BackendConnection>>> {
        &self.backend
    }

    /// Registers an open result cursor under `result_set_uuid`.
    pub fn store_cursor(&self, result_set_uuid: String, cursor: ResultCursor) {
        self.cursors.lock().unwrap().insert(result_set_uuid, cursor);
    }

    /// Takes the next page from a cursor; a drained cursor is dropped.
    pub fn fetch_from_cursor(
        &self,
        result_set_uuid: &str,
        fetch_size: u32,
    ) -> Result<(Vec<Row>, bool), ProxyError> {
        let mut cursors = self.cursors.lock().unwrap();
        let cursor = cursors.get_mut(result_set_uuid).ok_or_else(|| {
            ProxyError::protocol(format!("unknown result set '{result_set_uuid}'"))
        })?;
        let (rows, has_more) = cursor.next_page(fetch_size);
        if !has_more {
            cursors.remove(result_set_uuid);
        }
        Ok((rows, has_more))
    }

    /// Number of open cursors.
    pub fn open_cursors(&self) -> usize {
        self.cursors.lock().unwrap().len()
    }

    /// Buffers a large object under `lob_uuid`.
    pub fn store_lob(&self, lob_uuid: String, handle: LobHandle) {
        self.lobs.lock().unwrap().insert(lob_uuid, handle);
    }

    /// Reads a slice of a buffered large object.
    pub fn read_lob(
        &self,
        lob_uuid: &str,
        offset: u64,
        length: u32,
    ) -> Result<Vec<u8>, ProxyError> {
        let lobs = self.lobs.lock().unwrap();
        let handle = lobs
            .get(lob_uuid)
            .ok_or_else(|| ProxyError::protocol(format!("unknown lob '{lob_uuid}'")))?;
        Ok(handle.read(offset, length))
    }

    /// Number of buffered large objects.
    pub fn open_lobs(&self) -> usize {
        self.lobs.lock().unwrap().len()
    }

    /// Releases statements, LOBs, and the backend connection, in that
    /// order. A failing step is logged and the remaining steps still run.
    pub async fn terminate(&self) {
        let dropped_cursors = {
            let mut cursors = self.cursors.lock().unwrap();
            let count = cursors.len();
            cursors.clear();
            count
        };
        let dropped_lobs = {
            let mut lobs = self.lobs.lock().unwrap();
            let count = lobs.len();
            lobs.clear();
            count
        };

        if let Some(mut backend) = self.backend.lock().await.take() {
            if let Err(error) = backend.close().await {
                tracing::warn!(
                    session = %self.session_uuid,
                    %error,
                    "backend close failed during session termination"
                );
            }
        }

        tracing::debug!(
            session = %self.session_uuid,
            cursors = dropped_cursors,
            lobs = dropped_lobs,
            "session terminated"
        );
    }
}
