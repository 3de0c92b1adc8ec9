//! The durable prepared-record store.
//!
//! Before `xaPrepare` returns `XA_OK` the registry writes a prepared
//! record; a crash between prepare and commit must leave the Xid visible to
//! `xaRecover`. The file store is an append-only log of framed records;
//! replay deduplicates by Xid and drops branches whose latest entry is a
//! clear tombstone. A truncated tail (torn final write) is tolerated.

use crate::error::XaError;
use ojp_core::Xid;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// One persisted prepared branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRecord {
    /// The prepared branch.
    pub xid: Xid,
    /// Milliseconds since the Unix epoch at prepare time.
    pub timestamp_millis: u64,
    /// Optional backend session id or adapter metadata.
    pub metadata: Option<Vec<u8>>,
}

impl PreparedRecord {
    /// Creates a record stamped with the current wall-clock time.
    pub fn new(xid: Xid, metadata: Option<Vec<u8>>) -> Self {
        let timestamp_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            xid,
            timestamp_millis,
            metadata,
        }
    }
}

/// Durable storage for prepared records.
///
/// Writes are serialised per store; reads must never observe a torn
/// record. Implementations beyond the file and memory stores (embedded
/// databases, key-value engines) plug in behind this trait.
pub trait PreparedStore: Send + Sync {
    /// Appends a prepared record. Returns only after the record is as
    /// durable as the store promises.
    fn append_prepared(&self, record: &PreparedRecord) -> Result<(), XaError>;

    /// Appends a clear tombstone for a branch.
    fn append_clear(&self, xid: &Xid) -> Result<(), XaError>;

    /// Replays the store: every branch whose latest entry is a prepare.
    fn load_prepared(&self) -> Result<Vec<PreparedRecord>, XaError>;
}

/// Non-durable store for tests and opt-out deployments.
pub struct MemoryPreparedStore {
    records: Mutex<HashMap<Xid, PreparedRecord>>,
}

impl MemoryPreparedStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryPreparedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PreparedStore for MemoryPreparedStore {
    fn append_prepared(&self, record: &PreparedRecord) -> Result<(), XaError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.xid.clone(), record.clone());
        Ok(())
    }

    fn append_clear(&self, xid: &Xid) -> Result<(), XaError> {
        self.records.lock().unwrap().remove(xid);
        Ok(())
    }

    fn load_prepared(&self) -> Result<Vec<PreparedRecord>, XaError> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }
}

const MAGIC: u32 = 0x4F4A_5058; // "OJPX"
const VERSION: u8 = 1;
const OP_PREPARED: u8 = 1;
const OP_CLEAR: u8 = 2;

/// Append-only log-file store.
pub struct FilePreparedStore {
    path: PathBuf,
    file: Mutex<File>,
    fsync: bool,
    verify_checksum: bool,
}

impl FilePreparedStore {
    /// Opens (or creates) the log at `path`.
    pub fn open(path: impl AsRef<Path>, fsync: bool, verify_checksum: bool) -> Result<Self, XaError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|e| XaError::RmError(format!("open prepared store {path:?}: {e}")))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            fsync,
            verify_checksum,
        })
    }

    /// The log path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn frame(op: u8, xid: &Xid, timestamp_millis: u64, metadata: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(VERSION);
        body.push(op);
        body.extend_from_slice(&xid.format_id().to_be_bytes());
        body.push(xid.gtrid().len() as u8);
        body.extend_from_slice(xid.gtrid());
        body.push(xid.bqual().len() as u8);
        body.extend_from_slice(xid.bqual());
        body.extend_from_slice(&timestamp_millis.to_be_bytes());
        let metadata = metadata.unwrap_or(&[]);
        body.extend_from_slice(&(metadata.len() as u32).to_be_bytes());
        body.extend_from_slice(metadata);

        let checksum = crc32fast::hash(&body);

        let mut frame = Vec::with_capacity(body.len() + 8);
        frame.extend_from_slice(&MAGIC.to_be_bytes());
        frame.extend_from_slice(&body);
        frame.extend_from_slice(&checksum.to_be_bytes());
        frame
    }

    fn append(&self, frame: &[u8]) -> Result<(), XaError> {
        let mut file = self.file.lock().unwrap();
        file.write_all(frame)
            .map_err(|e| XaError::RmError(format!("prepared store write: {e}")))?;
        if self.fsync {
            file.sync_data()
                .map_err(|e| XaError::RmError(format!("prepared store fsync: {e}")))?;
        }
        Ok(())
    }
}

struct FrameReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> FrameReader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(n)?;
        if end > self.data.len() {
            return None;
        }
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|s| s[0])
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|s| u32::from_be_bytes(s.try_into().unwrap()))
    }

    fn i32(&mut self) -> Option<i32> {
        self.take(4).map(|s| i32::from_be_bytes(s.try_into().unwrap()))
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8).map(|s| u64::from_be_bytes(s.try_into().unwrap()))
    }
}

impl PreparedStore for FilePreparedStore {
    fn append_prepared(&self, record: &PreparedRecord) -> Result<(), XaError> {
        let frame = Self::frame(
            OP_PREPARED,
            &record.xid,
            record.timestamp_millis,
            record.metadata.as_deref(),
        );
        self.append(&frame)
    }

    fn append_clear(&self, xid: &Xid) -> Result<(), XaError> {
        let timestamp_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let frame = Self::frame(OP_CLEAR, xid, timestamp_millis, None);
        self.append(&frame)
    }

    fn load_prepared(&self) -> Result<Vec<PreparedRecord>, XaError> {
        let mut data = Vec::new();
        {
            // Hold the append lock so the scan never sees a write in
            // progress.
            let _guard = self.file.lock().unwrap();
            let mut reopened = File::open(&self.path)
                .map_err(|e| XaError::RmError(format!("reopen prepared store: {e}")))?;
            reopened
                .read_to_end(&mut data)
                .map_err(|e| XaError::RmError(format!("read prepared store: {e}")))?;
        }

        let mut reader = FrameReader {
            data: &data,
            offset: 0,
        };
        let mut latest: HashMap<Xid, Option<PreparedRecord>> = HashMap::new();

        loop {
            let frame_start = reader.offset;
            let Some(magic) = reader.u32() else { break };
            if magic != MAGIC {
                tracing::warn!(
                    path = ?self.path,
                    offset = frame_start,
                    "prepared store frame with bad magic; ignoring tail"
                );
                break;
            }

            let body_start = reader.offset;
            let parsed = (|| {
                let version = reader.u8()?;
                if version != VERSION {
                    return None;
                }
                let op = reader.u8()?;
                let format_id = reader.i32()?;
                let gtrid_len = reader.u8()? as usize;
                let gtrid = reader.take(gtrid_len)?.to_vec();
                let bqual_len = reader.u8()? as usize;
                let bqual = reader.take(bqual_len)?.to_vec();
                let timestamp_millis = reader.u64()?;
                let metadata_len = reader.u32()? as usize;
                let metadata = reader.take(metadata_len)?.to_vec();
                let body_end = reader.offset;
                let checksum = reader.u32()?;
                Some((op, format_id, gtrid, bqual, timestamp_millis, metadata, body_start, body_end, checksum))
            })();

            let Some((op, format_id, gtrid, bqual, timestamp_millis, metadata, body_start, body_end, checksum)) =
                parsed
            else {
                tracing::warn!(
                    path = ?self.path,
                    offset = frame_start,
                    "truncated prepared store record; ignoring tail"
                );
                break;
            };

            if self.verify_checksum && crc32fast::hash(&data[body_start..body_end]) != checksum {
                tracing::warn!(
                    path = ?self.path,
                    offset = frame_start,
                    "prepared store checksum mismatch; ignoring tail"
                );
                break;
            }

            let Ok(xid) = Xid::new(format_id, gtrid, bqual) else {
                tracing::warn!(
                    path = ?self.path,
                    offset = frame_start,
                    "prepared store record with invalid xid; skipped"
                );
                continue;
            };

            match op {
                OP_PREPARED => {
                    let metadata = if metadata.is_empty() {
                        None
                    } else {
                        Some(metadata)
                    };
                    latest.insert(
                        xid.clone(),
                        Some(PreparedRecord {
                            xid,
                            timestamp_millis,
                            metadata,
                        }),
                    );
                }
                OP_CLEAR => {
                    latest.insert(xid, None);
                }
                other => {
                    tracing::warn!(op = other, "prepared store record with unknown op; skipped");
                }
            }
        }

        Ok(latest.into_values().flatten().collect())
    }
}
