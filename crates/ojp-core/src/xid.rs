//! XA transaction identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of the gtrid and bqual components, per the XA spec.
pub const MAX_XID_COMPONENT_LEN: usize = 64;

/// An XA transaction identifier: `(format_id, gtrid, bqual)`.
///
/// Equality and hashing are by value; two Xids with the same three
/// components name the same distributed transaction branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Xid {
    format_id: i32,
    gtrid: Vec<u8>,
    bqual: Vec<u8>,
}

impl Xid {
    /// Creates an Xid, validating component lengths.
    pub fn new(
        format_id: i32,
        gtrid: impl Into<Vec<u8>>,
        bqual: impl Into<Vec<u8>>,
    ) -> Result<Self, XidError> {
        let gtrid = gtrid.into();
        let bqual = bqual.into();
        if gtrid.is_empty() {
            return Err(XidError::EmptyGtrid);
        }
        if gtrid.len() > MAX_XID_COMPONENT_LEN {
            return Err(XidError::ComponentTooLong("gtrid", gtrid.len()));
        }
        if bqual.len() > MAX_XID_COMPONENT_LEN {
            return Err(XidError::ComponentTooLong("bqual", bqual.len()));
        }
        Ok(Self {
            format_id,
            gtrid,
            bqual,
        })
    }

    /// Format identifier.
    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    /// Global transaction identifier bytes.
    pub fn gtrid(&self) -> &[u8] {
        &self.gtrid
    }

    /// Branch qualifier bytes.
    pub fn bqual(&self) -> &[u8] {
        &self.bqual
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.format_id)?;
        for byte in &self.gtrid {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ":")?;
        for byte in &self.bqual {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Errors from [`Xid::new`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XidError {
    /// The global transaction identifier was empty.
    #[error("xid gtrid must not be empty")]
    EmptyGtrid,
    /// A component exceeded [`MAX_XID_COMPONENT_LEN`].
    #[error("xid {0} is {1} bytes, longer than the XA maximum of 64")]
    ComponentTooLong(&'static str, usize),
}
