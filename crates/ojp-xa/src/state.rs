//! XA branch states.

use std::fmt;

/// State of one XA transaction branch.
///
/// A branch the registry has never seen (or has forgotten) has no state at
/// all; verbs addressed at it fail with *not-a-transaction*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XaState {
    /// `xaStart` succeeded; work is associated with the branch.
    Active,
    /// `xaEnd` succeeded; the branch awaits prepare, one-phase commit, or
    /// rollback.
    Ended,
    /// `xaPrepare` voted `XA_OK`; a durable record exists and the backend
    /// session stays pinned.
    Prepared,
    /// Terminal: the branch committed.
    Committed,
    /// Terminal: the branch rolled back.
    RolledBack,
    /// The backend completed the branch heuristically; only `xaForget`
    /// clears it.
    HeuristicMixed,
}

impl XaState {
    /// Whether the branch reached a terminal outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, XaState::Committed | XaState::RolledBack)
    }
}

impl fmt::Display for XaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            XaState::Active => "ACTIVE",
            XaState::Ended => "ENDED",
            XaState::Prepared => "PREPARED",
            XaState::Committed => "COMMITTED",
            XaState::RolledBack => "ROLLEDBACK",
            XaState::HeuristicMixed => "HEURISTIC_MIXED",
        })
    }
}
