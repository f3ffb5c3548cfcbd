//! Error taxonomy for the replica core.
//!
//! Per the design, almost nothing is an error here: transport failures are
//! "no reply yet", stale RPCs are silently discarded, and protocol-invariant
//! violations are asserted rather than handled. The only condition a caller
//! can actually observe as `Result::Err` is a corrupt persisted-state blob
//! encountered while restoring a replica at startup.

use std::fmt;

#[derive(Debug)]
pub enum RaftError {
    /// The persisted state blob failed to decode on restart. Fatal: the
    /// replica cannot safely determine its term, vote, or log, so it must
    /// not start rather than silently falling back to a fresh state.
    PersistedStateCorrupt(bincode::Error),
}

impl fmt::Display for RaftError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RaftError::PersistedStateCorrupt(e) => {
                write!(f, "persisted state is corrupt and cannot be restored: {}", e)
            }
        }
    }
}

impl std::error::Error for RaftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RaftError::PersistedStateCorrupt(e) => Some(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, RaftError>;
