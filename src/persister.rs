//! Durable-state codec and the `Persister` collaborator.
//!
//! The persister itself (atomic replace / read of an opaque byte blob) is an
//! external collaborator — this crate only defines the trait and a
//! `MemoryPersister` test double. The codec lives here too, since
//! encode/decode is this crate's responsibility even though storage is not.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::{RaftError, Result};
use crate::log::LogEntry;

/// Atomic-replace byte blob storage. `save` must be atomic with respect to
/// `read`: a reader never observes a partial write.
pub trait Persister: Send {
    fn save(&self, bytes: Vec<u8>);
    fn read(&self) -> Vec<u8>;
}

/// An in-process `Persister` backed by a `Mutex<Vec<u8>>`, standing in for
/// an on-disk persister in tests: a concrete, testable shape for durable
/// state without actually touching the filesystem.
#[derive(Default)]
pub struct MemoryPersister {
    bytes: Mutex<Vec<u8>>,
}

impl MemoryPersister {
    pub fn new() -> Self {
        MemoryPersister { bytes: Mutex::new(Vec::new()) }
    }
}

impl Persister for MemoryPersister {
    fn save(&self, bytes: Vec<u8>) {
        *self.bytes.lock().unwrap() = bytes;
    }

    fn read(&self) -> Vec<u8> {
        self.bytes.lock().unwrap().clone()
    }
}

/// The durable-state blob: everything that must survive a crash for safety,
/// plus `commit_index`/`last_applied` (not required by the algorithm, but
/// persisted here per the design's choice — see DESIGN.md's open-question
/// resolution — so the apply pump can resume without redelivering work the
/// application may have already observed).
#[derive(Serialize, Deserialize)]
pub struct PersistedState<C> {
    pub current_term: u64,
    pub voted_for: Option<u64>,
    pub log: Vec<LogEntry<C>>,
    pub commit_index: u64,
    pub last_applied: u64,
}

impl<C: Serialize> PersistedState<C> {
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("in-memory state must always be serializable")
    }
}

impl<C: DeserializeOwned> PersistedState<C> {
    /// Decodes a persisted blob. An empty blob (never persisted before)
    /// decodes to the zero-value initial state rather than an error; any
    /// non-empty blob that fails to decode is treated as corruption, which
    /// is fatal — a replica cannot safely guess at lost durable state.
    pub fn decode(bytes: &[u8]) -> Result<PersistedState<C>> {
        if bytes.is_empty() {
            return Ok(PersistedState {
                current_term: 0,
                voted_for: None,
                log: Vec::new(),
                commit_index: 0,
                last_applied: 0,
            });
        }
        bincode::deserialize(bytes).map_err(RaftError::PersistedStateCorrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_memory_persister() {
        let persister = MemoryPersister::new();
        let state = PersistedState {
            current_term: 7,
            voted_for: Some(3),
            log: vec![
                LogEntry { index: 1, term: 1, command: "x".to_string() },
                LogEntry { index: 2, term: 7, command: "y".to_string() },
            ],
            commit_index: 2,
            last_applied: 1,
        };
        persister.save(state.encode());

        let restored: PersistedState<String> = PersistedState::decode(&persister.read()).unwrap();
        assert_eq!(restored.current_term, 7);
        assert_eq!(restored.voted_for, Some(3));
        assert_eq!(restored.log.len(), 2);
        assert_eq!(restored.log[1].command, "y");
        assert_eq!(restored.commit_index, 2);
        assert_eq!(restored.last_applied, 1);
    }

    #[test]
    fn empty_blob_decodes_to_fresh_state() {
        let restored: PersistedState<u32> = PersistedState::decode(&[]).unwrap();
        assert_eq!(restored.current_term, 0);
        assert!(restored.voted_for.is_none());
        assert!(restored.log.is_empty());
    }

    #[test]
    fn garbage_blob_is_reported_as_corrupt() {
        let err = PersistedState::<u32>::decode(&[0xff, 0x00, 0x11]).unwrap_err();
        assert!(matches!(err, RaftError::PersistedStateCorrupt(_)));
    }
}
