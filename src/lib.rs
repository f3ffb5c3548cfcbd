//! `raft_core`: the concurrent state machine at the heart of a Raft
//! replica -- leader election, log replication, commit-index advancement,
//! durable persistence, and in-order delivery to an embedding application.
//!
//! The wire transport and the persistence medium are external collaborators
//! modeled here as the [`transport::Transport`] and [`persister::Persister`]
//! traits; this crate ships in-process test doubles for both
//! ([`transport::LocalTransport`], [`persister::MemoryPersister`]) but no
//! concrete network stack or on-disk storage. Wiring those up, along with
//! membership changes and snapshotting, is the embedding application's job.

pub mod apply;
pub mod config;
pub mod error;
pub mod log;
pub mod persister;
pub mod replica;
pub mod transport;

pub use apply::ApplyMsg;
pub use config::Config;
pub use error::{RaftError, Result};
pub use log::{Log, LogEntry, MemoryLog};
pub use persister::{MemoryPersister, PersistedState, Persister};
pub use replica::Replica;
pub use transport::{
    AppendEntriesArgs, AppendEntriesReply, LocalTransport, RequestVoteArgs, RequestVoteReply,
    RpcHandler, Transport, VoteDecision,
};
