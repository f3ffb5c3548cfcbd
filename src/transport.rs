//! RPC wire shapes and the `Transport` collaborator.
//!
//! The transport is out of scope for this crate: a real deployment would
//! carry these argument/reply structs over a network codec of its choosing.
//! This crate only fixes the field shapes and the trait boundary;
//! `LocalTransport` is an in-process double used by this crate's own tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::log::LogEntry;

#[derive(Clone, Copy, Debug)]
pub struct RequestVoteArgs {
    pub candidate_id: u64,
    pub candidate_term: u64,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

/// Why a vote was or was not granted. A typed discriminant in place of a
/// bare `bool`, per the redesign flag favoring unambiguous reply shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteDecision {
    Granted,
    TermTooSmall,
    LogNotUpToDate,
    AlreadyVoted,
}

#[derive(Clone, Copy, Debug)]
pub struct RequestVoteReply {
    pub responder_term: u64,
    pub decision: VoteDecision,
}

impl RequestVoteReply {
    pub fn granted(&self) -> bool {
        self.decision == VoteDecision::Granted
    }
}

#[derive(Clone, Debug)]
pub struct AppendEntriesArgs<C> {
    pub leader_id: u64,
    pub leader_term: u64,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry<C>>,
    pub leader_commit: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct AppendEntriesReply {
    pub responder_term: u64,
    pub success: bool,
}

/// Pairwise call(peer, method, args) -> reply-or-failure.
///
/// A failed or lost call is reported as `None`; callers must treat that
/// identically to an arbitrarily delayed reply, never retrying synchronously
/// -- the next heartbeat or election tick is the retry.
pub trait Transport<C>: Send + Sync {
    fn request_vote(&self, peer: u64, args: RequestVoteArgs) -> Option<RequestVoteReply>;
    fn append_entries(&self, peer: u64, args: AppendEntriesArgs<C>) -> Option<AppendEntriesReply>;
}

/// The receiving side of a transport: whatever can answer the two RPCs.
/// `Replica` implements this; `LocalTransport` dispatches to registered
/// implementors by peer id.
pub trait RpcHandler<C>: Send + Sync {
    fn handle_request_vote(&self, args: RequestVoteArgs) -> RequestVoteReply;
    fn handle_append_entries(&self, args: AppendEntriesArgs<C>) -> AppendEntriesReply;
}

struct PeerLink<C> {
    handler: Arc<dyn RpcHandler<C>>,
    connected: bool,
}

/// An in-process transport wiring several `Replica`s together by direct
/// function call, with the ability to simulate a network partition: calls
/// to or from a partitioned peer behave like a permanently dropped reply.
pub struct LocalTransport<C> {
    links: Mutex<HashMap<u64, PeerLink<C>>>,
}

impl<C> LocalTransport<C> {
    pub fn new() -> Self {
        LocalTransport { links: Mutex::new(HashMap::new()) }
    }

    pub fn register(&self, id: u64, handler: Arc<dyn RpcHandler<C>>) {
        self.links.lock().unwrap().insert(id, PeerLink { handler, connected: true });
    }

    /// Simulates a network partition isolating `id`: subsequent calls to or
    /// from it return `None` until `heal` is called.
    pub fn partition(&self, id: u64) {
        if let Some(link) = self.links.lock().unwrap().get_mut(&id) {
            link.connected = false;
        }
    }

    pub fn heal(&self, id: u64) {
        if let Some(link) = self.links.lock().unwrap().get_mut(&id) {
            link.connected = true;
        }
    }

    fn dispatch(&self, peer: u64) -> Option<Arc<dyn RpcHandler<C>>> {
        let links = self.links.lock().unwrap();
        let link = links.get(&peer)?;
        if link.connected {
            Some(link.handler.clone())
        } else {
            None
        }
    }
}

impl<C> Default for LocalTransport<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send> Transport<C> for LocalTransport<C> {
    fn request_vote(&self, peer: u64, args: RequestVoteArgs) -> Option<RequestVoteReply> {
        Some(self.dispatch(peer)?.handle_request_vote(args))
    }

    fn append_entries(&self, peer: u64, args: AppendEntriesArgs<C>) -> Option<AppendEntriesReply> {
        Some(self.dispatch(peer)?.handle_append_entries(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;
    impl RpcHandler<u32> for EchoHandler {
        fn handle_request_vote(&self, args: RequestVoteArgs) -> RequestVoteReply {
            RequestVoteReply { responder_term: args.candidate_term, decision: VoteDecision::Granted }
        }
        fn handle_append_entries(&self, args: AppendEntriesArgs<u32>) -> AppendEntriesReply {
            AppendEntriesReply { responder_term: args.leader_term, success: true }
        }
    }

    #[test]
    fn partitioned_peer_yields_none() {
        let transport: LocalTransport<u32> = LocalTransport::new();
        transport.register(1, Arc::new(EchoHandler));
        let args = RequestVoteArgs { candidate_id: 0, candidate_term: 1, last_log_index: 0, last_log_term: 0 };
        assert!(transport.request_vote(1, args).is_some());

        transport.partition(1);
        assert!(transport.request_vote(1, args).is_none());

        transport.heal(1);
        assert!(transport.request_vote(1, args).is_some());
    }

    #[test]
    fn unregistered_peer_yields_none() {
        let transport: LocalTransport<u32> = LocalTransport::new();
        let args = RequestVoteArgs { candidate_id: 0, candidate_term: 1, last_log_index: 0, last_log_term: 0 };
        assert!(transport.request_vote(99, args).is_none());
    }
}
