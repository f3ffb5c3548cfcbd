//! The replica core: role driver, election engine, and replication engine.
//!
//! Everything in this module runs under a single per-replica lock
//! (`Inner::state`), released before any outbound RPC and reacquired to
//! apply its reply, per the concurrency model in the design (a stale reply
//! is recognized by a term mismatch and discarded rather than prevented).

use std::cmp;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::apply::{self, ApplyMsg};
use crate::config::Config;
use crate::error::Result;
use crate::log::{Log, LogEntry, MemoryLog};
use crate::persister::{PersistedState, Persister};
use crate::transport::{
    AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply, RpcHandler,
    Transport, VoteDecision,
};

use std::sync::mpsc::SyncSender;

/// Per-follower bookkeeping, alive only while this replica is a leader.
/// Kept inside the `Leader` variant rather than as always-present fields on
/// `ReplicaState`, so a Follower/Candidate carries no leader-shaped state.
struct LeaderState {
    next_index: HashMap<u64, u64>,
    match_index: HashMap<u64, u64>,
}

impl LeaderState {
    fn reinitialized(peers: impl Iterator<Item = u64>, last_log_index: u64) -> LeaderState {
        let mut next_index = HashMap::new();
        let mut match_index = HashMap::new();
        for peer in peers {
            next_index.insert(peer, last_log_index + 1);
            match_index.insert(peer, 0);
        }
        LeaderState { next_index, match_index }
    }
}

enum Role {
    Follower,
    Candidate,
    Leader(LeaderState),
}

impl Role {
    fn is_leader(&self) -> bool {
        matches!(self, Role::Leader(_))
    }

    fn is_candidate(&self) -> bool {
        matches!(self, Role::Candidate)
    }
}

struct ReplicaState<C> {
    current_term: u64,
    voted_for: Option<u64>,
    role: Role,
    log: MemoryLog<C>,
    commit_index: u64,
    last_applied: u64,
    election_deadline: Instant,
    rng: StdRng,
}

fn random_election_timeout(config: &Config, rng: &mut StdRng) -> Duration {
    let (min, max) = config.election_timeout_ms;
    Duration::from_millis(rng.gen_range(min..max))
}

/// `step down`: transition to Follower, adopt the observed higher term, and
/// clear `voted_for`. Deadlines are managed separately by each caller, since
/// RequestVote and AppendEntries reset them under slightly different
/// conditions.
fn step_down<C>(state: &mut ReplicaState<C>, new_term: u64) {
    debug_assert!(new_term >= state.current_term);
    state.current_term = new_term;
    state.role = Role::Follower;
    state.voted_for = None;
}

struct Inner<C, T, P> {
    config: Config,
    transport: Arc<T>,
    persister: P,
    state: Mutex<ReplicaState<C>>,
    apply_sender: SyncSender<ApplyMsg<C>>,
    killed: AtomicBool,
}

impl<C, T, P> Inner<C, T, P>
where
    C: Clone + Send + Serialize + DeserializeOwned + 'static,
    T: Transport<C> + 'static,
    P: Persister + Sync + 'static,
{
    fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    fn persist_locked(&self, state: &ReplicaState<C>) {
        let blob = PersistedState {
            current_term: state.current_term,
            voted_for: state.voted_for,
            log: state.log.as_slice().to_vec(),
            commit_index: state.commit_index,
            last_applied: state.last_applied,
        }
        .encode();
        self.persister.save(blob);
    }

    fn run_apply(&self, state: &mut ReplicaState<C>) {
        if self.is_killed() {
            return;
        }
        let delivered = apply::run_apply_pump(
            &state.log,
            &mut state.last_applied,
            state.commit_index,
            &self.apply_sender,
        );
        if delivered > 0 {
            ::log::trace!(
                "peer {}: applied through index {}",
                self.config.me,
                state.last_applied
            );
        }
    }

    /// RequestVote handler (receiver side).
    fn handle_request_vote(&self, args: RequestVoteArgs) -> RequestVoteReply {
        let mut state = self.state.lock().unwrap();
        let mut dirty = false;
        if args.candidate_term > state.current_term {
            step_down(&mut state, args.candidate_term);
            dirty = true;
        }
        let decision = if args.candidate_term < state.current_term {
            VoteDecision::TermTooSmall
        } else if !state
            .log
            .is_at_least_as_up_to_date(args.last_log_index, args.last_log_term)
        {
            VoteDecision::LogNotUpToDate
        } else {
            match state.voted_for {
                None => VoteDecision::Granted,
                Some(id) if id == args.candidate_id => VoteDecision::Granted,
                Some(_) => VoteDecision::AlreadyVoted,
            }
        };
        if decision == VoteDecision::Granted {
            state.voted_for = Some(args.candidate_id);
            state.election_deadline = Instant::now() + random_election_timeout(&self.config, &mut state.rng);
            dirty = true;
        }
        let responder_term = state.current_term;
        if dirty {
            self.persist_locked(&state);
        }
        ::log::debug!(
            "peer {}: RequestVote from {} (term {}) -> {:?}",
            self.config.me,
            args.candidate_id,
            args.candidate_term,
            decision
        );
        RequestVoteReply { responder_term, decision }
    }

    /// AppendEntries handler (receiver side).
    fn handle_append_entries(&self, mut args: AppendEntriesArgs<C>) -> AppendEntriesReply {
        let mut state = self.state.lock().unwrap();
        if args.leader_term < state.current_term {
            return AppendEntriesReply { responder_term: state.current_term, success: false };
        }
        let mut dirty = false;
        if args.leader_term > state.current_term || state.role.is_candidate() {
            step_down(&mut state, args.leader_term);
            dirty = true;
        }
        state.election_deadline = Instant::now() + random_election_timeout(&self.config, &mut state.rng);

        if args.prev_log_index > state.log.last_index()
            || state.log.term_at(args.prev_log_index) != args.prev_log_term
        {
            let responder_term = state.current_term;
            if dirty {
                self.persist_locked(&state);
            }
            return AppendEntriesReply { responder_term, success: false };
        }

        let mut index = args.prev_log_index + 1;
        for entry in args.entries.drain(..) {
            match state.log.entry_at(index) {
                Some(existing) if existing.term == entry.term => {}
                Some(_) => {
                    state.log.truncate_from(index);
                    state.log.append(entry);
                    dirty = true;
                }
                None => {
                    state.log.append(entry);
                    dirty = true;
                }
            }
            index += 1;
        }
        let index_of_last_new_entry = index - 1;

        if args.leader_commit > state.commit_index {
            state.commit_index = cmp::min(args.leader_commit, index_of_last_new_entry);
            self.run_apply(&mut state);
            dirty = true;
        }
        let responder_term = state.current_term;
        if dirty {
            self.persist_locked(&state);
        }
        AppendEntriesReply { responder_term, success: true }
    }

    /// Leader-side reply handling for one outstanding AppendEntries call.
    /// `prev_index`/`prev_term`/`entries_len` describe the call this reply
    /// answers; `term` is the leader term under which it was sent, used to
    /// detect and discard stale replies.
    fn handle_append_entries_reply(
        &self,
        peer: u64,
        term: u64,
        prev_index: u64,
        prev_term: u64,
        entries_len: u64,
        reply: AppendEntriesReply,
    ) {
        let mut state = self.state.lock().unwrap();
        if state.current_term != term || !state.role.is_leader() {
            return;
        }
        if reply.responder_term > state.current_term {
            step_down(&mut state, reply.responder_term);
            self.persist_locked(&state);
            return;
        }
        if reply.success {
            let match_index = prev_index + entries_len;
            if let Role::Leader(ls) = &mut state.role {
                ls.match_index.insert(peer, match_index);
                ls.next_index.insert(peer, match_index + 1);
            }
            self.advance_commit_index(&mut state);
        } else {
            let floor = match &state.role {
                Role::Leader(ls) => ls.match_index.get(&peer).copied().unwrap_or(0) + 1,
                _ => 1,
            };
            let mut idx = prev_index;
            while idx > floor && state.log.term_at(idx) == prev_term {
                idx -= 1;
            }
            if let Role::Leader(ls) = &mut state.role {
                ls.next_index.insert(peer, idx.max(1));
            }
        }
    }

    /// Commit-index advancement: the highest N replicated on a majority
    /// (including self) with `log[N].term == currentTerm`.
    fn advance_commit_index(&self, state: &mut ReplicaState<C>) {
        let mut match_indices: Vec<u64> = match &state.role {
            Role::Leader(ls) => self
                .config
                .other_peers()
                .map(|p| ls.match_index.get(p).copied().unwrap_or(0))
                .collect(),
            _ => return,
        };
        match_indices.push(state.log.last_index());
        match_indices.sort_unstable_by(|a, b| b.cmp(a));
        let quorum = self.config.quorum_size();
        let candidate_n = match_indices[quorum - 1];
        if candidate_n > state.commit_index && state.log.term_at(candidate_n) == state.current_term {
            state.commit_index = candidate_n;
            self.run_apply(state);
            self.persist_locked(state);
        }
    }

    /// Non-blocking append on the leader path.
    fn start(&self, command: C) -> (u64, u64, bool) {
        let mut state = self.state.lock().unwrap();
        if !state.role.is_leader() {
            return (0, state.current_term, false);
        }
        let index = state.log.last_index() + 1;
        let term = state.current_term;
        state.log.append(LogEntry { index, term, command });
        self.persist_locked(&state);
        // Re-evaluate the leader's own quorum immediately: with no other
        // peers, nothing else will ever trigger this, so a peerless leader
        // would otherwise never commit or apply anything it appends.
        self.advance_commit_index(&mut state);
        (index, term, true)
    }

    fn get_state(&self) -> (u64, bool) {
        let state = self.state.lock().unwrap();
        (state.current_term, state.role.is_leader())
    }
}

impl<C, T, P> RpcHandler<C> for Inner<C, T, P>
where
    C: Clone + Send + Serialize + DeserializeOwned + 'static,
    T: Transport<C> + 'static,
    P: Persister + Sync + 'static,
{
    fn handle_request_vote(&self, args: RequestVoteArgs) -> RequestVoteReply {
        Inner::handle_request_vote(self, args)
    }

    fn handle_append_entries(&self, args: AppendEntriesArgs<C>) -> AppendEntriesReply {
        Inner::handle_append_entries(self, args)
    }
}

/// A single Raft replica. Cheaply cloneable: every clone shares the same
/// underlying state through an `Arc`, so the role-driver thread and the
/// RPC-handling side both observe the same mutable state.
pub struct Replica<C, T, P> {
    inner: Arc<Inner<C, T, P>>,
}

impl<C, T, P> Clone for Replica<C, T, P> {
    fn clone(&self) -> Self {
        Replica { inner: self.inner.clone() }
    }
}

impl<C, T, P> Replica<C, T, P>
where
    C: Clone + Send + Serialize + DeserializeOwned + 'static,
    T: Transport<C> + 'static,
    P: Persister + Sync + 'static,
{
    /// Restores persisted state (if any) and starts the role-driver thread.
    /// Does not block on network I/O.
    pub fn new(
        config: Config,
        transport: Arc<T>,
        persister: P,
        apply_sender: SyncSender<ApplyMsg<C>>,
    ) -> Result<Replica<C, T, P>> {
        let restored = PersistedState::<C>::decode(&persister.read())?;
        let mut rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut log = MemoryLog::new();
        log.restore(restored.log);
        let election_deadline = Instant::now() + random_election_timeout(&config, &mut rng);

        let state = ReplicaState {
            current_term: restored.current_term,
            voted_for: restored.voted_for,
            role: Role::Follower,
            log,
            commit_index: restored.commit_index,
            last_applied: restored.last_applied,
            election_deadline,
            rng,
        };

        let inner = Arc::new(Inner {
            config,
            transport,
            persister,
            state: Mutex::new(state),
            apply_sender,
            killed: AtomicBool::new(false),
        });

        let driver_inner = inner.clone();
        thread::spawn(move || run_driver(driver_inner));

        Ok(Replica { inner })
    }

    pub fn start(&self, command: C) -> (u64, u64, bool) {
        self.inner.start(command)
    }

    pub fn get_state(&self) -> (u64, bool) {
        self.inner.get_state()
    }

    /// Idempotent, non-blocking. Every long-running loop checks the flag on
    /// its next iteration and exits; in-flight RPCs are allowed to finish
    /// and their replies are discarded.
    pub fn kill(&self) {
        self.inner.killed.store(true, Ordering::SeqCst);
    }

    pub fn is_killed(&self) -> bool {
        self.inner.is_killed()
    }
}

impl<C, T, P> RpcHandler<C> for Replica<C, T, P>
where
    C: Clone + Send + Serialize + DeserializeOwned + 'static,
    T: Transport<C> + 'static,
    P: Persister + Sync + 'static,
{
    fn handle_request_vote(&self, args: RequestVoteArgs) -> RequestVoteReply {
        self.inner.handle_request_vote(args)
    }

    fn handle_append_entries(&self, args: AppendEntriesArgs<C>) -> AppendEntriesReply {
        self.inner.handle_append_entries(args)
    }
}

fn run_driver<C, T, P>(inner: Arc<Inner<C, T, P>>)
where
    C: Clone + Send + Serialize + DeserializeOwned + 'static,
    T: Transport<C> + 'static,
    P: Persister + Sync + 'static,
{
    loop {
        if inner.is_killed() {
            return;
        }
        let is_candidate_or_follower_timed_out;
        {
            let mut state = inner.state.lock().unwrap();
            match state.role {
                Role::Leader(_) => {
                    drop(state);
                    leader_tick(&inner);
                    continue;
                }
                Role::Candidate => {
                    is_candidate_or_follower_timed_out = true;
                }
                Role::Follower => {
                    if Instant::now() >= state.election_deadline {
                        state.role = Role::Candidate;
                        is_candidate_or_follower_timed_out = true;
                    } else {
                        is_candidate_or_follower_timed_out = false;
                    }
                }
            }
        }
        if is_candidate_or_follower_timed_out {
            run_election(&inner);
        } else {
            thread::sleep(inner.config.follower_poll_quantum);
        }
    }
}

/// Candidate path: one full election attempt. Always re-increments the
/// term on entry, whether arriving fresh from Follower or retrying after a
/// previous attempt that reached its deadline without a majority.
fn run_election<C, T, P>(inner: &Arc<Inner<C, T, P>>)
where
    C: Clone + Send + Serialize + DeserializeOwned + 'static,
    T: Transport<C> + 'static,
    P: Persister + Sync + 'static,
{
    let (term, candidate_id, last_log_index, last_log_term, deadline, peers) = {
        let mut state = inner.state.lock().unwrap();
        state.current_term += 1;
        state.role = Role::Candidate;
        state.voted_for = Some(inner.config.me);
        state.election_deadline = Instant::now() + random_election_timeout(&inner.config, &mut state.rng);
        inner.persist_locked(&state);
        (
            state.current_term,
            inner.config.me,
            state.log.last_index(),
            state.log.last_term(),
            state.election_deadline,
            inner.config.other_peers().copied().collect::<Vec<_>>(),
        )
    };
    ::log::info!("peer {}: starting election for term {}", candidate_id, term);

    let (tx, rx) = mpsc::channel();
    for peer in peers {
        let inner = inner.clone();
        let tx = tx.clone();
        thread::spawn(move || {
            let args = RequestVoteArgs { candidate_id, candidate_term: term, last_log_index, last_log_term };
            let reply = inner.transport.request_vote(peer, args);
            let _ = tx.send(reply);
        });
    }
    drop(tx);

    let mut granted = 1usize; // self-vote
    loop {
        if inner.is_killed() {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return; // remain Candidate; next driver iteration starts a fresh election
        }
        let wait = cmp::min(deadline - now, inner.config.follower_poll_quantum);
        match rx.recv_timeout(wait) {
            Ok(Some(reply)) => {
                let mut state = inner.state.lock().unwrap();
                if !state.role.is_candidate() || state.current_term != term {
                    return; // already resolved by another RPC in the meantime
                }
                if reply.responder_term > state.current_term {
                    step_down(&mut state, reply.responder_term);
                    inner.persist_locked(&state);
                    return;
                }
                if reply.decision == VoteDecision::Granted && reply.responder_term == term {
                    granted += 1;
                    if granted >= inner.config.quorum_size() {
                        let last_log_index = state.log.last_index();
                        state.role = Role::Leader(LeaderState::reinitialized(
                            inner.config.other_peers().copied(),
                            last_log_index,
                        ));
                        ::log::info!("peer {}: won election for term {}", candidate_id, term);
                        drop(state);
                        leader_tick(inner);
                        return;
                    }
                }
            }
            Ok(None) => {} // failed/dropped call: no reply yet, keep waiting
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return, // every peer has replied or failed
        }
    }
}

/// Leader path: one heartbeat/replication round, then sleep.
fn leader_tick<C, T, P>(inner: &Arc<Inner<C, T, P>>)
where
    C: Clone + Send + Serialize + DeserializeOwned + 'static,
    T: Transport<C> + 'static,
    P: Persister + Sync + 'static,
{
    struct PeerCall<C> {
        peer: u64,
        prev_index: u64,
        prev_term: u64,
        entries: Vec<LogEntry<C>>,
    }

    let (term, leader_id, leader_commit, calls) = {
        let state = inner.state.lock().unwrap();
        let leader_state = match &state.role {
            Role::Leader(ls) => ls,
            _ => return,
        };
        let calls: Vec<PeerCall<C>> = inner
            .config
            .other_peers()
            .map(|&peer| {
                let next = leader_state.next_index.get(&peer).copied().unwrap_or(1);
                let prev_index = next.saturating_sub(1);
                let prev_term = state.log.term_at(prev_index);
                let entries = state.log.entries_after(prev_index).to_vec();
                PeerCall { peer, prev_index, prev_term, entries }
            })
            .collect();
        (state.current_term, inner.config.me, state.commit_index, calls)
    };

    for call in calls {
        let inner = inner.clone();
        thread::spawn(move || {
            let entries_len = call.entries.len() as u64;
            let args = AppendEntriesArgs {
                leader_id,
                leader_term: term,
                prev_log_index: call.prev_index,
                prev_log_term: call.prev_term,
                entries: call.entries,
                leader_commit,
            };
            if let Some(reply) = inner.transport.append_entries(call.peer, args) {
                inner.handle_append_entries_reply(
                    call.peer,
                    term,
                    call.prev_index,
                    call.prev_term,
                    entries_len,
                    reply,
                );
            }
        });
    }

    // Re-evaluate our own quorum unconditionally: with no other peers (or
    // while every peer's reply is still in flight), nothing else drives
    // this leader's commit index forward.
    {
        let mut state = inner.state.lock().unwrap();
        inner.advance_commit_index(&mut state);
    }

    thread::sleep(inner.config.heartbeat_interval);
}

/// Test-only seams into otherwise-private replica state, for white-box
/// coverage of the log-reconciliation and commit-index rules that are
/// impractical to exercise deterministically through timing alone.
#[cfg(test)]
impl<C, T, P> Replica<C, T, P>
where
    C: Clone + Send + Serialize + DeserializeOwned + 'static,
    T: Transport<C> + 'static,
    P: Persister + Sync + 'static,
{
    fn log_snapshot(&self) -> Vec<LogEntry<C>> {
        self.inner.state.lock().unwrap().log.as_slice().to_vec()
    }

    fn append_for_test(&self, term: u64, command: C) -> u64 {
        let mut state = self.inner.state.lock().unwrap();
        let index = state.log.last_index() + 1;
        state.log.append(LogEntry { index, term, command });
        index
    }

    fn force_leader_for_test(&self, term: u64, match_index: HashMap<u64, u64>) {
        let mut state = self.inner.state.lock().unwrap();
        state.current_term = term;
        state.voted_for = Some(self.inner.config.me);
        let mut leader_state =
            LeaderState::reinitialized(self.inner.config.other_peers().copied(), state.log.last_index());
        leader_state.match_index = match_index;
        state.role = Role::Leader(leader_state);
    }

    fn trigger_commit_check_for_test(&self) {
        let mut state = self.inner.state.lock().unwrap();
        self.inner.advance_commit_index(&mut state);
    }

    fn commit_index_for_test(&self) -> u64 {
        self.inner.state.lock().unwrap().commit_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persister::MemoryPersister;
    use crate::transport::LocalTransport;
    use std::sync::mpsc::sync_channel;
    use std::time::Duration;

    fn test_config(me: u64, peers: Vec<u64>, seed: u64) -> Config {
        let mut config = Config::new(peers, me);
        config.election_timeout_ms = (40, 80);
        config.heartbeat_interval = Duration::from_millis(10);
        config.follower_poll_quantum = Duration::from_millis(3);
        config.rng_seed = Some(seed);
        config
    }

    fn build_cluster(
        n: u64,
    ) -> (
        Arc<LocalTransport<String>>,
        Vec<Replica<String, LocalTransport<String>, MemoryPersister>>,
        Vec<std::sync::mpsc::Receiver<ApplyMsg<String>>>,
    ) {
        let transport = Arc::new(LocalTransport::<String>::new());
        let peers: Vec<u64> = (0..n).collect();
        let mut replicas = Vec::new();
        let mut receivers = Vec::new();
        for id in 0..n {
            let (tx, rx) = sync_channel(16);
            let config = test_config(id, peers.clone(), 1000 + id);
            let replica = Replica::new(config, transport.clone(), MemoryPersister::new(), tx).unwrap();
            transport.register(id, Arc::new(replica.clone()));
            replicas.push(replica);
            receivers.push(rx);
        }
        (transport, replicas, receivers)
    }

    fn wait_for_leader(
        replicas: &[Replica<String, LocalTransport<String>, MemoryPersister>],
        timeout: Duration,
    ) -> Option<usize> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            for (i, r) in replicas.iter().enumerate() {
                if r.get_state().1 {
                    return Some(i);
                }
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn single_peer_cluster_is_always_leader() {
        let (_transport, replicas, rx) = build_cluster(1);
        let leader = wait_for_leader(&replicas, Duration::from_secs(2));
        assert_eq!(leader, Some(0));
        let (index, _, is_leader) = replicas[0].start("only".to_string());
        assert!(is_leader);
        assert_eq!(index, 1);
        let msg = rx[0].recv_timeout(Duration::from_secs(2)).expect("peerless leader never self-committed");
        assert_eq!(msg.command_index, 1);
        assert_eq!(msg.command, "only");
        for r in &replicas {
            r.kill();
        }
    }

    #[test]
    fn three_peer_cluster_elects_exactly_one_leader() {
        let (_transport, replicas, _rx) = build_cluster(3);
        let leader = wait_for_leader(&replicas, Duration::from_secs(2));
        assert!(leader.is_some());
        thread::sleep(Duration::from_millis(50));
        let leader_count = replicas.iter().filter(|r| r.get_state().1).count();
        assert_eq!(leader_count, 1);
        for r in &replicas {
            r.kill();
        }
    }

    #[test]
    fn basic_agreement_delivers_command_to_all_peers() {
        let (_transport, replicas, rx) = build_cluster(3);
        let leader_idx = wait_for_leader(&replicas, Duration::from_secs(2)).expect("no leader elected");
        let (index, _term, is_leader) = replicas[leader_idx].start("x".to_string());
        assert!(is_leader);
        assert_eq!(index, 1);

        for receiver in &rx {
            let msg = receiver.recv_timeout(Duration::from_secs(2)).expect("command never delivered");
            assert_eq!(msg.command_index, 1);
            assert_eq!(msg.command, "x");
            assert!(msg.command_valid);
        }
        for r in &replicas {
            r.kill();
        }
    }

    /// A stale follower's conflicting suffix is discarded, and the
    /// agreeing prefix survives untouched.
    #[test]
    fn append_entries_truncates_conflicting_suffix_and_preserves_agreeing_prefix() {
        let config = test_config(2, vec![0, 1, 2], 42);
        let transport = Arc::new(LocalTransport::<u32>::new());
        let (tx, _rx) = sync_channel(8);
        let replica = Replica::new(config, transport, MemoryPersister::new(), tx).unwrap();

        // Seed C's log to [(1,1,x),(2,2,z),(3,2,w)].
        let seed = AppendEntriesArgs {
            leader_id: 9,
            leader_term: 2,
            prev_log_index: 0,
            prev_log_term: 0,
            entries: vec![
                LogEntry { index: 1, term: 1, command: 10 },
                LogEntry { index: 2, term: 2, command: 20 },
                LogEntry { index: 3, term: 2, command: 30 },
            ],
            leader_commit: 0,
        };
        assert!(replica.handle_append_entries(seed).success);
        assert_eq!(replica.log_snapshot().len(), 3);

        // New leader B at term 3 sends [(2,3,y)], conflicting with C's index 2.
        let overwrite = AppendEntriesArgs {
            leader_id: 1,
            leader_term: 3,
            prev_log_index: 1,
            prev_log_term: 1,
            entries: vec![LogEntry { index: 2, term: 3, command: 99 }],
            leader_commit: 0,
        };
        assert!(replica.handle_append_entries(overwrite).success);

        let log = replica.log_snapshot();
        assert_eq!(log.len(), 2, "z and w must be discarded, not just shadowed");
        assert_eq!(log[0].term, 1);
        assert_eq!(log[1].term, 3);
        assert_eq!(log[1].command, 99);

        let (term, is_leader) = replica.get_state();
        assert_eq!(term, 3);
        assert!(!is_leader);
        replica.kill();
    }

    /// An entry from a prior term is not committed merely because a later
    /// majority happens to include it; it becomes safe only transitively,
    /// via a current-term entry at or above its index being committed.
    #[test]
    fn commit_index_requires_current_term_entry_replicated_to_majority() {
        let config = test_config(0, vec![0, 1, 2, 3, 4], 4242);
        let transport = Arc::new(LocalTransport::<u32>::new());
        let (tx, _rx) = sync_channel(8);
        let replica = Replica::new(config, transport, MemoryPersister::new(), tx).unwrap();

        // L1 (term 2) appends index 1 but only replicates it to peer 1 (a minority).
        replica.append_for_test(2, 10);
        let mut minority = HashMap::new();
        minority.insert(1, 1);
        minority.insert(2, 0);
        minority.insert(3, 0);
        minority.insert(4, 0);
        replica.force_leader_for_test(2, minority);
        replica.trigger_commit_check_for_test();
        assert_eq!(
            replica.commit_index_for_test(),
            0,
            "a term-2 entry replicated to only a minority must not commit"
        );

        // L2 (term 3) appends index 2 and replicates it to a majority (self + peers 1, 2).
        replica.append_for_test(3, 20);
        let mut majority = HashMap::new();
        majority.insert(1, 2);
        majority.insert(2, 2);
        majority.insert(3, 0);
        majority.insert(4, 0);
        replica.force_leader_for_test(3, majority);
        replica.trigger_commit_check_for_test();
        assert_eq!(
            replica.commit_index_for_test(),
            2,
            "a committed current-term entry also commits the prior-term entry beneath it"
        );

        replica.kill();
    }
}
