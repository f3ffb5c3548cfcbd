//! Cluster configuration and the timing constants that separate election
//! timeouts from heartbeats.
//!
//! Timeouts and heartbeat interval are overridable `Config` fields rather
//! than fixed constants, with the constants below kept as defaults.

use std::collections::HashMap;
use std::time::Duration;

/// Default lower bound of the election timeout range, in milliseconds.
pub const ELECTION_TIMEOUT_MIN_MS: u64 = 200;
/// Default upper bound (exclusive) of the election timeout range, in milliseconds.
pub const ELECTION_TIMEOUT_MAX_MS: u64 = 400;
/// Default interval between leader heartbeats, in milliseconds.
pub const HEARTBEAT_INTERVAL_MS: u64 = 50;
/// Poll quantum for the follower's timeout-checking loop, in milliseconds.
pub const FOLLOWER_POLL_QUANTUM_MS: u64 = 10;

/// Static cluster membership and per-replica timing parameters.
///
/// `peers` must be identical (same ids, same count) across every replica in
/// the cluster; membership changes are out of scope for this crate.
#[derive(Clone, Debug)]
pub struct Config {
    /// All peer ids in the cluster, including `me`.
    pub peers: Vec<u64>,
    /// This replica's own id. Must appear in `peers`.
    pub me: u64,
    /// Lower/upper (exclusive) bound, in milliseconds, for the randomized
    /// election timeout drawn on every transition into Follower or Candidate.
    pub election_timeout_ms: (u64, u64),
    /// Interval between leader heartbeat/replication ticks.
    pub heartbeat_interval: Duration,
    /// Poll quantum for the follower's deadline-checking loop.
    pub follower_poll_quantum: Duration,
    /// Optional fixed seed for this replica's election-timeout jitter.
    /// Left unset, each replica seeds from entropy at construction time.
    pub rng_seed: Option<u64>,
}

impl Config {
    pub fn new(peers: Vec<u64>, me: u64) -> Config {
        Config {
            peers,
            me,
            election_timeout_ms: (ELECTION_TIMEOUT_MIN_MS, ELECTION_TIMEOUT_MAX_MS),
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
            follower_poll_quantum: Duration::from_millis(FOLLOWER_POLL_QUANTUM_MS),
            rng_seed: None,
        }
    }

    /// Number of replicas required for a strict majority, including self.
    pub fn quorum_size(&self) -> usize {
        self.peers.len() / 2 + 1
    }

    pub fn other_peers(&self) -> impl Iterator<Item = &u64> {
        self.peers.iter().filter(move |&&id| id != self.me)
    }
}

/// Convenience builder for callers that associate peers with transport-level
/// addresses rather than bare ids, deriving the sorted id list `Config` needs.
pub fn peer_ids_from_map<A>(cluster: &HashMap<u64, A>) -> Vec<u64> {
    let mut ids: Vec<u64> = cluster.keys().cloned().collect();
    ids.sort_unstable();
    ids
}
