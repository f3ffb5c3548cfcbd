//! The apply pump: delivering committed entries to the embedding
//! application in strict, gapless, exactly-once index order.

use std::sync::mpsc::SyncSender;

use crate::log::Log;

/// A single delivery to the embedding application.
///
/// `command_valid` is always `true` for entries this crate produces; the
/// field exists (rather than being omitted) because the delivery channel is
/// the same shape the original design's `ApplyMsg` used, where a future
/// extension (snapshots) would deliver non-command records with it set to
/// `false`. This crate never does that -- snapshotting is a non-goal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyMsg<C> {
    pub command_valid: bool,
    pub command: C,
    pub command_index: u64,
}

/// Delivers every entry with index in `(last_applied, commit_index]`, in
/// order, over `sender`, advancing `*last_applied` as each send completes.
///
/// Expected to be called under the replica lock: `SyncSender::send` may
/// block if the application is slow to drain the channel, which holds the
/// lock for that duration. That is an acceptable form of backpressure --
/// this crate does not attempt to apply concurrently with other mutations
/// of the same log.
///
/// Returns the number of entries delivered. Panics only if the receiving
/// end has been dropped while entries remain to deliver, since that means
/// the embedding application is gone and no progress can be made or
/// observed anyway.
pub fn run_apply_pump<C: Clone>(
    log: &dyn Log<C>,
    last_applied: &mut u64,
    commit_index: u64,
    sender: &SyncSender<ApplyMsg<C>>,
) -> u64 {
    let mut delivered = 0;
    while *last_applied < commit_index {
        let next_index = *last_applied + 1;
        let entry = log
            .entry_at(next_index)
            .expect("entries up to commit_index must already be present in the log");
        sender
            .send(ApplyMsg {
                command_valid: true,
                command: entry.command.clone(),
                command_index: entry.index,
            })
            .expect("embedding application dropped the delivery channel");
        *last_applied = next_index;
        delivered += 1;
    }
    delivered
}
