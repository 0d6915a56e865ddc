use crate::commitlog::Index;
use crate::replica::{ReplicaId, Term};
use std::collections::HashMap;

/// LeaderStateTracker is the replication bookkeeping of one leadership term. It is created on
/// promotion and dropped on step-down.
pub(crate) struct LeaderStateTracker {
    term: Term,
    peer_state: HashMap<ReplicaId, PeerState>,
    consecutive_missed_heartbeat_rounds: u32,
}

impl LeaderStateTracker {
    pub(super) fn new(term: Term, peer_state: HashMap<ReplicaId, PeerState>) -> Self {
        LeaderStateTracker {
            term,
            peer_state,
            consecutive_missed_heartbeat_rounds: 0,
        }
    }

    pub(crate) fn term(&self) -> Term {
        self.term
    }

    pub(crate) fn peer_state_mut(&mut self, peer_id: &ReplicaId) -> Option<&mut PeerState> {
        self.peer_state.get_mut(peer_id)
    }

    pub(crate) fn peers_iter(&self) -> impl Iterator<Item = (&ReplicaId, &PeerState)> {
        self.peer_state.iter()
    }

    pub(crate) fn peers_matched_indexes(&self) -> Vec<Option<Index>> {
        self.peer_state.values().map(|peer_state| peer_state.matched()).collect()
    }

    /// Record the outcome of one heartbeat round. Returns the number of consecutive rounds that
    /// failed to reach a majority, including this one.
    pub(crate) fn record_heartbeat_round(&mut self, reached_majority: bool) -> u32 {
        if reached_majority {
            self.consecutive_missed_heartbeat_rounds = 0;
        } else {
            self.consecutive_missed_heartbeat_rounds += 1;
        }

        self.consecutive_missed_heartbeat_rounds
    }
}

pub(crate) struct PeerState {
    // > index of the next log entry to send to that server
    // > (initialized to leader last log index + 1)
    next: Index,
    // > index of highest log entry known to be replicated on server
    // > (initialized to 0, increases monotonically)
    // After initial reconciliation of follower logs, this will converge
    // to always be `next - 1`.
    matched: Option<Index>,
}

impl PeerState {
    pub(super) fn new(last_log_index: Option<Index>) -> Self {
        PeerState {
            next: last_log_index
                .map(|i| i.plus(1))
                .unwrap_or_else(Index::start_index),
            matched: None,
        }
    }

    pub(crate) fn next_and_previous_log_index(&self) -> (Index, Option<Index>) {
        (self.next, self.next.checked_minus(1))
    }

    pub(crate) fn matched(&self) -> Option<Index> {
        self.matched
    }

    pub(crate) fn handle_append_entries_result(&mut self, logger: &slog::Logger, update: PeerStateUpdate) {
        match update {
            PeerStateUpdate::OtherError => { /* No action */ }
            PeerStateUpdate::Success { last_index_covered } => {
                self.update_log(last_index_covered);
            }
            PeerStateUpdate::PeerLogBehind { previous_log_entry } => {
                self.rewind_log(logger, previous_log_entry);
            }
        }
    }

    fn update_log(&mut self, last_index_covered: Option<Index>) {
        // Replies from concurrent rounds can arrive in any order, so a success never moves
        // `matched` backwards.
        if let Some(covered) = last_index_covered {
            if self.matched.map_or(true, |matched| covered > matched) {
                self.matched.replace(covered);
            }
        }

        self.next = self.next_floor();
    }

    fn next_floor(&self) -> Index {
        match self.matched {
            Some(matched) => matched.plus(1),
            None => Index::start_index(),
        }
    }

    fn rewind_log(&mut self, logger: &slog::Logger, previous_log_entry: Option<Index>) {
        // Only the reply to a request built from the current `next` may rewind it. Otherwise two
        // rejected rounds in flight would rewind twice for one mismatch.
        if previous_log_entry != self.next.checked_minus(1) {
            slog::debug!(
                logger,
                "Ignoring stale log mismatch for prev {:?}, next is {:?}",
                previous_log_entry,
                self.next
            );
            return;
        }

        match self.next.checked_minus(1) {
            Some(new_next) if new_next >= self.next_floor() => self.next = new_next,
            _ => slog::warn!(
                logger,
                "Can't rewind peer log past {:?}. Matched: {:?}",
                self.next,
                self.matched
            ),
        }
    }
}

#[derive(Debug)]
pub(crate) enum PeerStateUpdate {
    Success { last_index_covered: Option<Index> },
    PeerLogBehind { previous_log_entry: Option<Index> },
    OtherError,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn idx(i: u64) -> Index {
        Index::new(i)
    }

    #[test]
    fn fresh_peer_starts_after_leader_log() {
        let peer = PeerState::new(Some(idx(5)));
        assert_eq!(peer.next_and_previous_log_index(), (idx(6), Some(idx(5))));
        assert_eq!(peer.matched(), None);

        let peer = PeerState::new(None);
        assert_eq!(peer.next_and_previous_log_index(), (idx(1), None));
    }

    #[test]
    fn rewind_until_match_then_catch_up() {
        let logger = logger();
        let mut peer = PeerState::new(Some(idx(3)));

        // Mismatch at prev=3, then prev=2.
        peer.handle_append_entries_result(&logger, PeerStateUpdate::PeerLogBehind {
            previous_log_entry: Some(idx(3)),
        });
        assert_eq!(peer.next_and_previous_log_index(), (idx(3), Some(idx(2))));
        peer.handle_append_entries_result(&logger, PeerStateUpdate::PeerLogBehind {
            previous_log_entry: Some(idx(2)),
        });
        assert_eq!(peer.next_and_previous_log_index(), (idx(2), Some(idx(1))));

        // prev=1 matches and entries 2..=3 are appended.
        peer.handle_append_entries_result(&logger, PeerStateUpdate::Success {
            last_index_covered: Some(idx(3)),
        });
        assert_eq!(peer.matched(), Some(idx(3)));
        assert_eq!(peer.next_and_previous_log_index(), (idx(4), Some(idx(3))));
    }

    #[test]
    fn stale_replies_do_not_move_progress_backwards() {
        let logger = logger();
        let mut peer = PeerState::new(None);

        peer.handle_append_entries_result(&logger, PeerStateUpdate::Success {
            last_index_covered: Some(idx(4)),
        });
        peer.handle_append_entries_result(&logger, PeerStateUpdate::Success {
            last_index_covered: Some(idx(2)),
        });
        assert_eq!(peer.matched(), Some(idx(4)));
        assert_eq!(peer.next_and_previous_log_index(), (idx(5), Some(idx(4))));

        // Mismatch for a request that was built before the success.
        peer.handle_append_entries_result(&logger, PeerStateUpdate::PeerLogBehind {
            previous_log_entry: Some(idx(1)),
        });
        assert_eq!(peer.next_and_previous_log_index(), (idx(5), Some(idx(4))));

        // A mismatch for the current `next` still can't rewind below `matched + 1`.
        peer.handle_append_entries_result(&logger, PeerStateUpdate::PeerLogBehind {
            previous_log_entry: Some(idx(4)),
        });
        assert_eq!(peer.next_and_previous_log_index(), (idx(5), Some(idx(4))));
    }

    #[test]
    fn never_rewinds_below_start() {
        let logger = logger();
        let mut peer = PeerState::new(None);
        peer.handle_append_entries_result(&logger, PeerStateUpdate::PeerLogBehind { previous_log_entry: None });
        assert_eq!(peer.next_and_previous_log_index(), (idx(1), None));
    }

    #[test]
    fn missed_heartbeat_rounds_reset_on_majority() {
        let mut tracker = LeaderStateTracker::new(Term::new(1), HashMap::new());
        assert_eq!(tracker.record_heartbeat_round(false), 1);
        assert_eq!(tracker.record_heartbeat_round(false), 2);
        assert_eq!(tracker.record_heartbeat_round(true), 0);
        assert_eq!(tracker.record_heartbeat_round(false), 1);
    }
}
