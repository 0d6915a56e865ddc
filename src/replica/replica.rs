use crate::actor::{Callback, WeakActorClient};
use crate::commitlog::{Index, Log};
use crate::replica::election::{ElectionState, PeerStateUpdate};
use crate::replica::local_state::{PersistentLocalState, Term};
use crate::replica::peers::{ClusterTracker, ReplicaId};
use crate::replica::quorum::{self, FanOutBounds, Verdict};
use crate::replica::replica_api::{
    AppendEntriesError, AppendEntriesInput, AppendEntriesOutput, AppendEntriesReplyFromPeer,
    AppendEntriesReplyFromPeerDescriptor, AppendEntriesRoundResult, FollowerTimeoutTick, LeaderRedirectInfo,
    LeaderTimerTick, ReadLogEntry, ReadLogError, ReadLogInput, ReplicaFatalError, ReplicaStatus, RequestVoteError,
    RequestVoteInput, RequestVoteOutput, RequestVoteRoundResult, RoundPurpose, WriteToLogError, WriteToLogInput,
    WriteToLogOutput,
};
use crate::replica::write_ahead_log::{WriteAheadLog, WriteAheadLogEntry};
use crate::transport::PeerTransport;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::{cmp, io};
use tokio::time::Duration;

/// Knobs the replica needs at runtime. Validated by the caller.
#[derive(Debug, Clone)]
pub(crate) struct ReplicaOptions {
    pub(crate) leader_heartbeat_duration: Duration,
    pub(crate) follower_min_timeout: Duration,
    pub(crate) follower_max_timeout: Duration,
    pub(crate) vote_window: Duration,
    pub(crate) heartbeat_window: Duration,
    pub(crate) write_window: Duration,
    pub(crate) rpc_timeout: Duration,
    pub(crate) missed_heartbeat_rounds_before_step_down: u32,
    pub(crate) max_entries_per_request: usize,
}

/// A client write waiting for its entry to commit.
struct PendingWrite {
    term: Term,
    callback: Callback<WriteToLogOutput, WriteToLogError>,
}

/// Replica is the raft state machine of a single cluster member. Every method runs on the replica
/// actor, so nothing here needs synchronization. Anything that talks to peers is spawned as a
/// round task, and reports back to the actor with exactly one event.
pub(crate) struct Replica<L>
where
    L: Log<WriteAheadLogEntry>,
{
    logger: slog::Logger,
    my_replica_id: ReplicaId,
    cluster_tracker: ClusterTracker,
    local_state: Box<dyn PersistentLocalState>,
    election_state: ElectionState,
    write_ahead_log: WriteAheadLog<L>,
    transport: Arc<dyn PeerTransport>,
    actor_client: WeakActorClient,
    options: ReplicaOptions,
    // Leader only. Keyed by log index.
    pending_writes: BTreeMap<Index, PendingWrite>,
}

impl<L> Replica<L>
where
    L: Log<WriteAheadLogEntry>,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        logger: slog::Logger,
        cluster_tracker: ClusterTracker,
        local_state: Box<dyn PersistentLocalState>,
        election_state: ElectionState,
        write_ahead_log: WriteAheadLog<L>,
        transport: Arc<dyn PeerTransport>,
        actor_client: WeakActorClient,
        options: ReplicaOptions,
    ) -> Self {
        let my_replica_id = cluster_tracker.my_replica_id().clone();
        let mut replica = Replica {
            logger,
            my_replica_id,
            cluster_tracker,
            local_state,
            election_state,
            write_ahead_log,
            transport,
            actor_client,
            options,
            pending_writes: BTreeMap::new(),
        };

        // Re-publish whatever was committed before a restart.
        replica.write_ahead_log.apply_all_committed_entries();

        replica
    }

    // ------- Client writes --------

    /// The callback is answered right away on every path except a successful local append, where
    /// it's answered once the entry commits or its write round gives up.
    ///
    /// The only error is a failure to persist the entry locally, which is fatal to the replica.
    pub(crate) fn handle_write_to_log(
        &mut self,
        input: WriteToLogInput,
        callback: Callback<WriteToLogOutput, WriteToLogError>,
    ) -> Result<(), ReplicaFatalError> {
        // Leader check
        if !self.election_state.is_leader() {
            let error = match self.election_state.current_leader() {
                Some(leader) => WriteToLogError::LeaderRedirect(leader.clone()),
                None => WriteToLogError::NoLeader,
            };
            callback.send(Err(error));
            return Ok(());
        }

        // > If command received from client: append entry to local log,
        // > respond after entry applied to state machine (§5.3)
        let term = self.local_state.current_term();
        let new_entry = WriteAheadLogEntry::new(term, input.payload, input.source_tag);
        let appended_index = match self.write_ahead_log.append(new_entry) {
            Ok(index) => index,
            Err(e) => {
                callback.send(Err(WriteToLogError::LocalIoError(io::Error::new(
                    e.kind(),
                    e.to_string(),
                ))));
                return Err(ReplicaFatalError::LogAppend(e));
            }
        };
        slog::debug!(self.logger, "Appended client write at {:?} in term {:?}", appended_index, term);

        self.pending_writes.insert(appended_index, PendingWrite { term, callback });
        self.start_append_entries_round(RoundPurpose::Write(appended_index));

        Ok(())
    }

    fn resolve_committed_writes(&mut self) {
        let commit_index = match self.write_ahead_log.commit_index() {
            Some(ci) => ci,
            None => return,
        };

        let still_pending = self.pending_writes.split_off(&commit_index.plus(1));
        let committed = std::mem::replace(&mut self.pending_writes, still_pending);
        for (index, pending) in committed {
            pending.callback.send(Ok(WriteToLogOutput {
                term: pending.term,
                index,
            }));
        }
    }

    fn fail_pending_write(&mut self, index: Index, error: WriteToLogError) {
        if let Some(pending) = self.pending_writes.remove(&index) {
            pending.callback.send(Err(error));
        }
    }

    fn fail_all_pending_writes(&mut self) {
        for (_, pending) in std::mem::take(&mut self.pending_writes) {
            pending.callback.send(Err(WriteToLogError::LeadershipLost));
        }
    }

    // ------- Request vote: server side --------

    pub(crate) fn server_handle_request_vote(
        &mut self,
        input: RequestVoteInput,
    ) -> Result<RequestVoteOutput, RequestVoteError> {
        // Ensure candidate is known member.
        if !self.cluster_tracker.contains_member(&input.candidate_id) {
            slog::warn!(self.logger, "Not granting vote to non-member {:?}.", input.candidate_id);
            return Ok(self.request_vote_reply(false));
        }

        // 1. Reply false if term < currentTerm (§5.1)
        if input.candidate_term < self.local_state.current_term() {
            slog::info!(
                self.logger,
                "Not granting vote to {:?}. Candidate term {:?} is out of date.",
                input.candidate_id,
                input.candidate_term
            );
            return Ok(self.request_vote_reply(false));
        }

        // > If RPC request or response contains term T > currentTerm:
        // > set currentTerm = T, convert to follower (§5.1)
        let term_was_stale = self
            .local_state
            .observe_term(input.candidate_term)
            .map_err(RequestVoteError::ServerIoError)?;
        if term_was_stale {
            self.transition_to_follower(None);
            slog::info!(
                self.logger,
                "Observed increased term {:?} in RequestVote call. Election state: {:?}",
                input.candidate_term,
                self.election_state
            );
        }

        // 2. If votedFor is null or candidateId, and candidate’s log is at
        // least as up-to-date as receiver’s log, grant vote (§5.2, §5.4).
        if !self.is_candidate_log_gte_mine(input.candidate_last_log_entry) {
            slog::info!(self.logger, "Not granting vote to {:?}. Candidate log is out of date.", input.candidate_id);
            return Ok(self.request_vote_reply(false));
        }

        let vote_granted = self
            .local_state
            .try_grant_vote(input.candidate_term, &input.candidate_id)
            .map_err(RequestVoteError::ServerIoError)?;
        if !vote_granted {
            let (_, voted_for) = self.local_state.voted_for_current_term();
            slog::info!(self.logger, "Not granting vote to {:?}. We already voted for {:?}.", input.candidate_id, voted_for);
            return Ok(self.request_vote_reply(false));
        }

        // Granting a vote counts as hearing from a viable leader.
        slog::info!(self.logger, "Voting for {:?} in term {:?}.", input.candidate_id, input.candidate_term);
        self.election_state.reset_timeout_if_follower();
        Ok(self.request_vote_reply(true))
    }

    fn request_vote_reply(&self, vote_granted: bool) -> RequestVoteOutput {
        RequestVoteOutput {
            term: self.local_state.current_term(),
            vote_granted,
        }
    }

    fn is_candidate_log_gte_mine(&self, candidate_last_entry: Option<(Term, Index)>) -> bool {
        // > Raft determines which of two logs is more up-to-date
        // > by comparing the index and term of the last entries in the
        // > logs. If the logs have last entries with different terms, then
        // > the log with the later term is more up-to-date. If the logs
        // > end with the same term, then whichever log is longer is
        // > more up-to-date.
        match (self.write_ahead_log.latest_entry(), candidate_last_entry) {
            (None, None) => true,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (
                Some((my_last_entry_term, my_last_entry_index)),
                Some((candidate_last_entry_term, candidate_last_entry_index)),
            ) => {
                if candidate_last_entry_term != my_last_entry_term {
                    return candidate_last_entry_term > my_last_entry_term;
                }

                candidate_last_entry_index >= my_last_entry_index
            }
        }
    }

    // ------- Append entries: server side --------

    pub(crate) fn server_handle_append_entries(
        &mut self,
        input: AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, AppendEntriesError> {
        // Ensure leader is known member.
        let leader_info = match self.cluster_tracker.metadata(&input.leader_id) {
            Some(metadata) => LeaderRedirectInfo {
                replica_id: metadata.replica_id().clone(),
                rpc_address: metadata.rpc_address(),
            },
            None => {
                slog::warn!(self.logger, "Rejecting AppendEntries from non-member {:?}.", input.leader_id);
                return Ok(self.append_entries_reply(false));
            }
        };

        // 1. Reply false if term < currentTerm (§5.1)
        if input.leader_term < self.local_state.current_term() {
            slog::debug!(
                self.logger,
                "Rejecting AppendEntries from {:?}. Leader term {:?} is out of date.",
                input.leader_id,
                input.leader_term
            );
            return Ok(self.append_entries_reply(false));
        }

        // > If RPC request or response contains term T > currentTerm:
        // > set currentTerm = T, convert to follower (§5.1)
        //
        // > If AppendEntries RPC received from new leader: convert to
        // > follower
        let term_was_stale = self
            .local_state
            .observe_term(input.leader_term)
            .map_err(AppendEntriesError::ServerIoError)?;
        if term_was_stale {
            self.transition_to_follower(Some(leader_info));
            slog::info!(self.logger, "New leader {:?} for term {:?}.", input.leader_id, input.leader_term);
        } else if self.election_state.is_candidate() {
            self.transition_to_follower(Some(leader_info));
            slog::info!(self.logger, "Lost election to {:?} in term {:?}.", input.leader_id, input.leader_term);
        } else if self.election_state.is_leader() {
            slog::error!(
                self.logger,
                "Another leader {:?} claims our term {:?}. Rejecting its AppendEntries.",
                input.leader_id,
                input.leader_term
            );
            return Ok(self.append_entries_reply(false));
        } else {
            self.election_state.set_leader_if_unknown(&leader_info);
        }

        // Reset follower timeout.
        self.election_state.reset_timeout_if_follower();

        // 2. Reply false if [my] log doesn't contain an entry at [leader's]
        // prevLogIndex whose term matches [leader's] prevLogTerm (§5.3)
        if let Some((leader_prev_entry_term, leader_prev_entry_index)) = input.leader_previous_log_entry {
            let matches = match self.write_ahead_log.read(leader_prev_entry_index) {
                Ok(Some(my_previous_log_entry)) => my_previous_log_entry.term == leader_prev_entry_term,
                Ok(None) => false,
                Err(e) => return Err(AppendEntriesError::ServerIoError(e)),
            };
            if !matches {
                slog::debug!(
                    self.logger,
                    "Log mismatch at {:?}. Leader term there is {:?}.",
                    leader_prev_entry_index,
                    leader_prev_entry_term
                );
                return Ok(self.append_entries_reply(false));
            }
        }

        // 3. If [my] existing entry conflicts with [leader's new entries]
        // (same index but different terms), delete [my] existing entry and
        // all that follow it (§5.3)
        // 4. Append any new entries not already in the log
        let first_new_entry_index = match input.leader_previous_log_entry {
            None => Index::start_index(),
            Some((_, leader_prev_entry_index)) => leader_prev_entry_index.plus(1),
        };
        let num_new_entries = input.new_entries.len();
        let mut next_entry_index = first_new_entry_index;
        let mut truncated = false;
        for new_entry in input.new_entries {
            if !truncated {
                let opt_existing_entry = self
                    .write_ahead_log
                    .read(next_entry_index)
                    .map_err(AppendEntriesError::ServerIoError)?;

                if let Some(existing_entry) = opt_existing_entry {
                    if existing_entry.term == new_entry.term {
                        // 4. (no-op)
                        next_entry_index = next_entry_index.plus(1);
                        continue;
                    }

                    // 3. (delete). Fails if this would remove a committed entry.
                    slog::info!(self.logger, "Truncating conflicting entries from {:?}.", next_entry_index);
                    self.write_ahead_log
                        .truncate(next_entry_index)
                        .map_err(AppendEntriesError::ServerIoError)?;
                }
                // Once we're past the end of our log there's nothing left to compare against.
                truncated = true;
            }

            // 4. (append)
            let appended_index = self
                .write_ahead_log
                .append(new_entry)
                .map_err(AppendEntriesError::ServerIoError)?;
            if appended_index != next_entry_index {
                return Err(AppendEntriesError::ServerIoError(io::Error::new(
                    io::ErrorKind::Other,
                    format!(
                        "Appended log entry at {:?}, expected {:?}",
                        appended_index, next_entry_index
                    ),
                )));
            }

            next_entry_index = next_entry_index.plus(1);
        }

        // 5. If leaderCommit > commitIndex, set commitIndex =
        // min(leaderCommit, index of last new entry)
        let index_of_last_new_entry = first_new_entry_index.checked_minus(1).map_or_else(
            || Index::from_u64_opt(num_new_entries as u64),
            |prev| Some(prev.plus(num_new_entries as u64)),
        );
        if let (Some(leader_commit_index), Some(last_new)) = (input.leader_commit_index, index_of_last_new_entry) {
            self.write_ahead_log
                .ratchet_fwd_commit_index(cmp::min(leader_commit_index, last_new))
                .map_err(AppendEntriesError::ServerIoError)?;
        }

        // > If commitIndex > lastApplied: increment lastApplied, apply
        // > log[lastApplied] to state machine (§5.3)
        self.write_ahead_log.apply_all_committed_entries();

        Ok(self.append_entries_reply(true))
    }

    fn append_entries_reply(&self, success: bool) -> AppendEntriesOutput {
        AppendEntriesOutput {
            term: self.local_state.current_term(),
            success,
        }
    }

    // ------- Elections --------

    pub(crate) fn handle_follower_timeout(&mut self, tick: FollowerTimeoutTick) -> Result<(), ReplicaFatalError> {
        if !self.election_state.is_current_timeout(&tick) {
            slog::debug!(self.logger, "Ignoring stale election timeout {:?}", tick);
            return Ok(());
        }

        // Write-ahead log style: Vote for self on local state before transitioning to candidate.
        let new_term = self
            .local_state
            .increment_term_and_vote_for_self()
            .map_err(ReplicaFatalError::LocalState)?;
        self.election_state.transition_to_candidate();
        slog::info!(
            self.logger,
            "Election timeout. Starting election for term {:?}. Election state: {:?}",
            new_term,
            self.election_state,
        );

        self.start_request_vote_round(new_term);
        Ok(())
    }

    fn start_request_vote_round(&self, term: Term) {
        let candidate_last_log_entry = self.write_ahead_log.latest_entry();
        let calls: Vec<_> = self
            .cluster_tracker
            .peer_ids()
            .into_iter()
            .map(|peer_id| {
                let input = RequestVoteInput {
                    candidate_term: term,
                    candidate_id: self.my_replica_id.clone(),
                    candidate_last_log_entry,
                };
                let transport = self.transport.clone();
                let call_peer_id = peer_id.clone();
                let call = async move { transport.request_vote(&call_peer_id, input).await };
                (peer_id, call)
            })
            .collect();

        let bounds = FanOutBounds {
            rpc_timeout: self.options.rpc_timeout,
            window: self.options.vote_window,
            acks_needed: self.cluster_tracker.majority(),
            wait_for_all: false,
        };
        let logger = self.logger.clone();
        let actor_client = self.actor_client.clone();

        tokio::task::spawn(async move {
            let outcome = quorum::fan_out(calls, bounds, |peer_id, result| match result {
                Ok(reply) if reply.term > term => Verdict::HigherTerm(reply.term),
                Ok(reply) if reply.vote_granted => Verdict::Ack,
                Ok(_) => Verdict::NoAck,
                Err(e) => {
                    slog::debug!(logger, "No vote from {:?}: {}", peer_id, e);
                    Verdict::NoAck
                }
            })
            .await;

            let _ = actor_client
                .request_vote_round_complete(RequestVoteRoundResult {
                    term,
                    votes_received: outcome.acks,
                    higher_term: outcome.higher_term,
                })
                .await;
        });
    }

    pub(crate) fn handle_request_vote_round_complete(
        &mut self,
        result: RequestVoteRoundResult,
    ) -> Result<(), ReplicaFatalError> {
        if let Some(higher_term) = result.higher_term {
            if self
                .local_state
                .observe_term(higher_term)
                .map_err(ReplicaFatalError::LocalState)?
            {
                self.transition_to_follower(None);
                slog::info!(self.logger, "Election for term {:?} found higher term {:?}.", result.term, higher_term);
            }
            return Ok(());
        }

        let current_term = self.local_state.current_term();
        if current_term != result.term || !self.election_state.is_candidate() {
            slog::debug!(
                self.logger,
                "Discarding election result for term {:?}. Term: {:?}, election state: {:?}",
                result.term,
                current_term,
                self.election_state
            );
            return Ok(());
        }

        let majority = self.cluster_tracker.majority();
        slog::info!(
            self.logger,
            "Received {}/{} votes for term {:?}",
            result.votes_received,
            self.cluster_tracker.num_voting_replicas(),
            result.term,
        );

        if result.votes_received >= majority {
            self.election_state.transition_to_leader(
                result.term,
                self.cluster_tracker.peer_ids(),
                self.write_ahead_log.latest_entry().map(|(_, index)| index),
            );
            slog::info!(self.logger, "Won election for term {:?}.", result.term);
        } else {
            self.transition_to_follower(None);
            slog::info!(self.logger, "Lost election for term {:?}.", result.term);
        }

        Ok(())
    }

    // ------- Replication: leader side --------

    pub(crate) fn handle_leader_timer(&mut self, tick: LeaderTimerTick) {
        let leader_term = self.election_state.leader_state().map(|ls| ls.term());
        if leader_term != Some(tick.term) {
            slog::debug!(self.logger, "Ignoring leader timer for term {:?}. Leader term: {:?}", tick.term, leader_term);
            return;
        }

        self.start_append_entries_round(RoundPurpose::Heartbeat);
    }

    /// Sends one AppendEntries to every peer. Caught up peers get a pure heartbeat, the rest get
    /// the next batch of what they're missing.
    fn start_append_entries_round(&mut self, purpose: RoundPurpose) {
        let leader_state = match self.election_state.leader_state() {
            Some(ls) => ls,
            None => return,
        };
        let term = leader_state.term();
        let leader_commit_index = self.write_ahead_log.commit_index();

        let mut calls = Vec::with_capacity(self.cluster_tracker.num_voting_replicas());
        for (peer_id, peer_state) in leader_state.peers_iter() {
            let (next_index, opt_previous_index) = peer_state.next_and_previous_log_index();
            let request = opt_previous_index
                .map_or(Ok(None), |previous_index| {
                    self.write_ahead_log
                        .read(previous_index)
                        .map(|entry| entry.map(|e| Some((e.term, previous_index))))
                })
                .and_then(|previous_log_entry| match previous_log_entry {
                    Some(previous_log_entry) => Ok(previous_log_entry),
                    None if opt_previous_index.is_none() => Ok(None),
                    None => Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("Missing previous log entry {:?}", opt_previous_index),
                    )),
                })
                .and_then(|previous_log_entry| {
                    let new_entries = self
                        .write_ahead_log
                        .read_batch(next_index, self.options.max_entries_per_request)?;
                    Ok((previous_log_entry, new_entries))
                });

            let (leader_previous_log_entry, new_entries) = match request {
                Ok(request) => request,
                Err(e) => {
                    slog::error!(self.logger, "Failed to build AppendEntries for {:?}: {:?}", peer_id, e);
                    continue;
                }
            };

            let descriptor = AppendEntriesReplyFromPeerDescriptor {
                peer_id: peer_id.clone(),
                previous_log_entry_index: opt_previous_index,
                num_log_entries: new_entries.len(),
            };
            let input = AppendEntriesInput {
                leader_term: term,
                leader_id: self.my_replica_id.clone(),
                leader_previous_log_entry,
                leader_commit_index,
                new_entries,
            };
            let transport = self.transport.clone();
            let call_peer_id = peer_id.clone();
            calls.push((descriptor, async move {
                transport.append_entries(&call_peer_id, input).await
            }));
        }

        let window = match purpose {
            RoundPurpose::Heartbeat => self.options.heartbeat_window,
            RoundPurpose::Write(_) => self.options.write_window,
        };
        let bounds = FanOutBounds {
            rpc_timeout: self.options.rpc_timeout,
            window,
            acks_needed: self.cluster_tracker.majority(),
            // Heartbeat rounds are where every peer's progress gets recorded, slow peers included.
            // Write rounds return at majority and leave stragglers to the next heartbeat.
            wait_for_all: purpose == RoundPurpose::Heartbeat,
        };
        let actor_client = self.actor_client.clone();

        tokio::task::spawn(async move {
            let outcome = quorum::fan_out(calls, bounds, |descriptor, result| match (purpose, result) {
                (_, Ok(reply)) if reply.term > term => Verdict::HigherTerm(reply.term),
                // A same term reply acknowledges our leadership for this term, even when it reports a
                // log mismatch. Mismatches are repaired by rewinding `next`, they aren't lost contact.
                (RoundPurpose::Heartbeat, Ok(reply)) if reply.term == term => Verdict::Ack,
                (RoundPurpose::Write(index), Ok(reply))
                    if reply.success && descriptor.last_index_covered() >= Some(index) =>
                {
                    Verdict::Ack
                }
                _ => Verdict::NoAck,
            })
            .await;

            let replies = outcome
                .replies
                .into_iter()
                .map(|(descriptor, result)| AppendEntriesReplyFromPeer { descriptor, result })
                .collect();
            let _ = actor_client
                .append_entries_round_complete(AppendEntriesRoundResult {
                    term,
                    purpose,
                    acks: outcome.acks,
                    higher_term: outcome.higher_term,
                    replies,
                })
                .await;
        });
    }

    pub(crate) fn handle_append_entries_round_complete(
        &mut self,
        result: AppendEntriesRoundResult,
    ) -> Result<(), ReplicaFatalError> {
        let logger = self.logger.new(slog::o!("Term" => result.term.as_u64()));

        if let Some(higher_term) = result.higher_term {
            if self
                .local_state
                .observe_term(higher_term)
                .map_err(ReplicaFatalError::LocalState)?
            {
                self.transition_to_follower(None);
                slog::info!(logger, "Peer has higher term {:?}. Stepped down.", higher_term);
            }
            return Ok(());
        }

        let leader_state = match self.election_state.leader_state_mut() {
            Some(ls) if ls.term() == result.term => ls,
            _ => {
                slog::debug!(logger, "Discarding round result, no longer leader for this term.");
                return Ok(());
            }
        };

        // 1. Update peer log trackers
        for reply in result.replies {
            let update = match &reply.result {
                Ok(output) if output.success => PeerStateUpdate::Success {
                    last_index_covered: reply.descriptor.last_index_covered(),
                },
                Ok(_) => PeerStateUpdate::PeerLogBehind {
                    previous_log_entry: reply.descriptor.previous_log_entry_index,
                },
                Err(e) => {
                    slog::debug!(logger, "AppendEntries to {:?} failed: {}", reply.descriptor.peer_id, e);
                    PeerStateUpdate::OtherError
                }
            };

            match leader_state.peer_state_mut(&reply.descriptor.peer_id) {
                Some(peer_state) => peer_state.handle_append_entries_result(&logger, update),
                None => slog::warn!(logger, "Reply from unknown peer {:?}", reply.descriptor.peer_id),
            }
        }

        // 2. Check for majority replication and apply new commits.
        // > If there exists an N such that N > commitIndex, a majority
        // > of matchIndex[i] ≥ N, and log[N].term == currentTerm:
        // > set commitIndex = N (§5.3, §5.4).
        // See also:
        // > Figure 8: A time sequence showing why a leader cannot determine
        // > commitment using log entries from older terms.
        let peers_matched_indexes = leader_state.peers_matched_indexes();
        let tentative_new_commit_index = if peers_matched_indexes.is_empty() {
            // Single node cluster. We are the majority.
            self.write_ahead_log.latest_entry().map(|(_, index)| index)
        } else {
            Self::get_cluster_commit_index(peers_matched_indexes)
        };
        if let Some(tentative_new_commit_index) = tentative_new_commit_index {
            match self
                .write_ahead_log
                .ratchet_fwd_commit_index_if_valid(tentative_new_commit_index, result.term)
            {
                Ok(true) => slog::debug!(logger, "Commit index is now {:?}", tentative_new_commit_index),
                Ok(false) => {}
                Err(ioe) => slog::warn!(
                    logger,
                    "IO failure while confirming new commit index {:?}: {:?}",
                    tentative_new_commit_index,
                    ioe
                ),
            }
        }
        self.write_ahead_log.apply_all_committed_entries();
        self.resolve_committed_writes();

        // 3. Round specific bookkeeping.
        let majority = self.cluster_tracker.majority();
        match result.purpose {
            RoundPurpose::Heartbeat => {
                let reached_majority = result.acks >= majority;
                let missed_rounds = match self.election_state.leader_state_mut() {
                    Some(ls) => ls.record_heartbeat_round(reached_majority),
                    None => return Ok(()),
                };
                if !reached_majority {
                    slog::warn!(
                        logger,
                        "Heartbeat round reached {}/{} acks. Missed {} round(s) in a row.",
                        result.acks,
                        majority,
                        missed_rounds
                    );
                }

                if missed_rounds >= self.options.missed_heartbeat_rounds_before_step_down {
                    self.transition_to_follower(None);
                    slog::info!(logger, "Lost contact with majority. Stepped down.");
                }
            }
            RoundPurpose::Write(index) => {
                if !self.write_ahead_log.is_committed(index) {
                    slog::info!(logger, "Write at {:?} reached {}/{} acks.", index, result.acks, majority);
                    self.fail_pending_write(index, WriteToLogError::QuorumNotReached);
                }
            }
        }

        Ok(())
    }

    fn get_cluster_commit_index(mut peers_matched_indexes: Vec<Option<Index>>) -> Option<Index> {
        peers_matched_indexes.sort_by_key(|matched| match matched {
            None => 0u64,
            Some(m) => m.as_u64(),
        });

        // Overview of why algo is correct:
        // We are always at the tail of the array, because our log is same/longest.
        // 1. add "me"
        //let cluster_size = peers_matched_indexes.len() + 1;
        // 2. calculate majority
        //let majority = (cluster_size / 2) + 1;
        // 3. subtract "me"
        //let num_peers_to_achieve_majority = majority - 1;
        // 4. take `i`th index from the right
        //let quorum_idx = peers_matched_indexes.len() - num_peers_to_achieve_majority;

        // Or just use this simplified equation which is harder to understand at a glance why it
        // works. When in doubt, just read the unit tests.
        let quorum_idx = peers_matched_indexes.len() / 2;

        peers_matched_indexes.get(quorum_idx).copied().flatten()
    }

    // ------- Shared --------

    /// Every path out of leadership or candidacy goes through here, so pending writes can't
    /// outlive the leadership that accepted them.
    fn transition_to_follower(&mut self, new_leader: Option<LeaderRedirectInfo>) {
        if self.election_state.is_leader() {
            self.fail_all_pending_writes();
        }
        self.election_state.transition_to_follower(new_leader);
    }

    pub(crate) fn status(&self) -> ReplicaStatus {
        let (term, voted_for) = self.local_state.voted_for_current_term();
        ReplicaStatus {
            replica_id: self.my_replica_id.clone(),
            election_state: self.election_state.current_state(),
            term,
            voted_for: voted_for.map(|id| id.as_ref().clone()),
            commit_index: self.write_ahead_log.commit_index(),
            last_log_index: self.write_ahead_log.latest_entry().map(|(_, index)| index),
        }
    }

    pub(crate) fn read_log(&self, input: ReadLogInput) -> Result<Vec<ReadLogEntry>, ReadLogError> {
        let entries = self
            .write_ahead_log
            .entries_from(input.from_index)
            .map_err(ReadLogError::LocalIoError)?;

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(offset, entry)| {
                let index = input.from_index.plus(offset as u64);
                ReadLogEntry {
                    index,
                    entry,
                    committed: self.write_ahead_log.is_committed(index),
                }
            })
            .collect())
    }
}
