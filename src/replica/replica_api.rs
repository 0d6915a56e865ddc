use crate::actor::ActorExited;
use crate::commitlog::Index;
use crate::replica::election::ElectionStateSnapshot;
use crate::replica::local_state::Term;
use crate::replica::peers::ReplicaId;
use crate::replica::write_ahead_log::WriteAheadLogEntry;
use crate::transport::TransportError;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;

#[derive(Debug)]
pub(crate) struct WriteToLogInput {
    pub(crate) payload: Bytes,
    pub(crate) source_tag: String,
}

#[derive(Debug)]
pub(crate) struct WriteToLogOutput {
    pub(crate) term: Term,
    // TODO:2.5 Index is type from commitlog crate. Bad abstraction. Fix it.
    pub(crate) index: Index,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum WriteToLogError {
    #[error("I'm not leader")]
    LeaderRedirect(LeaderRedirectInfo),

    // Can be retried with exponential backoff with recommended initial delay of 200ms. Likely an
    // election is in progress.
    #[error("Cluster is in a tough shape. No one is leader.")]
    NoLeader,

    // The entry stays in the leader's log uncommitted. A later heartbeat may still commit it.
    #[error("Entry was not acknowledged by a majority before the write deadline")]
    QuorumNotReached,

    #[error("Lost leadership before the entry was committed")]
    LeadershipLost,

    #[error("Failed to persist log")]
    LocalIoError(io::Error),

    #[error("Replica actor is dead RIP")]
    ActorExited,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LeaderRedirectInfo {
    pub(crate) replica_id: ReplicaId,
    pub(crate) rpc_address: SocketAddr,
}

#[derive(Debug, Clone)]
pub(crate) struct RequestVoteInput {
    pub(crate) candidate_term: Term,
    pub(crate) candidate_id: ReplicaId,
    // TODO:2.5 Index is type from commitlog crate. Bad abstraction. Fix it.
    pub(crate) candidate_last_log_entry: Option<(Term, Index)>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RequestVoteOutput {
    pub(crate) term: Term,
    pub(crate) vote_granted: bool,
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum RequestVoteError {
    #[error("We (server) failed to persist term or vote: {0:?}")]
    ServerIoError(io::Error),
    #[error("We (server) are unavailable because actor is dead RIP")]
    ActorExited,
}

#[derive(Debug, Clone)]
pub(crate) struct AppendEntriesInput {
    pub(crate) leader_term: Term,
    pub(crate) leader_id: ReplicaId,
    // "Previous log entry" is the log entry immediately preceding the new ones in AppendEntriesInput.
    pub(crate) leader_previous_log_entry: Option<(Term, Index)>,
    pub(crate) leader_commit_index: Option<Index>,
    pub(crate) new_entries: Vec<WriteAheadLogEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AppendEntriesOutput {
    pub(crate) term: Term,
    pub(crate) success: bool,
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum AppendEntriesError {
    #[error("We (server) had an IO failure: {0:?}")]
    ServerIoError(io::Error),
    #[error("We (server) are unavailable because actor is dead RIP")]
    ActorExited,
}

#[derive(Debug, Clone)]
pub(crate) struct ReplicaStatus {
    pub(crate) replica_id: ReplicaId,
    pub(crate) election_state: ElectionStateSnapshot,
    pub(crate) term: Term,
    pub(crate) voted_for: Option<ReplicaId>,
    pub(crate) commit_index: Option<Index>,
    pub(crate) last_log_index: Option<Index>,
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum StatusError {
    #[error("Replica actor is dead RIP")]
    ActorExited,
}

#[derive(Debug)]
pub(crate) struct ReadLogInput {
    pub(crate) from_index: Index,
}

#[derive(Debug)]
pub(crate) struct ReadLogEntry {
    pub(crate) index: Index,
    pub(crate) entry: WriteAheadLogEntry,
    pub(crate) committed: bool,
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum ReadLogError {
    #[error("Failed to read log: {0:?}")]
    LocalIoError(io::Error),
    #[error("Replica actor is dead RIP")]
    ActorExited,
}

/// Errors that stop the replica. The node has to be restarted to recover.
#[derive(thiserror::Error, Debug)]
pub(crate) enum ReplicaFatalError {
    #[error("Leader failed to append a client write to its log: {0}")]
    LogAppend(io::Error),
    #[error("Failed to persist term or vote: {0}")]
    LocalState(io::Error),
}

/// Outcome of one election round, reported back to the actor by the round task.
#[derive(Debug)]
pub(crate) struct RequestVoteRoundResult {
    pub(crate) term: Term,
    // Includes our own vote.
    pub(crate) votes_received: usize,
    pub(crate) higher_term: Option<Term>,
}

/// Why a replication round was started. Write rounds carry the index they are trying to commit.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum RoundPurpose {
    Heartbeat,
    Write(Index),
}

/// Outcome of one AppendEntries fan-out, reported back to the actor by the round task.
#[derive(Debug)]
pub(crate) struct AppendEntriesRoundResult {
    pub(crate) term: Term,
    pub(crate) purpose: RoundPurpose,
    // Includes ourselves.
    pub(crate) acks: usize,
    pub(crate) higher_term: Option<Term>,
    pub(crate) replies: Vec<AppendEntriesReplyFromPeer>,
}

#[derive(Debug)]
pub(crate) struct AppendEntriesReplyFromPeer {
    pub(crate) descriptor: AppendEntriesReplyFromPeerDescriptor,
    pub(crate) result: Result<AppendEntriesOutput, TransportError>,
}

// This is basically info about the original request
#[derive(Debug, Clone)]
pub(crate) struct AppendEntriesReplyFromPeerDescriptor {
    pub(crate) peer_id: ReplicaId,
    pub(crate) previous_log_entry_index: Option<Index>,
    pub(crate) num_log_entries: usize,
}

impl AppendEntriesReplyFromPeerDescriptor {
    /// Highest index the peer holds if it accepted the request.
    pub(crate) fn last_index_covered(&self) -> Option<Index> {
        match (self.previous_log_entry_index, self.num_log_entries) {
            (prev, 0) => prev,
            (None, n) => Some(Index::new_usize(n)),
            (Some(prev), n) => Some(prev.plus(n as u64)),
        }
    }
}

/// LeaderTimerTick contains info for a single tick of a leader's heartbeat timer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LeaderTimerTick {
    pub(crate) term: Term,
}

/// FollowerTimeoutTick identifies which timer fired, and which reset of that timer it fired for.
/// A tick from a replaced timer, or from before the latest reset, is stale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FollowerTimeoutTick {
    pub(crate) timer_id: u64,
    pub(crate) generation: u64,
}

// ------- Conversions --------

impl From<ActorExited> for WriteToLogError {
    fn from(_: ActorExited) -> Self {
        WriteToLogError::ActorExited
    }
}

impl From<ActorExited> for RequestVoteError {
    fn from(_: ActorExited) -> Self {
        RequestVoteError::ActorExited
    }
}

impl From<ActorExited> for AppendEntriesError {
    fn from(_: ActorExited) -> Self {
        AppendEntriesError::ActorExited
    }
}

impl From<ActorExited> for StatusError {
    fn from(_: ActorExited) -> Self {
        StatusError::ActorExited
    }
}

impl From<ActorExited> for ReadLogError {
    fn from(_: ActorExited) -> Self {
        ReadLogError::ActorExited
    }
}
