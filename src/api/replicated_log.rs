use crate::actor::ActorClient;
use crate::api::event_bus::RaftElectionState;
use crate::api::types::{RaftEntryId, RaftLeaderInfo};
use crate::commitlog::Index;
use crate::replica;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io;

/// RaftReplicatedLog is the replicated log for external application to append to.
#[derive(Clone)]
pub struct RaftReplicatedLog {
    actor_client: ActorClient,
}

impl RaftReplicatedLog {
    pub(crate) fn new(actor_client: ActorClient) -> Self {
        RaftReplicatedLog { actor_client }
    }

    /// Returns once the entry is committed, or once it's clear this write won't be. A failed
    /// write may still show up in the commit stream later.
    pub async fn write(&self, input: WriteInput) -> Result<WriteOutput, WriteError> {
        let replica_input = replica::WriteToLogInput {
            payload: input.payload,
            source_tag: input.source_tag,
        };

        self.actor_client
            .write_to_log(replica_input)
            .await
            .map(WriteOutput::from)
            .map_err(WriteError::from)
    }

    pub async fn status(&self) -> Result<RaftStatus, ReplicaExited> {
        self.actor_client
            .status()
            .await
            .map(RaftStatus::from)
            .map_err(|_| ReplicaExited)
    }

    /// Every local entry from `from_index` on, committed or not. Index 0 reads from the start.
    pub async fn read_entries(&self, from_index: u64) -> Result<Vec<RaftLogEntry>, ReadError> {
        let replica_input = replica::ReadLogInput {
            from_index: Index::from_u64_opt(from_index).unwrap_or_else(Index::start_index),
        };

        let entries = self.actor_client.read_log(replica_input).await.map_err(|e| match e {
            replica::ReadLogError::LocalIoError(e) => ReadError::LocalIoError(e),
            replica::ReadLogError::ActorExited => ReadError::ReplicaExited,
        })?;

        Ok(entries.into_iter().map(RaftLogEntry::from).collect())
    }
}

#[derive(Debug)]
pub struct WriteInput {
    pub payload: Bytes,
    /// Free form label of who produced the entry.
    pub source_tag: String,
}

#[derive(Debug)]
pub struct WriteOutput {
    pub entry_id: RaftEntryId,
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("I'm not leader")]
    LeaderRedirect(RaftLeaderInfo),

    // Can be retried with exponential backoff with recommended initial delay of 200ms. Likely an
    // election is in progress.
    #[error("Cluster is in a tough shape. No one is leader.")]
    NoLeader,

    #[error("Entry was not acknowledged by a majority in time")]
    QuorumNotReached,

    #[error("Leader stepped down before the entry was committed")]
    LeadershipLost,

    #[error("Failed to persist log")]
    LocalIoError(io::Error),

    // Replica logic runs on a background task. This error is returned if the task has exited.
    #[error("Replica task has exited")]
    ReplicaExited,
}

#[derive(Debug, Copy, Clone, thiserror::Error)]
#[error("Replica task has exited")]
pub struct ReplicaExited;

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Failed to read log")]
    LocalIoError(io::Error),
    #[error("Replica task has exited")]
    ReplicaExited,
}

/// Point in time view of the local replica.
#[derive(Clone, Debug)]
pub struct RaftStatus {
    pub replica_id: String,
    pub election_state: RaftElectionState,
    pub term: u64,
    pub voted_for: Option<String>,
    pub commit_index: Option<u64>,
    pub last_log_index: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct RaftLogEntry {
    pub entry_id: RaftEntryId,
    pub payload: Bytes,
    pub source_tag: String,
    pub created_at: DateTime<Utc>,
    pub committed: bool,
}

// ------- Conversions --------

impl From<replica::WriteToLogOutput> for WriteOutput {
    fn from(internal_output: replica::WriteToLogOutput) -> Self {
        WriteOutput {
            entry_id: RaftEntryId {
                term: internal_output.term,
                entry_index: internal_output.index,
            },
        }
    }
}

impl From<replica::WriteToLogError> for WriteError {
    fn from(internal_error: replica::WriteToLogError) -> Self {
        match internal_error {
            replica::WriteToLogError::LeaderRedirect(leader_info) => {
                WriteError::LeaderRedirect(RaftLeaderInfo::from(leader_info))
            }
            replica::WriteToLogError::NoLeader => WriteError::NoLeader,
            replica::WriteToLogError::QuorumNotReached => WriteError::QuorumNotReached,
            replica::WriteToLogError::LeadershipLost => WriteError::LeadershipLost,
            replica::WriteToLogError::LocalIoError(e) => WriteError::LocalIoError(e),
            replica::WriteToLogError::ActorExited => WriteError::ReplicaExited,
        }
    }
}

impl From<replica::ReplicaStatus> for RaftStatus {
    fn from(status: replica::ReplicaStatus) -> Self {
        RaftStatus {
            replica_id: status.replica_id.into_inner(),
            election_state: RaftElectionState::from(status.election_state),
            term: status.term.as_u64(),
            voted_for: status.voted_for.map(|id| id.into_inner()),
            commit_index: status.commit_index.map(|i| i.as_u64()),
            last_log_index: status.last_log_index.map(|i| i.as_u64()),
        }
    }
}

impl From<replica::ReadLogEntry> for RaftLogEntry {
    fn from(read_entry: replica::ReadLogEntry) -> Self {
        RaftLogEntry {
            entry_id: RaftEntryId {
                term: read_entry.entry.term,
                entry_index: read_entry.index,
            },
            payload: read_entry.entry.payload,
            source_tag: read_entry.entry.source_tag,
            created_at: read_entry.entry.created_at,
            committed: read_entry.committed,
        }
    }
}
