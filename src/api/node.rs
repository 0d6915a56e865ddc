use crate::api::commit_stream::RaftCommitStream;
use crate::api::event_bus::RaftEventListener;
use crate::api::replicated_log::RaftReplicatedLog;
use crate::replica::ReplicaFatalError;
use std::io;
use tokio::task::JoinHandle;

/// RaftNode is everything the application gets for one cluster member. The replica keeps running
/// until every clone of `replicated_log` is dropped, or until it hits a fatal error.
pub struct RaftNode {
    pub replicated_log: RaftReplicatedLog,
    pub commit_stream: RaftCommitStream,
    pub event_listener: RaftEventListener,
    pub replica_exit: RaftReplicaExit,
}

/// Resolves when the replica's background task ends.
pub struct RaftReplicaExit {
    replica_task: JoinHandle<Result<(), ReplicaFatalError>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RaftReplicaError {
    #[error("Replica stopped after failing to persist a write: {0}")]
    LogAppend(io::Error),
    #[error("Replica stopped after failing to persist its term or vote: {0}")]
    LocalState(io::Error),
    #[error("Replica task failed: {0}")]
    TaskFailed(String),
}

impl RaftReplicaExit {
    pub(crate) fn new(replica_task: JoinHandle<Result<(), ReplicaFatalError>>) -> Self {
        RaftReplicaExit { replica_task }
    }

    /// Ok if the replica shut down because the application let go of it.
    pub async fn wait(self) -> Result<(), RaftReplicaError> {
        match self.replica_task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(ReplicaFatalError::LogAppend(e))) => Err(RaftReplicaError::LogAppend(e)),
            Ok(Err(ReplicaFatalError::LocalState(e))) => Err(RaftReplicaError::LocalState(e)),
            Err(join_error) => Err(RaftReplicaError::TaskFailed(join_error.to_string())),
        }
    }
}
