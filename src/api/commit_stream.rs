use crate::api::types::RaftEntryId;
use crate::replica;
use bytes::Bytes;

/// Committed entries, in log order, as this replica learns about them. Leader and followers
/// publish the same sequence.
pub struct RaftCommitStream {
    replica_commit_stream: replica::CommitStream,
}

#[derive(Debug)]
pub struct RaftCommittedEntry {
    pub entry_id: RaftEntryId,
    pub payload: Bytes,
    pub source_tag: String,
}

impl RaftCommitStream {
    pub(crate) fn new(replica_commit_stream: replica::CommitStream) -> Self {
        RaftCommitStream { replica_commit_stream }
    }

    /// next returns the next committed entry to be applied to your application's state machine.
    /// None once the replica has exited and every published entry was consumed.
    pub async fn next(&mut self) -> Option<RaftCommittedEntry> {
        self.replica_commit_stream.recv().await.map(RaftCommittedEntry::from)
    }
}

// ------- Conversions --------

impl From<replica::CommittedEntry> for RaftCommittedEntry {
    fn from(committed_entry: replica::CommittedEntry) -> Self {
        RaftCommittedEntry {
            entry_id: RaftEntryId {
                term: committed_entry.term,
                entry_index: committed_entry.index,
            },
            payload: committed_entry.payload,
            source_tag: committed_entry.source_tag,
        }
    }
}
