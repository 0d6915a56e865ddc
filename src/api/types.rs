use crate::commitlog::Index;
use crate::replica;
use crate::replica::Term;
use std::net::SocketAddr;

/// Identifies a log entry cluster-wide. Two entries with the same id hold the same payload on
/// every replica that has them.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RaftEntryId {
    pub(crate) term: Term,
    pub(crate) entry_index: Index,
}

impl RaftEntryId {
    pub fn term(&self) -> u64 {
        self.term.as_u64()
    }

    /// 1-based position in the log.
    pub fn index(&self) -> u64 {
        self.entry_index.as_u64()
    }
}

#[derive(Clone, Debug)]
pub struct RaftMemberInfo {
    pub replica_id: String,
    // Peers and clients reach this member's gRPC server here.
    pub rpc_addr: SocketAddr,
}

impl From<RaftMemberInfo> for replica::ReplicaMetadata {
    fn from(member_info: RaftMemberInfo) -> Self {
        Self::new(replica::ReplicaId::new(member_info.replica_id), member_info.rpc_addr)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RaftLeaderInfo {
    pub replica_id: String,
    pub rpc_addr: SocketAddr,
}

impl From<replica::LeaderRedirectInfo> for RaftLeaderInfo {
    fn from(internal_leader: replica::LeaderRedirectInfo) -> Self {
        Self {
            replica_id: internal_leader.replica_id.into_inner(),
            rpc_addr: internal_leader.rpc_address,
        }
    }
}
