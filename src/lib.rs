mod actor;
mod api;
mod commitlog;
mod replica;
mod server;
mod transport;
mod grpc {
    include!("../generated/raft.rs");
}

pub use api::try_create_local_raft_node;
pub use api::try_create_raft_node;
pub use api::ClusterClientError;
pub use api::RaftClusterClient;
pub use api::RaftCommitStream;
pub use api::RaftCommittedEntry;
pub use api::RaftElectionState;
pub use api::RaftEntryId;
pub use api::RaftEvent;
pub use api::RaftEventListener;
pub use api::RaftLeaderInfo;
pub use api::RaftLogEntry;
pub use api::RaftLogStorage;
pub use api::RaftMemberInfo;
pub use api::RaftNode;
pub use api::RaftNodeConfig;
pub use api::RaftNodeCreationError;
pub use api::RaftOptions;
pub use api::RaftRemoteStatus;
pub use api::RaftReplicaError;
pub use api::RaftReplicaExit;
pub use api::RaftReplicatedLog;
pub use api::RaftStatus;
pub use api::ReadError;
pub use api::ReplicaExited;
pub use api::WriteError;
pub use api::WriteInput;
pub use api::WriteOutput;
pub use transport::LocalNetwork;

// Learning 1: `create::{root_mod}` should not have any code. Just `mod` and `pub use` statements.
// Learning 2: All `mod` statements, anywhere, should not be `pub`. Only export `pub` via individual
//             use statements.
