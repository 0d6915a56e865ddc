//! This mod is meant to hold most of the code for the library's client-facing API.
mod cluster_client;
mod commit_stream;
mod event_bus;
mod node;
mod options;
mod replicated_log;
mod types;
mod wiring;

pub use cluster_client::ClusterClientError;
pub use cluster_client::RaftClusterClient;
pub use cluster_client::RaftRemoteStatus;
pub use commit_stream::RaftCommitStream;
pub use commit_stream::RaftCommittedEntry;
pub use event_bus::RaftElectionState;
pub use event_bus::RaftEvent;
pub use event_bus::RaftEventListener;
pub use node::RaftNode;
pub use node::RaftReplicaError;
pub use node::RaftReplicaExit;
pub use options::RaftOptions;
pub use replicated_log::RaftLogEntry;
pub use replicated_log::RaftReplicatedLog;
pub use replicated_log::RaftStatus;
pub use replicated_log::ReadError;
pub use replicated_log::ReplicaExited;
pub use replicated_log::WriteError;
pub use replicated_log::WriteInput;
pub use replicated_log::WriteOutput;
pub use types::RaftEntryId;
pub use types::RaftLeaderInfo;
pub use types::RaftMemberInfo;
pub use wiring::try_create_local_raft_node;
pub use wiring::try_create_raft_node;
pub use wiring::RaftLogStorage;
pub use wiring::RaftNodeConfig;
pub use wiring::RaftNodeCreationError;
