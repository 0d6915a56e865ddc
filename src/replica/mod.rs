mod election;
mod local_state;
mod peers;
mod quorum;
mod replica;
mod replica_api;
mod replica_wiring;
mod write_ahead_log;

pub(crate) use election::ElectionStateChangeListener;
pub(crate) use election::ElectionStateSnapshot;
pub(crate) use local_state::FileLocalState;
pub(crate) use local_state::PersistentLocalState;
pub(crate) use local_state::Term;
pub(crate) use local_state::VolatileLocalState;
pub(crate) use peers::ClusterTracker;
pub(crate) use peers::InvalidCluster;
pub(crate) use peers::ReplicaId;
pub(crate) use peers::ReplicaMetadata;
pub(crate) use replica::Replica;
pub(crate) use replica::ReplicaOptions;
pub(crate) use replica_api::*;
pub(crate) use replica_wiring::create_replica;
pub(crate) use write_ahead_log::timestamp_from_millis;
pub(crate) use write_ahead_log::CommitStream;
pub(crate) use write_ahead_log::CommittedEntry;
pub(crate) use write_ahead_log::WriteAheadLogEntry;
