use crate::actor::{ActorClient, Event, ReplicaActor};
use crate::api::node::{RaftNode, RaftReplicaExit};
use crate::api::options::RaftOptionsValidated;
use crate::api::types::RaftMemberInfo;
use crate::commitlog::{FileLog, InMemoryLog, Log};
use crate::replica::{
    ClusterTracker, FileLocalState, InvalidCluster, PersistentLocalState, ReplicaId, ReplicaMetadata,
    VolatileLocalState, WriteAheadLogEntry,
};
use crate::server::{RpcServer, RpcServerShutdownHandle};
use crate::transport::{GrpcTransport, LocalNetwork, PeerTransport};
use crate::{replica, server, RaftCommitStream, RaftEventListener, RaftOptions, RaftReplicatedLog};
use std::convert::TryFrom;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

const ACTOR_QUEUE_SIZE: usize = 64;

pub struct RaftNodeConfig {
    pub my_replica_id: String,
    pub cluster_members: Vec<RaftMemberInfo>,
    pub log_storage: RaftLogStorage,
    pub info_logger: slog::Logger,
    pub options: RaftOptions,
}

#[derive(Clone, Debug)]
pub enum RaftLogStorage {
    /// Nothing survives a restart.
    InMemory,
    /// A directory this node owns. Created if missing, reloaded if it already holds a log.
    Directory(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum RaftNodeCreationError {
    #[error("Invalid cluster info: {0}")]
    InvalidClusterInfo(String),
    #[error("Illegal options for configuring node: {0}")]
    IllegalOptions(String),
    #[error("Log initialization failure")]
    LogInitialization(io::Error),
    // We will need to relax this later when adding membership changes.
    #[error("my replica ID not in cluster config")]
    MeNotInCluster,
    #[error("Failed to set up peer connections: {0}")]
    Transport(String),
}

/// Starts a member that talks to its peers over gRPC, and serves gRPC on its own `rpc_addr`.
/// Must be called from within a tokio runtime.
pub async fn try_create_raft_node(config: RaftNodeConfig) -> Result<RaftNode, RaftNodeCreationError> {
    let RaftNodeConfig {
        my_replica_id,
        cluster_members,
        log_storage,
        info_logger,
        options,
    } = config;
    let root_logger = info_logger.new(slog::o!("ReplicaId" => my_replica_id.clone()));

    let options = validate_options(options)?;
    let cluster_tracker = create_cluster_tracker(my_replica_id, cluster_members)?;
    let my_server_addr = my_rpc_addr(&cluster_tracker)?;

    let transport = GrpcTransport::new(root_logger.clone(), cluster_tracker.iter_peers())
        .map_err(|e| RaftNodeCreationError::Transport(e.to_string()))?;

    let (actor_client, actor_queue_rx) = ActorClient::new(ACTOR_QUEUE_SIZE);

    let (server_shutdown_handle, server_shutdown_signal) = server::shutdown_signal();
    let replica_raft_server = RpcServer::new(root_logger.clone(), actor_client.weak());
    tokio::spawn(replica_raft_server.run(my_server_addr, server_shutdown_signal));

    let parts = NodeParts {
        logger: root_logger,
        cluster_tracker,
        transport: Arc::new(transport),
        actor_client,
        actor_queue_rx,
        options,
        server_shutdown_handle: Some(server_shutdown_handle),
    };

    parts.start_with_storage(log_storage)
}

/// Starts a member that talks to its peers through an in-process `LocalNetwork`. No sockets are
/// opened. Must be called from within a tokio runtime.
pub async fn try_create_local_raft_node(
    config: RaftNodeConfig,
    network: &LocalNetwork,
) -> Result<RaftNode, RaftNodeCreationError> {
    let RaftNodeConfig {
        my_replica_id,
        cluster_members,
        log_storage,
        info_logger,
        options,
    } = config;
    let root_logger = info_logger.new(slog::o!("ReplicaId" => my_replica_id.clone()));

    let options = validate_options(options)?;
    let cluster_tracker = create_cluster_tracker(my_replica_id, cluster_members)?;
    let my_replica_id = cluster_tracker.my_replica_id().clone();

    let (actor_client, actor_queue_rx) = ActorClient::new(ACTOR_QUEUE_SIZE);
    network.register(my_replica_id.clone(), actor_client.weak());
    let transport = network.transport_for(my_replica_id);

    let parts = NodeParts {
        logger: root_logger,
        cluster_tracker,
        transport: Arc::new(transport),
        actor_client,
        actor_queue_rx,
        options,
        server_shutdown_handle: None,
    };

    parts.start_with_storage(log_storage)
}

// Everything that doesn't depend on the log type.
struct NodeParts {
    logger: slog::Logger,
    cluster_tracker: ClusterTracker,
    transport: Arc<dyn PeerTransport>,
    actor_client: ActorClient,
    actor_queue_rx: mpsc::Receiver<Event>,
    options: RaftOptionsValidated,
    server_shutdown_handle: Option<RpcServerShutdownHandle>,
}

impl NodeParts {
    // Term and vote are stored alongside the log, so they live exactly as long as it does.
    fn start_with_storage(self, log_storage: RaftLogStorage) -> Result<RaftNode, RaftNodeCreationError> {
        let my_replica_id = self.cluster_tracker.my_replica_id().clone();

        match log_storage {
            RaftLogStorage::InMemory => {
                let local_state = Box::new(VolatileLocalState::new(my_replica_id));
                self.start(create_in_memory_log()?, local_state)
            }
            RaftLogStorage::Directory(path) => {
                let local_state = Box::new(open_file_local_state(&path, my_replica_id)?);
                self.start(open_file_log(path)?, local_state)
            }
        }
    }

    fn start<L>(
        self,
        commit_log: L,
        local_state: Box<dyn PersistentLocalState>,
    ) -> Result<RaftNode, RaftNodeCreationError>
    where
        L: Log<WriteAheadLogEntry> + Send + 'static,
    {
        let (replica, replica_commit_stream, election_state_change_listener) = replica::create_replica(
            self.logger.clone(),
            self.cluster_tracker,
            commit_log,
            local_state,
            self.transport,
            self.actor_client.weak(),
            self.options.into(),
        )
        .map_err(RaftNodeCreationError::LogInitialization)?;

        let replica_actor = ReplicaActor::new(self.logger, self.actor_queue_rx, replica, self.server_shutdown_handle);
        let replica_task = tokio::spawn(replica_actor.run_event_loop());

        Ok(RaftNode {
            replicated_log: RaftReplicatedLog::new(self.actor_client),
            commit_stream: RaftCommitStream::new(replica_commit_stream),
            event_listener: RaftEventListener::new(election_state_change_listener),
            replica_exit: RaftReplicaExit::new(replica_task),
        })
    }
}

fn validate_options(options: RaftOptions) -> Result<RaftOptionsValidated, RaftNodeCreationError> {
    RaftOptionsValidated::try_from(options).map_err(|e| RaftNodeCreationError::IllegalOptions(e.to_string()))
}

fn create_cluster_tracker(
    my_replica_id: String,
    cluster_members: Vec<RaftMemberInfo>,
) -> Result<ClusterTracker, RaftNodeCreationError> {
    let cluster_members = cluster_members.into_iter().map(ReplicaMetadata::from).collect();

    ClusterTracker::create(ReplicaId::new(my_replica_id), cluster_members).map_err(|e| match e {
        InvalidCluster::MeNotInCluster(_) => RaftNodeCreationError::MeNotInCluster,
        e => RaftNodeCreationError::InvalidClusterInfo(e.to_string()),
    })
}

fn my_rpc_addr(cluster_tracker: &ClusterTracker) -> Result<SocketAddr, RaftNodeCreationError> {
    cluster_tracker
        .metadata(cluster_tracker.my_replica_id())
        .map(|metadata| metadata.rpc_address())
        .ok_or(RaftNodeCreationError::MeNotInCluster)
}

fn create_in_memory_log() -> Result<InMemoryLog<WriteAheadLogEntry>, RaftNodeCreationError> {
    InMemoryLog::create().map_err(RaftNodeCreationError::LogInitialization)
}

fn open_file_log(path: PathBuf) -> Result<FileLog<WriteAheadLogEntry>, RaftNodeCreationError> {
    FileLog::open(path).map_err(RaftNodeCreationError::LogInitialization)
}

fn open_file_local_state(path: &Path, my_replica_id: ReplicaId) -> Result<FileLocalState, RaftNodeCreationError> {
    FileLocalState::open(path, my_replica_id).map_err(RaftNodeCreationError::LogInitialization)
}
