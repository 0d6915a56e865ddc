use crate::actor::WeakActorClient;
use crate::commitlog::Log;
use crate::replica::election::{ElectionConfig, ElectionState};
use crate::replica::{
    write_ahead_log, ClusterTracker, CommitStream, ElectionStateChangeListener, PersistentLocalState, Replica,
    ReplicaOptions, WriteAheadLogEntry,
};
use crate::transport::PeerTransport;
use std::io;
use std::sync::Arc;

/// Must be called from within a tokio runtime. The initial follower timer starts right away.
pub(crate) fn create_replica<L>(
    logger: slog::Logger,
    cluster_tracker: ClusterTracker,
    commit_log: L,
    local_state: Box<dyn PersistentLocalState>,
    transport: Arc<dyn PeerTransport>,
    actor_client: WeakActorClient,
    options: ReplicaOptions,
) -> Result<(Replica<L>, CommitStream, ElectionStateChangeListener), io::Error>
where
    L: Log<WriteAheadLogEntry> + 'static,
{
    let (write_ahead_log, commit_stream) = write_ahead_log::wired(logger.clone(), commit_log)?;

    let (election_state, election_state_change_listener) = ElectionState::new_follower(
        ElectionConfig {
            leader_heartbeat_duration: options.leader_heartbeat_duration,
            follower_min_timeout: options.follower_min_timeout,
            follower_max_timeout: options.follower_max_timeout,
        },
        actor_client.clone(),
    );

    let replica = Replica::new(
        logger,
        cluster_tracker,
        local_state,
        election_state,
        write_ahead_log,
        transport,
        actor_client,
        options,
    );

    Ok((replica, commit_stream, election_state_change_listener))
}
