use crate::actor::Event;
use crate::commitlog::Log;
use crate::replica::{Replica, ReplicaFatalError, WriteAheadLogEntry};
use crate::server::RpcServerShutdownHandle;
use tokio::sync::mpsc;

/// ReplicaActor is replica logic in actor model.
pub(crate) struct ReplicaActor<L>
where
    L: Log<WriteAheadLogEntry>,
{
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    replica: Replica<L>,
    // Dropping this stops the RPC server, if any.
    _server_shutdown_handle: Option<RpcServerShutdownHandle>,
}

impl<L> ReplicaActor<L>
where
    L: Log<WriteAheadLogEntry>,
{
    pub(crate) fn new(
        logger: slog::Logger,
        receiver: mpsc::Receiver<Event>,
        replica: Replica<L>,
        server_shutdown_handle: Option<RpcServerShutdownHandle>,
    ) -> Self {
        ReplicaActor {
            logger,
            receiver,
            replica,
            _server_shutdown_handle: server_shutdown_handle,
        }
    }

    /// Runs until every strong ActorClient is dropped, or until the replica hits a fatal error.
    pub(crate) async fn run_event_loop(mut self) -> Result<(), ReplicaFatalError> {
        while let Some(event) = self.receiver.recv().await {
            if let Err(e) = self.handle_event(event) {
                slog::crit!(self.logger, "Replica stopping: {}", e);
                return Err(e);
            }
        }

        slog::info!(self.logger, "Replica event loop exited. All clients are gone.");
        Ok(())
    }

    // This must NOT be async. Any long running work must be spawned on another task
    // and come back as an event to this actor.
    fn handle_event(&mut self, event: Event) -> Result<(), ReplicaFatalError> {
        match event {
            Event::WriteToLog(input, callback) => {
                self.replica.handle_write_to_log(input, callback)?;
            }
            Event::RequestVote(input, callback) => {
                callback.send(self.replica.server_handle_request_vote(input));
            }
            Event::AppendEntries(input, callback) => {
                callback.send(self.replica.server_handle_append_entries(input));
            }
            Event::Status(callback) => {
                callback.send(Ok(self.replica.status()));
            }
            Event::ReadLog(input, callback) => {
                callback.send(self.replica.read_log(input));
            }
            Event::RequestVoteRoundComplete(result) => {
                self.replica.handle_request_vote_round_complete(result)?;
            }
            Event::AppendEntriesRoundComplete(result) => {
                self.replica.handle_append_entries_round_complete(result)?;
            }
            Event::LeaderTimer(tick) => {
                self.replica.handle_leader_timer(tick);
            }
            Event::FollowerTimeout(tick) => {
                self.replica.handle_follower_timeout(tick)?;
            }
        }

        Ok(())
    }
}
