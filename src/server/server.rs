use crate::actor::WeakActorClient;
use crate::grpc::grpc_raft_server::{GrpcRaft, GrpcRaftServer};
use crate::grpc::{
    ProtoAppendEntriesReply, ProtoAppendEntriesReq, ProtoClientWriteOutcome, ProtoClientWriteReply,
    ProtoClientWriteReq, ProtoRequestVoteReply, ProtoRequestVoteReq, ProtoStatusReply, ProtoStatusReq,
};
use crate::replica::{
    AppendEntriesError, ElectionStateSnapshot, ReplicaStatus, RequestVoteError, StatusError, WriteToLogError,
    WriteToLogInput, WriteToLogOutput,
};
use crate::server::RpcServerShutdownSignal;
use crate::transport::{
    append_entries_from_proto, append_entries_reply_to_proto, request_vote_from_proto, request_vote_reply_to_proto,
    MalformedMessage,
};
use bytes::Bytes;
use std::net::SocketAddr;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// RpcServer is the type that implements the Raft gRPC interface. It only translates between
/// protos and replica inputs; every decision is made by the replica actor.
pub(crate) struct RpcServer {
    logger: slog::Logger,
    local_replica: WeakActorClient,
}

impl RpcServer {
    pub(crate) fn new(logger: slog::Logger, local_replica: WeakActorClient) -> Self {
        RpcServer { logger, local_replica }
    }

    pub(crate) async fn run(
        self,
        socket_addr: SocketAddr,
        shutdown_signal: RpcServerShutdownSignal,
    ) -> Result<(), tonic::transport::Error> {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(GrpcRaftServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal.wait())
            .await;

        match &result {
            Ok(()) => slog::info!(logger, "Server has shut down."),
            Err(e) => slog::error!(logger, "Server exited with error: {:?}", e),
        }

        result
    }

    async fn handle_request_vote(&self, rpc_request: ProtoRequestVoteReq) -> Result<ProtoRequestVoteReply, Status> {
        let app_input = request_vote_from_proto(rpc_request).map_err(invalid_argument)?;
        match self.local_replica.request_vote(app_input).await {
            Ok(output) => Ok(request_vote_reply_to_proto(output)),
            Err(RequestVoteError::ServerIoError(e)) => {
                slog::warn!(self.logger, "Local IO failure while handling RequestVote: {:?}", e);
                Err(Status::internal(format!("Local IO failure: {}", e)))
            }
            Err(RequestVoteError::ActorExited) => Err(replica_exited()),
        }
    }

    async fn handle_append_entries(
        &self,
        rpc_request: ProtoAppendEntriesReq,
    ) -> Result<ProtoAppendEntriesReply, Status> {
        let app_input = append_entries_from_proto(rpc_request).map_err(invalid_argument)?;
        match self.local_replica.append_entries(app_input).await {
            Ok(output) => Ok(append_entries_reply_to_proto(output)),
            Err(AppendEntriesError::ServerIoError(e)) => {
                slog::warn!(self.logger, "Local IO failure while applying AppendEntries: {:?}", e);
                Err(Status::internal(format!("Local IO failure: {}", e)))
            }
            Err(AppendEntriesError::ActorExited) => Err(replica_exited()),
        }
    }

    async fn handle_client_write(&self, rpc_request: ProtoClientWriteReq) -> Result<ProtoClientWriteReply, Status> {
        let app_input = WriteToLogInput {
            payload: Bytes::from(rpc_request.payload),
            source_tag: rpc_request.source_tag,
        };
        let app_result = self.local_replica.write_to_log(app_input).await;

        Ok(Self::convert_client_write_result(app_result))
    }

    fn convert_client_write_result(app_result: Result<WriteToLogOutput, WriteToLogError>) -> ProtoClientWriteReply {
        let error = match app_result {
            Ok(output) => {
                return ProtoClientWriteReply {
                    success: true,
                    entry_term: output.term.as_u64(),
                    entry_index: output.index.as_u64(),
                    outcome: ProtoClientWriteOutcome::Committed as i32,
                    ..ProtoClientWriteReply::default()
                }
            }
            Err(error) => error,
        };

        let message = error.to_string();
        let (outcome, leader) = match error {
            WriteToLogError::LeaderRedirect(leader) => (ProtoClientWriteOutcome::NotLeader, Some(leader)),
            WriteToLogError::NoLeader => (ProtoClientWriteOutcome::NoLeader, None),
            WriteToLogError::QuorumNotReached => (ProtoClientWriteOutcome::QuorumNotReached, None),
            WriteToLogError::LeadershipLost => (ProtoClientWriteOutcome::LeadershipLost, None),
            WriteToLogError::LocalIoError(_) | WriteToLogError::ActorExited => {
                (ProtoClientWriteOutcome::ServerFault, None)
            }
        };

        ProtoClientWriteReply {
            success: false,
            leader_id: leader.as_ref().map(|l| l.replica_id.as_str().to_string()).unwrap_or_default(),
            leader_address: leader.map(|l| l.rpc_address.to_string()).unwrap_or_default(),
            message,
            outcome: outcome as i32,
            ..ProtoClientWriteReply::default()
        }
    }

    async fn handle_status(&self) -> Result<ProtoStatusReply, Status> {
        match self.local_replica.status().await {
            Ok(status) => Ok(Self::convert_status(status)),
            Err(StatusError::ActorExited) => Err(replica_exited()),
        }
    }

    fn convert_status(status: ReplicaStatus) -> ProtoStatusReply {
        let (role, leader_id) = match status.election_state {
            ElectionStateSnapshot::Leader => ("leader", status.replica_id.as_str().to_string()),
            ElectionStateSnapshot::Candidate => ("candidate", String::new()),
            ElectionStateSnapshot::Follower(leader) => ("follower", leader.replica_id.into_inner()),
            ElectionStateSnapshot::FollowerNoLeader => ("follower", String::new()),
        };

        ProtoStatusReply {
            replica_id: status.replica_id.into_inner(),
            role: role.to_string(),
            term: status.term.as_u64(),
            voted_for: status.voted_for.map(|id| id.into_inner()).unwrap_or_default(),
            leader_id,
            commit_index: status.commit_index.map_or(0, |i| i.as_u64()),
            last_log_index: status.last_log_index.map_or(0, |i| i.as_u64()),
        }
    }
}

fn invalid_argument(e: MalformedMessage) -> Status {
    Status::invalid_argument(e.to_string())
}

fn replica_exited() -> Status {
    Status::unavailable("Server internal replica task has exited")
}

#[async_trait::async_trait]
impl GrpcRaft for RpcServer {
    async fn request_vote(
        &self,
        rpc_request_wrapped: Request<ProtoRequestVoteReq>,
    ) -> Result<Response<ProtoRequestVoteReply>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_request_vote(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn heartbeat(
        &self,
        rpc_request_wrapped: Request<ProtoAppendEntriesReq>,
    ) -> Result<Response<ProtoAppendEntriesReply>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();
        if !rpc_request.new_entries.is_empty() {
            return Err(Status::invalid_argument("Heartbeat must not carry log entries"));
        }

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_append_entries(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn append_entries(
        &self,
        rpc_request_wrapped: Request<ProtoAppendEntriesReq>,
    ) -> Result<Response<ProtoAppendEntriesReply>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_append_entries(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn client_write(
        &self,
        rpc_request_wrapped: Request<ProtoClientWriteReq>,
    ) -> Result<Response<ProtoClientWriteReply>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - ClientWrite of {} bytes", rpc_request.payload.len());
        let rpc_result = self.handle_client_write(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn status(&self, _: Request<ProtoStatusReq>) -> Result<Response<ProtoStatusReply>, Status> {
        self.handle_status().await.map(Response::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::Index;
    use crate::replica::{LeaderRedirectInfo, ReplicaId, Term};

    #[test]
    fn client_write_replies() {
        let reply = RpcServer::convert_client_write_result(Ok(WriteToLogOutput {
            term: Term::new(3),
            index: Index::new(9),
        }));
        assert!(reply.success);
        assert_eq!(reply.outcome, ProtoClientWriteOutcome::Committed as i32);
        assert_eq!((reply.entry_term, reply.entry_index), (3, 9));

        let reply = RpcServer::convert_client_write_result(Err(WriteToLogError::LeaderRedirect(LeaderRedirectInfo {
            replica_id: ReplicaId::new("replica-2"),
            rpc_address: SocketAddr::from(([127, 0, 0, 1], 7002)),
        })));
        assert!(!reply.success);
        assert_eq!(reply.leader_id, "replica-2");
        assert_eq!(reply.leader_address, "127.0.0.1:7002");
        assert_eq!(reply.outcome, ProtoClientWriteOutcome::NotLeader as i32);

        let reply = RpcServer::convert_client_write_result(Err(WriteToLogError::NoLeader));
        assert!(!reply.success);
        assert!(reply.leader_id.is_empty());
        assert!(!reply.message.is_empty());
        assert_eq!(reply.outcome, ProtoClientWriteOutcome::NoLeader as i32);
    }

    #[test]
    fn status_reply_names_leader() {
        let status = ReplicaStatus {
            replica_id: ReplicaId::new("replica-1"),
            election_state: ElectionStateSnapshot::Leader,
            term: Term::new(4),
            voted_for: Some(ReplicaId::new("replica-1")),
            commit_index: None,
            last_log_index: Some(Index::new(2)),
        };

        let reply = RpcServer::convert_status(status);
        assert_eq!(reply.role, "leader");
        assert_eq!(reply.leader_id, "replica-1");
        assert_eq!(reply.voted_for, "replica-1");
        assert_eq!((reply.commit_index, reply.last_log_index), (0, 2));
    }
}
