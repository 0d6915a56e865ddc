use crate::grpc::grpc_raft_client::GrpcRaftClient;
use crate::replica::{
    AppendEntriesInput, AppendEntriesOutput, ReplicaId, ReplicaMetadata, RequestVoteInput, RequestVoteOutput,
};
use crate::transport::proto_convert;
use crate::transport::{PeerTransport, TransportError};
use std::collections::HashMap;
use std::net::SocketAddr;
use tonic::transport::{Channel, Endpoint};

/// GrpcTransport holds one lazily connected channel per peer. tonic reconnects the channel on its
/// own after a peer restarts, so a channel is created once and cloned per call.
pub(crate) struct GrpcTransport {
    logger: slog::Logger,
    peers: HashMap<ReplicaId, GrpcRaftClient<Channel>>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ChannelSetupError {
    #[error("Peer address '{0}' is not a valid URI")]
    InvalidAddress(String),
    #[error("Failed to set up channel: {0}")]
    Transport(#[from] tonic::transport::Error),
}

impl GrpcTransport {
    pub(crate) fn new<'a, I>(logger: slog::Logger, peers: I) -> Result<Self, ChannelSetupError>
    where
        I: IntoIterator<Item = &'a ReplicaMetadata>,
    {
        let mut clients = HashMap::new();
        for peer in peers {
            let channel = Self::lazy_channel(peer.rpc_address())?;
            clients.insert(peer.replica_id().clone(), GrpcRaftClient::new(channel));
        }

        Ok(GrpcTransport { logger, peers: clients })
    }

    fn lazy_channel(socket_addr: SocketAddr) -> Result<Channel, ChannelSetupError> {
        let url = format!("http://{}", socket_addr);
        let endpoint = Endpoint::from_shared(url.clone()).map_err(|_| ChannelSetupError::InvalidAddress(url))?;
        Ok(endpoint.connect_lazy()?)
    }

    fn client(&self, peer_id: &ReplicaId) -> Result<GrpcRaftClient<Channel>, TransportError> {
        self.peers
            .get(peer_id)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(peer_id.clone()))
    }
}

#[async_trait::async_trait]
impl PeerTransport for GrpcTransport {
    async fn request_vote(
        &self,
        peer_id: &ReplicaId,
        input: RequestVoteInput,
    ) -> Result<RequestVoteOutput, TransportError> {
        let mut client = self.client(peer_id)?;
        let rpc_request = proto_convert::request_vote_to_proto(input);

        slog::debug!(self.logger, "ClientWire - {:?} - {:?}", peer_id, rpc_request);
        let rpc_reply = client.request_vote(rpc_request).await;
        slog::debug!(self.logger, "ClientWire - {:?} - {:?}", peer_id, rpc_reply);

        match rpc_reply {
            Ok(reply) => Ok(proto_convert::request_vote_reply_from_proto(reply.into_inner())),
            Err(status) => Err(TransportError::Rpc(status.to_string())),
        }
    }

    async fn append_entries(
        &self,
        peer_id: &ReplicaId,
        input: AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, TransportError> {
        let mut client = self.client(peer_id)?;
        let is_heartbeat = input.new_entries.is_empty();
        let rpc_request = proto_convert::append_entries_to_proto(input);

        slog::debug!(self.logger, "ClientWire - {:?} - {:?}", peer_id, rpc_request);
        let rpc_reply = if is_heartbeat {
            client.heartbeat(rpc_request).await
        } else {
            client.append_entries(rpc_request).await
        };
        slog::debug!(self.logger, "ClientWire - {:?} - {:?}", peer_id, rpc_reply);

        match rpc_reply {
            Ok(reply) => Ok(proto_convert::append_entries_reply_from_proto(reply.into_inner())),
            Err(status) => Err(TransportError::Rpc(status.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_lazy_client_per_peer() {
        let peers = vec![
            ReplicaMetadata::new(ReplicaId::new("r2"), SocketAddr::from(([127, 0, 0, 1], 7202))),
            ReplicaMetadata::new(ReplicaId::new("r3"), "[::1]:7203".parse().unwrap()),
        ];

        // Nothing listens on these ports. Channels only connect on first use.
        let transport = GrpcTransport::new(slog::Logger::root(slog::Discard, slog::o!()), &peers).unwrap();
        assert_eq!(transport.peers.len(), 2);
        assert!(transport.client(&ReplicaId::new("r3")).is_ok());
        assert!(matches!(
            transport.client(&ReplicaId::new("r9")),
            Err(TransportError::Unreachable(_))
        ));
    }
}
