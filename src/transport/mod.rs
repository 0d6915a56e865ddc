//! Outbound peer RPCs. The replica only sees the `PeerTransport` seam, so the same consensus code
//! runs over gRPC in production and over an in-process network in tests.
mod grpc;
mod local_network;
mod proto_convert;

pub(crate) use grpc::GrpcTransport;
pub use local_network::LocalNetwork;
pub(crate) use proto_convert::append_entries_from_proto;
pub(crate) use proto_convert::append_entries_reply_to_proto;
pub(crate) use proto_convert::request_vote_from_proto;
pub(crate) use proto_convert::request_vote_reply_to_proto;
pub(crate) use proto_convert::MalformedMessage;

use crate::replica::{AppendEntriesInput, AppendEntriesOutput, ReplicaId, RequestVoteInput, RequestVoteOutput};

#[async_trait::async_trait]
pub(crate) trait PeerTransport: Send + Sync + 'static {
    async fn request_vote(&self, peer_id: &ReplicaId, input: RequestVoteInput)
        -> Result<RequestVoteOutput, TransportError>;

    /// Sent as a Heartbeat when `input.new_entries` is empty.
    async fn append_entries(
        &self,
        peer_id: &ReplicaId,
        input: AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, TransportError>;
}

/// Any failure to get a protocol-level answer out of a peer. These never cross the component
/// that contacted the peer: a failed call simply counts as "no vote" or "no ack".
#[derive(Debug, Clone, thiserror::Error)]
pub(crate) enum TransportError {
    #[error("Peer {0:?} is unreachable")]
    Unreachable(ReplicaId),
    #[error("Timed out waiting for peer")]
    Timeout,
    #[error("RPC failure: {0}")]
    Rpc(String),
    #[error("Malformed reply: {0}")]
    Malformed(String),
}

impl From<MalformedMessage> for TransportError {
    fn from(e: MalformedMessage) -> Self {
        TransportError::Malformed(e.to_string())
    }
}
