use crate::api::types::RaftEntryId;
use crate::commitlog::Index;
use crate::grpc::grpc_raft_client::GrpcRaftClient;
use crate::grpc::{ProtoClientWriteOutcome, ProtoClientWriteReply, ProtoClientWriteReq, ProtoStatusReq};
use crate::replica::Term;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::time::{self, Duration};
use tonic::transport::Channel;

const NO_LEADER_BACKOFF: Duration = Duration::from_millis(200);

/// RaftClusterClient writes to a cluster from outside of it. It starts at any known member and
/// follows leader redirects, so callers don't need to know who the leader is.
pub struct RaftClusterClient {
    logger: slog::Logger,
    members: Vec<SocketAddr>,
    max_redirects: usize,
    max_no_leader_retries: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterClientError {
    #[error("Could not reach any cluster member")]
    Unreachable,
    #[error("Gave up after {0} leader redirects")]
    TooManyRedirects(usize),
    #[error("No leader was elected in time")]
    NoLeader,
    #[error("Write was not committed: {0}")]
    NotCommitted(String),
    #[error("Member sent a malformed reply: {0}")]
    Malformed(String),
    #[error("RPC failure: {0}")]
    Rpc(String),
}

/// A member's view of the cluster, as reported by its Status RPC.
#[derive(Clone, Debug)]
pub struct RaftRemoteStatus {
    pub replica_id: String,
    pub role: String,
    pub term: u64,
    pub voted_for: Option<String>,
    pub leader_id: Option<String>,
    pub commit_index: Option<u64>,
    pub last_log_index: Option<u64>,
}

enum Attempt {
    Committed(RaftEntryId),
    Redirect(SocketAddr),
    NoLeader,
}

impl RaftClusterClient {
    pub fn new(logger: slog::Logger, members: Vec<SocketAddr>) -> Self {
        RaftClusterClient {
            logger,
            members,
            max_redirects: 3,
            max_no_leader_retries: 10,
        }
    }

    /// Starts at the first reachable member and follows redirects. When a member fails the RPC
    /// or knows no leader, the write moves on to the next member in the list.
    ///
    /// A write whose RPC failed may still have been appended, so a retried write can end up in
    /// the log twice.
    pub async fn write(&self, payload: Bytes, source_tag: String) -> Result<RaftEntryId, ClusterClientError> {
        let mut cursor = 0;
        let mut target = self.next_reachable_member(&mut cursor).await?;
        let mut redirects = 0;
        let mut no_leader_retries = 0;
        let mut rpc_failures = 0;

        loop {
            let request = ProtoClientWriteReq {
                payload: payload.to_vec(),
                source_tag: source_tag.clone(),
            };

            match self.try_write(target.1.clone(), request).await {
                Ok(Attempt::Committed(entry_id)) => return Ok(entry_id),
                Ok(Attempt::Redirect(leader_addr)) => {
                    redirects += 1;
                    if redirects > self.max_redirects {
                        return Err(ClusterClientError::TooManyRedirects(self.max_redirects));
                    }
                    slog::debug!(self.logger, "Redirected from {} to leader at {}", target.0, leader_addr);
                    target = match connect(leader_addr).await {
                        Ok(client) => (leader_addr, client),
                        Err(e) => {
                            slog::warn!(self.logger, "Failed to contact leader {}: {}", leader_addr, e);
                            self.next_reachable_member(&mut cursor).await?
                        }
                    };
                }
                Ok(Attempt::NoLeader) => {
                    no_leader_retries += 1;
                    if no_leader_retries > self.max_no_leader_retries {
                        return Err(ClusterClientError::NoLeader);
                    }
                    slog::debug!(self.logger, "{} knows no leader. Retrying in {:?}", target.0, NO_LEADER_BACKOFF);
                    time::sleep(NO_LEADER_BACKOFF).await;
                    target = self.next_reachable_member(&mut cursor).await?;
                }
                Err(ClusterClientError::Rpc(e)) => {
                    rpc_failures += 1;
                    if rpc_failures >= self.members.len() {
                        return Err(ClusterClientError::Rpc(e));
                    }
                    slog::warn!(self.logger, "Write through {} failed: {}", target.0, e);
                    target = self.next_reachable_member(&mut cursor).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_write(
        &self,
        mut client: GrpcRaftClient<Channel>,
        request: ProtoClientWriteReq,
    ) -> Result<Attempt, ClusterClientError> {
        let reply = client
            .client_write(request)
            .await
            .map_err(|status| ClusterClientError::Rpc(status.to_string()))?
            .into_inner();

        Self::interpret_write_reply(reply)
    }

    fn interpret_write_reply(reply: ProtoClientWriteReply) -> Result<Attempt, ClusterClientError> {
        match ProtoClientWriteOutcome::from_i32(reply.outcome) {
            Some(ProtoClientWriteOutcome::Committed) if reply.success => {
                let entry_index = Index::from_u64_opt(reply.entry_index)
                    .ok_or_else(|| ClusterClientError::Malformed("Committed entry with index 0".to_string()))?;
                Ok(Attempt::Committed(RaftEntryId {
                    term: Term::new(reply.entry_term),
                    entry_index,
                }))
            }
            Some(ProtoClientWriteOutcome::NotLeader) => reply
                .leader_address
                .parse()
                .map(Attempt::Redirect)
                .map_err(|_| ClusterClientError::Malformed(format!("Bad leader address '{}'", reply.leader_address))),
            Some(ProtoClientWriteOutcome::NoLeader) => Ok(Attempt::NoLeader),
            Some(_) => Err(ClusterClientError::NotCommitted(reply.message)),
            None => Err(ClusterClientError::Malformed(format!("Unknown outcome {}", reply.outcome))),
        }
    }

    pub async fn status(&self, member: SocketAddr) -> Result<RaftRemoteStatus, ClusterClientError> {
        let mut client = connect(member).await?;
        let reply = client
            .status(ProtoStatusReq {})
            .await
            .map_err(|status| ClusterClientError::Rpc(status.to_string()))?
            .into_inner();

        Ok(RaftRemoteStatus {
            replica_id: reply.replica_id,
            role: reply.role,
            term: reply.term,
            voted_for: non_empty(reply.voted_for),
            leader_id: non_empty(reply.leader_id),
            commit_index: non_zero(reply.commit_index),
            last_log_index: non_zero(reply.last_log_index),
        })
    }

    /// Tries each member once, starting at `cursor`, and leaves `cursor` just past the member
    /// it returns.
    async fn next_reachable_member(
        &self,
        cursor: &mut usize,
    ) -> Result<(SocketAddr, GrpcRaftClient<Channel>), ClusterClientError> {
        for _ in 0..self.members.len() {
            let member = self.members[*cursor % self.members.len()];
            *cursor = (*cursor + 1) % self.members.len();
            match connect(member).await {
                Ok(client) => return Ok((member, client)),
                Err(e) => slog::warn!(self.logger, "Failed to contact member {}: {}", member, e),
            }
        }

        Err(ClusterClientError::Unreachable)
    }
}

async fn connect(addr: SocketAddr) -> Result<GrpcRaftClient<Channel>, ClusterClientError> {
    GrpcRaftClient::connect(format!("http://{}", addr))
        .await
        .map_err(|e| ClusterClientError::Rpc(e.to_string()))
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn non_zero(v: u64) -> Option<u64> {
    if v == 0 {
        None
    } else {
        Some(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interprets_write_outcomes() {
        let committed = ProtoClientWriteReply {
            success: true,
            entry_term: 2,
            entry_index: 5,
            outcome: ProtoClientWriteOutcome::Committed as i32,
            ..ProtoClientWriteReply::default()
        };
        match RaftClusterClient::interpret_write_reply(committed) {
            Ok(Attempt::Committed(entry_id)) => assert_eq!((entry_id.term(), entry_id.index()), (2, 5)),
            _ => panic!("Expected committed"),
        }

        let redirect = ProtoClientWriteReply {
            leader_address: "127.0.0.1:7003".to_string(),
            outcome: ProtoClientWriteOutcome::NotLeader as i32,
            ..ProtoClientWriteReply::default()
        };
        match RaftClusterClient::interpret_write_reply(redirect) {
            Ok(Attempt::Redirect(addr)) => assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 7003))),
            _ => panic!("Expected redirect"),
        }

        let no_leader = ProtoClientWriteReply {
            outcome: ProtoClientWriteOutcome::NoLeader as i32,
            ..ProtoClientWriteReply::default()
        };
        assert!(matches!(
            RaftClusterClient::interpret_write_reply(no_leader),
            Ok(Attempt::NoLeader)
        ));

        let quorum_failure = ProtoClientWriteReply {
            message: "nope".to_string(),
            outcome: ProtoClientWriteOutcome::QuorumNotReached as i32,
            ..ProtoClientWriteReply::default()
        };
        assert!(matches!(
            RaftClusterClient::interpret_write_reply(quorum_failure),
            Err(ClusterClientError::NotCommitted(_))
        ));
    }

    #[tokio::test]
    async fn every_member_down_is_unreachable() {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        // Nothing listens on these ports.
        let members = vec![
            SocketAddr::from(([127, 0, 0, 1], 47391)),
            SocketAddr::from(([127, 0, 0, 1], 47392)),
        ];

        let client = RaftClusterClient::new(logger.clone(), members);
        let result = client.write(Bytes::from("lost"), "test".to_string()).await;
        assert!(matches!(result, Err(ClusterClientError::Unreachable)), "Got {:?}", result);

        let client = RaftClusterClient::new(logger, vec![]);
        let result = client.write(Bytes::from("lost"), "test".to_string()).await;
        assert!(matches!(result, Err(ClusterClientError::Unreachable)), "Got {:?}", result);
    }
}
