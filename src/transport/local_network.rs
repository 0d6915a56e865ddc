use crate::actor::WeakActorClient;
use crate::replica::{AppendEntriesInput, AppendEntriesOutput, ReplicaId, RequestVoteInput, RequestVoteOutput};
use crate::transport::{PeerTransport, TransportError};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// LocalNetwork connects replicas living in the same process. It exists to run clusters in tests
/// and simulations, with controls to cut links, drop requests, and delay delivery.
///
/// Clones share the same network.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    state: Arc<Mutex<NetworkState>>,
}

#[derive(Default)]
struct NetworkState {
    members: HashMap<ReplicaId, WeakActorClient>,
    // Directed (from, to) links that are cut.
    blocked: HashSet<(ReplicaId, ReplicaId)>,
    drop_probability: f64,
    latency: Option<(Duration, Duration)>,
}

enum Delivery {
    Deliver { to: WeakActorClient, delay: Duration },
    Blocked,
    Dropped,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut every link between `replica_id` and everyone else, both directions.
    pub fn isolate(&self, replica_id: &str) {
        let isolated = ReplicaId::new(replica_id);
        self.with_state(|state| {
            let others: Vec<ReplicaId> = state.members.keys().filter(|id| **id != isolated).cloned().collect();
            for other in others {
                state.blocked.insert((isolated.clone(), other.clone()));
                state.blocked.insert((other, isolated.clone()));
            }
        });
    }

    /// Cut every link between a member of `side_a` and a member of `side_b`, both directions.
    pub fn partition(&self, side_a: &[&str], side_b: &[&str]) {
        self.with_state(|state| {
            for a in side_a {
                for b in side_b {
                    state.blocked.insert((ReplicaId::new(*a), ReplicaId::new(*b)));
                    state.blocked.insert((ReplicaId::new(*b), ReplicaId::new(*a)));
                }
            }
        });
    }

    /// Restore every link. Drop probability and latency are left as they are.
    pub fn heal(&self) {
        self.with_state(|state| state.blocked.clear());
    }

    /// Each request is lost with probability `p`. A lost request never completes, so the caller
    /// sees its own timeout.
    pub fn set_drop_probability(&self, p: f64) {
        self.with_state(|state| state.drop_probability = p.max(0.0).min(1.0));
    }

    /// Delay each request by a uniformly random duration in `[min, max]`.
    pub fn set_latency(&self, min: Duration, max: Duration) {
        self.with_state(|state| state.latency = Some((min, max.max(min))));
    }

    pub(crate) fn register(&self, replica_id: ReplicaId, actor_client: WeakActorClient) {
        self.with_state(|state| {
            state.members.insert(replica_id, actor_client);
        });
    }

    pub(crate) fn transport_for(&self, replica_id: ReplicaId) -> LocalTransport {
        LocalTransport {
            my_replica_id: replica_id,
            network: self.clone(),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut NetworkState) -> T) -> T {
        // A panicking test thread may poison the lock. The state is still consistent.
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    fn route(&self, from: &ReplicaId, to: &ReplicaId) -> Result<Delivery, TransportError> {
        self.with_state(|state| {
            if state.blocked.contains(&(from.clone(), to.clone())) {
                return Ok(Delivery::Blocked);
            }

            let mut rng = rand::thread_rng();
            if state.drop_probability > 0.0 && rng.gen_bool(state.drop_probability) {
                return Ok(Delivery::Dropped);
            }

            let to = state
                .members
                .get(to)
                .cloned()
                .ok_or_else(|| TransportError::Unreachable(to.clone()))?;
            let delay = match state.latency {
                Some((min, max)) if max > min => rng.gen_range(min..=max),
                Some((min, _)) => min,
                None => Duration::from_millis(0),
            };

            Ok(Delivery::Deliver { to, delay })
        })
    }

    fn is_blocked(&self, from: &ReplicaId, to: &ReplicaId) -> bool {
        self.with_state(|state| state.blocked.contains(&(from.clone(), to.clone())))
    }
}

/// LocalTransport is one replica's view of the LocalNetwork.
pub(crate) struct LocalTransport {
    my_replica_id: ReplicaId,
    network: LocalNetwork,
}

impl LocalTransport {
    async fn connect(&self, peer_id: &ReplicaId) -> Result<WeakActorClient, TransportError> {
        match self.network.route(&self.my_replica_id, peer_id)? {
            Delivery::Blocked => Err(TransportError::Unreachable(peer_id.clone())),
            Delivery::Dropped => {
                std::future::pending::<()>().await;
                Err(TransportError::Timeout)
            }
            Delivery::Deliver { to, delay } => {
                if delay > Duration::from_millis(0) {
                    tokio::time::sleep(delay).await;
                }
                Ok(to)
            }
        }
    }

    // The reply travels the reverse link, which may have been cut while the request was in flight.
    fn check_reply_path(&self, peer_id: &ReplicaId) -> Result<(), TransportError> {
        if self.network.is_blocked(peer_id, &self.my_replica_id) {
            Err(TransportError::Unreachable(peer_id.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl PeerTransport for LocalTransport {
    async fn request_vote(
        &self,
        peer_id: &ReplicaId,
        input: RequestVoteInput,
    ) -> Result<RequestVoteOutput, TransportError> {
        let peer = self.connect(peer_id).await?;
        let output = peer
            .request_vote(input)
            .await
            .map_err(|_| TransportError::Unreachable(peer_id.clone()))?;
        self.check_reply_path(peer_id)?;

        Ok(output)
    }

    async fn append_entries(
        &self,
        peer_id: &ReplicaId,
        input: AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, TransportError> {
        let peer = self.connect(peer_id).await?;
        let output = peer
            .append_entries(input)
            .await
            .map_err(|e| TransportError::Rpc(e.to_string()))?;
        self.check_reply_path(peer_id)?;

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorClient, Event};
    use crate::replica::Term;

    fn vote_request() -> RequestVoteInput {
        RequestVoteInput {
            candidate_term: Term::new(1),
            candidate_id: ReplicaId::new("a"),
            candidate_last_log_entry: None,
        }
    }

    // Answers every vote request with a grant until the network drops its client.
    fn spawn_voter(mut rx: tokio::sync::mpsc::Receiver<Event>) {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Event::RequestVote(input, callback) = event {
                    callback.send(Ok(RequestVoteOutput {
                        term: input.candidate_term,
                        vote_granted: true,
                    }));
                }
            }
        });
    }

    #[tokio::test]
    async fn partition_and_heal() {
        let network = LocalNetwork::new();
        let (b_client, b_rx) = ActorClient::new(10);
        spawn_voter(b_rx);
        network.register(ReplicaId::new("a"), ActorClient::new(1).0.weak());
        network.register(ReplicaId::new("b"), b_client.weak());

        let transport = network.transport_for(ReplicaId::new("a"));
        let b = ReplicaId::new("b");

        let output = transport.request_vote(&b, vote_request()).await.unwrap();
        assert!(output.vote_granted);

        network.isolate("a");
        assert!(matches!(
            transport.request_vote(&b, vote_request()).await,
            Err(TransportError::Unreachable(_))
        ));

        network.heal();
        network.partition(&["b"], &["a", "c"]);
        assert!(transport.request_vote(&b, vote_request()).await.is_err());

        network.heal();
        assert!(transport.request_vote(&b, vote_request()).await.is_ok());
    }

    #[tokio::test]
    async fn dropped_requests_never_complete() {
        let network = LocalNetwork::new();
        let (b_client, b_rx) = ActorClient::new(10);
        spawn_voter(b_rx);
        network.register(ReplicaId::new("b"), b_client.weak());
        network.set_drop_probability(1.0);

        let transport = network.transport_for(ReplicaId::new("a"));
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            transport.request_vote(&ReplicaId::new("b"), vote_request()),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_or_exited_peers_are_unreachable() {
        let network = LocalNetwork::new();
        let transport = network.transport_for(ReplicaId::new("a"));
        assert!(matches!(
            transport.request_vote(&ReplicaId::new("nobody"), vote_request()).await,
            Err(TransportError::Unreachable(_))
        ));

        let (gone, _rx) = ActorClient::new(1);
        network.register(ReplicaId::new("gone"), gone.weak());
        drop(gone);
        assert!(transport.request_vote(&ReplicaId::new("gone"), vote_request()).await.is_err());
    }
}
