use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;

/// ReplicaId...or maybe it should be NodeId or ServerId. Idk.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct ReplicaId(String);

impl ReplicaId {
    pub(crate) fn new<S: Into<String>>(id: S) -> Self {
        ReplicaId(id.into())
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ReplicaMetadata {
    replica_id: ReplicaId,
    rpc_address: SocketAddr,
}

impl ReplicaMetadata {
    pub(crate) fn new(replica_id: ReplicaId, rpc_address: SocketAddr) -> Self {
        ReplicaMetadata {
            replica_id,
            rpc_address,
        }
    }

    pub(crate) fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    pub(crate) fn rpc_address(&self) -> SocketAddr {
        self.rpc_address
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum InvalidCluster {
    #[error("Replica ID {0:?} appears more than once")]
    DuplicateReplicaId(ReplicaId),
    #[error("My replica ID {0:?} is not in the cluster config")]
    MeNotInCluster(ReplicaId),
}

/// ClusterTracker holds the fixed cluster membership, including ourselves.
#[derive(Clone)]
pub(crate) struct ClusterTracker {
    my_replica_id: ReplicaId,
    members: HashMap<ReplicaId, ReplicaMetadata>,
}

impl ClusterTracker {
    pub(crate) fn create(my_replica_id: ReplicaId, members: Vec<ReplicaMetadata>) -> Result<Self, InvalidCluster> {
        let mut member_map = HashMap::with_capacity(members.len());
        for member in members {
            let replica_id = member.replica_id().clone();
            if member_map.insert(replica_id.clone(), member).is_some() {
                return Err(InvalidCluster::DuplicateReplicaId(replica_id));
            }
        }

        if !member_map.contains_key(&my_replica_id) {
            return Err(InvalidCluster::MeNotInCluster(my_replica_id));
        }

        Ok(ClusterTracker {
            my_replica_id,
            members: member_map,
        })
    }

    pub(crate) fn my_replica_id(&self) -> &ReplicaId {
        &self.my_replica_id
    }

    pub(crate) fn contains_member(&self, replica_id: &ReplicaId) -> bool {
        self.members.contains_key(replica_id)
    }

    pub(crate) fn metadata(&self, replica_id: &ReplicaId) -> Option<&ReplicaMetadata> {
        self.members.get(replica_id)
    }

    pub(crate) fn iter_peers(&self) -> impl Iterator<Item = &ReplicaMetadata> {
        let my_replica_id = &self.my_replica_id;
        self.members
            .values()
            .filter(move |member| member.replica_id() != my_replica_id)
    }

    pub(crate) fn peer_ids(&self) -> HashSet<ReplicaId> {
        self.iter_peers().map(|peer| peer.replica_id().clone()).collect()
    }

    pub(crate) fn num_voting_replicas(&self) -> usize {
        self.members.len()
    }

    /// Number of replicas (ourselves included) that make up a majority.
    pub(crate) fn majority(&self) -> usize {
        (self.num_voting_replicas() / 2) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(size: usize) -> Vec<ReplicaMetadata> {
        (0..size)
            .map(|i| {
                ReplicaMetadata::new(
                    ReplicaId::new(format!("replica-{}", i + 1)),
                    SocketAddr::from(([127, 0, 0, 1], 7000 + i as u16)),
                )
            })
            .collect()
    }

    #[test]
    fn majority_by_cluster_size() {
        let expected = [1, 2, 2, 3, 3, 4, 4];
        for (i, expected_majority) in expected.iter().enumerate() {
            let size = i + 1;
            let tracker = ClusterTracker::create(ReplicaId::new("replica-1"), cluster(size)).unwrap();
            assert_eq!(tracker.majority(), *expected_majority, "cluster size {}", size);
            assert_eq!(tracker.peer_ids().len(), size - 1);
        }
    }

    #[test]
    fn rejects_bad_membership() {
        let mut members = cluster(3);
        members.push(members[0].clone());
        assert!(matches!(
            ClusterTracker::create(ReplicaId::new("replica-1"), members),
            Err(InvalidCluster::DuplicateReplicaId(_))
        ));

        assert!(matches!(
            ClusterTracker::create(ReplicaId::new("replica-9"), cluster(3)),
            Err(InvalidCluster::MeNotInCluster(_))
        ));
    }
}
