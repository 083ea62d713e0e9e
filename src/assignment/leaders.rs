use std::collections::BTreeMap;

use crate::error::{GroupError, Result};
use crate::topology::{BrokerId, LeaderLookup, Partition, PartitionId};

/// A partition paired with the broker currently leading it. Only lives for one assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLeader<P = Partition> {
    pub id: PartitionId,
    pub leader: BrokerId,
    pub partition: P,
}

impl<P> PartitionLeader<P> {
    /// Leader first so partitions sharing a broker stay adjacent, partition id breaks ties.
    pub fn sort_key(&self) -> (BrokerId, PartitionId) {
        (self.leader, self.id)
    }
}

/// Looks up the leader of every partition. A single failed lookup fails the whole index.
#[tracing::instrument(skip_all, fields(partitions = partitions.len()))]
pub fn retrieve_partition_leaders<P: LeaderLookup>(
    partitions: &BTreeMap<PartitionId, P>,
) -> Result<Vec<PartitionLeader<P>>> {
    partitions
        .values()
        .map(|partition| {
            let leader = partition.leader().map_err(GroupError::into_topology)?;
            Ok(PartitionLeader {
                id: partition.id(),
                leader,
                partition: partition.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Topic;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Flaky {
        id: i32,
        fails: bool,
    }

    impl LeaderLookup for Flaky {
        fn id(&self) -> PartitionId {
            PartitionId(self.id)
        }

        fn leader(&self) -> Result<BrokerId> {
            if self.fails {
                Err(GroupError::Store {
                    error_msg: "session expired".to_string(),
                })
            } else {
                Ok(BrokerId(self.id % 2))
            }
        }
    }

    #[test]
    fn one_per_partition() {
        let topic = Topic::new("multi").with_leaders(&[2, 2, 0, 1]);
        let leaders = retrieve_partition_leaders(&topic.partitions).unwrap();
        assert_eq!(4, leaders.len());
        for pl in &leaders {
            assert_eq!(pl.id, pl.partition.id);
            assert_eq!(Some(pl.leader), pl.partition.leader);
        }
    }

    #[test]
    fn leaderless_fails_everything() {
        let topic = Topic::new("multi")
            .with_leaders(&[0, 1])
            .with_partition(Partition::leaderless("multi", 2));
        let res = retrieve_partition_leaders(&topic.partitions);
        assert!(matches!(res, Err(GroupError::TopologyUnavailable { .. })));
    }

    #[test]
    fn lookup_failure_is_topology_unavailable() {
        let partitions: BTreeMap<PartitionId, Flaky> = (0..5)
            .map(|id| (PartitionId(id), Flaky { id, fails: id == 3 }))
            .collect();
        match retrieve_partition_leaders(&partitions) {
            Err(GroupError::TopologyUnavailable { error_msg }) => {
                assert!(error_msg.contains("session expired"))
            }
            res => panic!("unexpected {:?}", res),
        }
    }

    #[test]
    fn ordering() {
        let topic = Topic::new("multi").with_leaders(&[1, 0, 1, 0]);
        let mut leaders = retrieve_partition_leaders(&topic.partitions).unwrap();
        leaders.sort_by_key(PartitionLeader::sort_key);
        let keys: Vec<(i32, i32)> = leaders.iter().map(|pl| (pl.leader.0, pl.id.0)).collect();
        assert_eq!(vec![(0, 1), (0, 3), (1, 0), (1, 2)], keys);
    }
}
