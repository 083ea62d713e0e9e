use derive_more::Display;

use crate::error::{GroupError, Result};
use crate::topology::broker::BrokerId;

#[derive(
    Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display,
)]
pub struct PartitionId(pub i32);

/// A `(topic, partition)` reference, the unit of ownership inside a group.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display(fmt = "{}/{}", topic, partition)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: PartitionId,
}

impl TopicPartition {
    pub fn new<T: Into<String>>(topic: T, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition: PartitionId(partition),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct Partition {
    pub topic: String,
    pub id: PartitionId,
    /// `None` while the partition has no elected leader.
    pub leader: Option<BrokerId>,
    pub isr: Vec<BrokerId>,
    pub replicas: Vec<BrokerId>,
}

impl Partition {
    pub fn new<T: Into<String>>(topic: T, id: i32, leader: i32) -> Self {
        Self {
            topic: topic.into(),
            id: PartitionId(id),
            leader: Some(BrokerId(leader)),
            isr: vec![BrokerId(leader)],
            replicas: vec![BrokerId(leader)],
        }
    }

    pub fn leaderless<T: Into<String>>(topic: T, id: i32) -> Self {
        Self {
            topic: topic.into(),
            id: PartitionId(id),
            leader: None,
            isr: vec![],
            replicas: vec![],
        }
    }

    pub fn with_replicas(mut self, replicas: &[i32], isr: &[i32]) -> Self {
        self.replicas = replicas.iter().copied().map(BrokerId).collect();
        self.isr = isr.iter().copied().map(BrokerId).collect();
        self
    }

    pub fn isr(&self) -> &[BrokerId] {
        &self.isr
    }

    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition {
            topic: self.topic.clone(),
            partition: self.id,
        }
    }

    pub fn is_under_replicated(&self) -> bool {
        self.isr.len() < self.replicas.len()
    }
}

/// Access to a partition's current leader. Implementations may go to the network.
pub trait LeaderLookup: Clone {
    fn id(&self) -> PartitionId;

    fn leader(&self) -> Result<BrokerId>;
}

impl LeaderLookup for Partition {
    fn id(&self) -> PartitionId {
        self.id
    }

    fn leader(&self) -> Result<BrokerId> {
        self.leader.ok_or_else(|| {
            GroupError::topology(format!("partition {} has no leader", self.topic_partition()))
        })
    }
}
