//! A point-in-time view of the cluster: brokers, topics, and each partition's leader and ISR.
//!
//! Snapshots are replaced wholesale whenever the cluster changes and are never patched in place.
//! Anything that reads topology reports failure as [`GroupError::TopologyUnavailable`].

use std::collections::BTreeMap;

use crate::error::{GroupError, Result};

pub mod broker;
pub mod partition;
pub mod topic;

pub use broker::{Broker, BrokerId};
pub use partition::{LeaderLookup, Partition, PartitionId, TopicPartition};
pub use topic::Topic;

/// Source of cluster topology, typically backed by the coordination service.
pub trait TopologySource {
    fn brokers(&self) -> Result<BTreeMap<BrokerId, Broker>>;

    fn topics(&self) -> Result<BTreeMap<String, Topic>>;

    fn topic(&self, name: &str) -> Result<Topic>;

    fn partitions(&self, topic: &str) -> Result<BTreeMap<PartitionId, Partition>> {
        Ok(self.topic(topic)?.partitions)
    }

    /// Reads brokers and topics together. Fails as a whole if either read fails.
    fn snapshot(&self) -> Result<TopologySnapshot> {
        let brokers = self.brokers().map_err(GroupError::into_topology)?;
        let topics = self.topics().map_err(GroupError::into_topology)?;
        Ok(TopologySnapshot { brokers, topics })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub brokers: BTreeMap<BrokerId, Broker>,
    pub topics: BTreeMap<String, Topic>,
}

impl TopologySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broker(mut self, broker: Broker) -> Self {
        self.brokers.insert(broker.id, broker);
        self
    }

    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topics.insert(topic.name.clone(), topic);
        self
    }

    /// Partitions whose leader is not a registered broker.
    pub fn orphaned_partitions(&self) -> Vec<TopicPartition> {
        self.topics
            .values()
            .flat_map(|topic| topic.partitions.values())
            .filter(|p| match p.leader {
                Some(leader) => !self.brokers.contains_key(&leader),
                None => true,
            })
            .map(Partition::topic_partition)
            .collect()
    }
}

impl TopologySource for TopologySnapshot {
    fn brokers(&self) -> Result<BTreeMap<BrokerId, Broker>> {
        Ok(self.brokers.clone())
    }

    fn topics(&self) -> Result<BTreeMap<String, Topic>> {
        Ok(self.topics.clone())
    }

    fn topic(&self, name: &str) -> Result<Topic> {
        self.topics
            .get(name)
            .cloned()
            .ok_or_else(|| GroupError::topology(format!("unknown topic {}", name)))
    }
}
