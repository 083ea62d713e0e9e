use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{CompareAndSwapError, Db, Subscriber};

use crate::error::{GroupError, Result};
use crate::identity::InstanceId;
use crate::registry::Registry;
use crate::topology::{
    Broker, BrokerId, Partition, PartitionId, Topic, TopicPartition, TopologySource,
};

/// Key ranges a [`Store::watch`] subscription can follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchPrefix {
    Brokers,
    Topics,
    Members(String),
    Owners(String),
}

impl WatchPrefix {
    fn key(&self) -> String {
        match self {
            WatchPrefix::Brokers => "broker:".to_string(),
            WatchPrefix::Topics => "topic:".to_string(),
            WatchPrefix::Members(group) => format!("group:{}:instance:", group),
            WatchPrefix::Owners(group) => format!("group:{}:owner:", group),
        }
    }
}

/// Embedded registry holding cluster topology and group state in sled.
///
/// Topics are stored whole, partitions included, so a leader change replaces the topic record.
#[derive(Clone)]
pub struct Store {
    db: Db,
}

impl Debug for Store {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Store {{}}")
    }
}

impl Store {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(sled::open(path)?))
    }

    /// A store that is deleted when the last handle is dropped.
    pub fn temporary() -> Result<Self> {
        Ok(Self::new(sled::Config::new().temporary(true).open()?))
    }

    #[tracing::instrument]
    pub fn create_broker(&self, broker: Broker) -> Result<Broker> {
        tracing::debug!(?broker, "create broker");
        self.insert(format!("broker:{}", broker.id), &broker)?;
        Ok(broker)
    }

    #[tracing::instrument]
    pub fn remove_broker(&self, id: BrokerId) -> Result<()> {
        self.db.remove(format!("broker:{}", id))?;
        Ok(())
    }

    /// Creates or replaces `topic` along with all of its partitions.
    #[tracing::instrument(skip(topic), fields(topic = %topic.name))]
    pub fn create_topic(&self, topic: Topic) -> Result<Topic> {
        tracing::debug!(partitions = topic.partitions.len(), "create topic");
        self.insert(format!("topic:{}", topic.name), &topic)?;
        Ok(topic)
    }

    #[tracing::instrument]
    pub fn remove_topic(&self, name: &str) -> Result<()> {
        self.db.remove(format!("topic:{}", name))?;
        Ok(())
    }

    /// Sets a topic level override, or removes it when `value` is `None`.
    #[tracing::instrument]
    pub fn set_topic_config(&self, name: &str, key: &str, value: Option<&str>) -> Result<Topic> {
        let mut topic = self.topic(name)?;
        match value {
            Some(value) => topic.config.insert(key.to_string(), value.to_string()),
            None => topic.config.remove(key),
        };
        self.create_topic(topic)
    }

    /// Replaces a partition's leader and replica state, adding the partition if it is new.
    #[tracing::instrument(skip(partition), fields(partition = %partition.topic_partition()))]
    pub fn update_partition(&self, partition: Partition) -> Result<Partition> {
        tracing::debug!(leader = ?partition.leader, isr = ?partition.isr, "update partition");
        let mut topic = self.topic(&partition.topic)?;
        topic.partitions.insert(partition.id, partition.clone());
        self.create_topic(topic)?;
        Ok(partition)
    }

    /// Subscribes to every change under `prefix`.
    pub fn watch(&self, prefix: &WatchPrefix) -> Subscriber {
        self.db.watch_prefix(prefix.key())
    }

    fn get<T: DeserializeOwned, K: AsRef<[u8]>>(&self, key: K) -> Result<Option<T>> {
        self.db
            .get(key.as_ref())?
            .map(|x| bincode::deserialize(&x).map_err(GroupError::from))
            .transpose()
    }

    fn insert<T: Serialize, K: AsRef<[u8]>>(&self, key: K, value: &T) -> Result<()> {
        self.db.insert(key.as_ref(), bincode::serialize(&value)?)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        self.db
            .scan_prefix(prefix)
            .values()
            .map(|x| Ok(bincode::deserialize(&x?)?))
            .collect()
    }
}

fn member_key(group: &str, id: &InstanceId) -> String {
    format!("group:{}:instance:{}", group, id)
}

fn owner_key(group: &str, tp: &TopicPartition) -> String {
    format!("group:{}:owner:{}:{}", group, tp.topic, tp.partition)
}

impl Registry for Store {
    #[tracing::instrument]
    fn register_instance(&self, group: &str, id: &InstanceId) -> Result<()> {
        tracing::info!("register instance");
        self.insert(member_key(group, id), id)
    }

    #[tracing::instrument]
    fn deregister_instance(&self, group: &str, id: &InstanceId) -> Result<()> {
        tracing::info!("deregister instance");
        self.db.remove(member_key(group, id))?;
        Ok(())
    }

    fn instances(&self, group: &str) -> Result<Vec<InstanceId>> {
        self.scan(&WatchPrefix::Members(group.to_string()).key())
    }

    #[tracing::instrument]
    fn claim_partition(&self, group: &str, tp: &TopicPartition, id: &InstanceId) -> Result<()> {
        let value = bincode::serialize(id)?;
        let res = self
            .db
            .compare_and_swap(owner_key(group, tp), None::<&[u8]>, Some(value))?;
        let current = match res {
            Ok(()) => return Ok(()),
            Err(CompareAndSwapError { current, .. }) => current,
        };

        let owner: Option<InstanceId> = current
            .map(|x| bincode::deserialize(&x))
            .transpose()?;
        match owner {
            Some(owner) if &owner == id => Ok(()),
            Some(owner) => Err(GroupError::ClaimConflict {
                topic: tp.topic.clone(),
                partition: tp.partition.0,
                owner: owner.to_string(),
            }),
            None => Err(GroupError::Store {
                error_msg: format!("claim on {} raced with a release", tp),
            }),
        }
    }

    #[tracing::instrument]
    fn release_partition(&self, group: &str, tp: &TopicPartition, id: &InstanceId) -> Result<()> {
        let value = bincode::serialize(id)?;
        if let Err(CompareAndSwapError { current, .. }) =
            self.db
                .compare_and_swap(owner_key(group, tp), Some(value), None::<&[u8]>)?
        {
            tracing::debug!(owned = current.is_some(), "partition not held, nothing to release");
        }
        Ok(())
    }

    fn partition_owner(&self, group: &str, tp: &TopicPartition) -> Result<Option<InstanceId>> {
        self.get(owner_key(group, tp))
    }
}

impl TopologySource for Store {
    fn brokers(&self) -> Result<BTreeMap<BrokerId, Broker>> {
        let brokers: Vec<Broker> = self.scan("broker:").map_err(GroupError::into_topology)?;
        Ok(brokers.into_iter().map(|b| (b.id, b)).collect())
    }

    fn topics(&self) -> Result<BTreeMap<String, Topic>> {
        let topics: Vec<Topic> = self.scan("topic:").map_err(GroupError::into_topology)?;
        Ok(topics.into_iter().map(|t| (t.name.clone(), t)).collect())
    }

    fn topic(&self, name: &str) -> Result<Topic> {
        self.get(format!("topic:{}", name))
            .map_err(GroupError::into_topology)?
            .ok_or_else(|| GroupError::topology(format!("unknown topic {}", name)))
    }

    fn partitions(&self, topic: &str) -> Result<BTreeMap<PartitionId, Partition>> {
        Ok(self.topic(topic)?.partitions)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn store() -> Store {
        let store = Store::temporary().unwrap();
        store.create_broker(Broker::new(0, "localhost", 9092)).unwrap();
        store.create_broker(Broker::new(1, "localhost", 9093)).unwrap();
        store
            .create_topic(
                Topic::new("consumergroup.multi")
                    .with_leaders(&[0, 1, 0, 1])
                    .with_config("retention.ms", "604800000"),
            )
            .unwrap();
        store
            .create_topic(Topic::new("consumergroup.single").with_leaders(&[1]))
            .unwrap();
        store
    }

    #[test]
    fn brokers() {
        let brokers = store().brokers().unwrap();
        assert_eq!(2, brokers.len());
        assert_eq!("localhost:9093", brokers[&BrokerId(1)].addr());
    }

    #[test]
    fn topics() {
        let store = store();
        let topics = store.topics().unwrap();
        assert_eq!("consumergroup.multi", topics["consumergroup.multi"].name);
        assert!(!topics.contains_key("__nonexistent__"));

        let partitions = store.partitions("consumergroup.multi").unwrap();
        assert_eq!(4, partitions.len());
        let brokers = store.brokers().unwrap();
        for (id, partition) in partitions {
            assert_eq!(id, partition.id);
            assert!(brokers.contains_key(&partition.leader.unwrap()));
            assert!(partition.isr().iter().all(|b| brokers.contains_key(b)));
        }
    }

    #[test]
    fn topic_config() {
        let store = store();
        let topic = store.topic("consumergroup.multi").unwrap();
        assert_eq!(Some("604800000"), topic.config("retention.ms"));
        assert!(store.topic("consumergroup.single").unwrap().config.is_empty());

        let topic = store
            .set_topic_config("consumergroup.multi", "retention.ms", None)
            .unwrap();
        assert_eq!(None, topic.config("retention.ms"));
    }

    #[test]
    fn unknown_topic() {
        let res = store().partitions("__nonexistent__");
        assert!(matches!(res, Err(GroupError::TopologyUnavailable { .. })));
    }

    #[test]
    fn update_partition() {
        let store = store();
        store
            .update_partition(Partition::leaderless("consumergroup.single", 0))
            .unwrap();
        let partitions = store.partitions("consumergroup.single").unwrap();
        assert_eq!(None, partitions[&PartitionId(0)].leader);

        let res = store.update_partition(Partition::new("missing", 0, 1));
        assert!(res.is_err());
    }

    #[test]
    fn membership() {
        let store = store();
        let (a, b) = (InstanceId::from("host:a"), InstanceId::from("host:b"));
        store.register_instance("group", &a).unwrap();
        store.register_instance("group", &b).unwrap();
        store.register_instance("other", &b).unwrap();

        let mut instances = store.instances("group").unwrap();
        instances.sort();
        assert_eq!(vec![a.clone(), b.clone()], instances);

        store.deregister_instance("group", &a).unwrap();
        assert_eq!(vec![b.clone()], store.instances("group").unwrap());
        assert_eq!(vec![b], store.instances("other").unwrap());
    }

    #[test]
    fn claims_are_exclusive() {
        let store = store();
        let tp = TopicPartition::new("consumergroup.multi", 2);
        let (a, b) = (InstanceId::from("host:a"), InstanceId::from("host:b"));

        store.claim_partition("group", &tp, &a).unwrap();
        store.claim_partition("group", &tp, &a).unwrap();
        assert_eq!(
            Err(GroupError::ClaimConflict {
                topic: "consumergroup.multi".to_string(),
                partition: 2,
                owner: "host:a".to_string(),
            }),
            store.claim_partition("group", &tp, &b)
        );

        // only the owner can release
        store.release_partition("group", &tp, &b).unwrap();
        assert_eq!(Some(a.clone()), store.partition_owner("group", &tp).unwrap());

        store.release_partition("group", &tp, &a).unwrap();
        assert_eq!(None, store.partition_owner("group", &tp).unwrap());
        store.claim_partition("group", &tp, &b).unwrap();
        assert_eq!(Some(b), store.partition_owner("group", &tp).unwrap());
    }

    #[test]
    fn watch() {
        let store = store();
        let mut members = store.watch(&WatchPrefix::Members("group".to_string()));
        store
            .register_instance("group", &InstanceId::from("host:a"))
            .unwrap();
        assert!(members.next_timeout(Duration::from_secs(1)).is_ok());

        let mut topics = store.watch(&WatchPrefix::Topics);
        store
            .update_partition(Partition::new("consumergroup.single", 0, 0))
            .unwrap();
        assert!(topics.next_timeout(Duration::from_secs(1)).is_ok());
    }
}
