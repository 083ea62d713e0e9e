use std::collections::{BTreeMap, HashMap};

use crate::topology::partition::{Partition, PartitionId};

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Default)]
pub struct Topic {
    pub name: String,
    /// Topic level overrides only. A missing key inherits the broker default.
    pub config: HashMap<String, String>,
    pub partitions: BTreeMap<PartitionId, Partition>,
}

impl Topic {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds partitions `0..leaders.len()`, partition `i` led by `leaders[i]`.
    pub fn with_leaders(mut self, leaders: &[i32]) -> Self {
        for (idx, leader) in leaders.iter().enumerate() {
            let partition = Partition::new(self.name.clone(), idx as i32, *leader);
            self.partitions.insert(partition.id, partition);
        }
        self
    }

    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partitions.insert(partition.id, partition);
        self
    }

    pub fn with_config<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn config(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}
