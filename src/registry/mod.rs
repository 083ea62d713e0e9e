use crate::error::Result;
use crate::identity::InstanceId;
use crate::topology::TopicPartition;

mod store;

pub use store::{Store, WatchPrefix};

/// Group membership and partition ownership, as kept by the coordination service.
///
/// Claims are exclusive: a partition has at most one owner per group at any time.
pub trait Registry: Send + Sync {
    fn register_instance(&self, group: &str, id: &InstanceId) -> Result<()>;

    fn deregister_instance(&self, group: &str, id: &InstanceId) -> Result<()>;

    /// Live instances of `group`, in no particular order.
    fn instances(&self, group: &str) -> Result<Vec<InstanceId>>;

    /// Takes ownership of `tp`. Claiming a partition already owned by `id` succeeds, claiming one
    /// owned by another instance fails with [`crate::error::GroupError::ClaimConflict`].
    fn claim_partition(&self, group: &str, tp: &TopicPartition, id: &InstanceId) -> Result<()>;

    /// Gives up ownership of `tp` if, and only if, `id` owns it.
    fn release_partition(&self, group: &str, tp: &TopicPartition, id: &InstanceId) -> Result<()>;

    fn partition_owner(&self, group: &str, tp: &TopicPartition) -> Result<Option<InstanceId>>;
}
