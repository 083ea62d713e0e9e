//! Deterministic partition assignment.
//!
//! Every instance in a group runs [`divide_partitions`] independently over the same membership
//! list and the same leader index, so agreement on ownership follows from the function being
//! pure: both inputs are sorted before use and no map iteration order leaks into the result.
//!
//! Partitions are sorted by `(leader, partition)` and cut into contiguous chunks of
//! `ceil(P / C)`, handed out to instances in lexicographic order. The final ranks may receive
//! fewer partitions, or none at all when there are more instances than partitions.

use std::collections::BTreeMap;

use crate::error::{GroupError, Result};
use crate::identity::InstanceId;
use crate::topology::Partition;

mod leaders;

pub use leaders::{retrieve_partition_leaders, PartitionLeader};

/// Instance id to owned partitions. Every instance passed to the engine has an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment<P = Partition> {
    members: BTreeMap<InstanceId, Vec<P>>,
}

impl<P> Assignment<P> {
    /// Partitions assigned to `instance`, empty if it was not part of the group.
    pub fn partitions(&self, instance: &InstanceId) -> &[P] {
        self.members
            .get(instance)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, instance: &InstanceId) -> bool {
        self.members.contains_key(instance)
    }

    pub fn instances(&self) -> impl Iterator<Item = &InstanceId> {
        self.members.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstanceId, &[P])> {
        self.members.iter().map(|(id, p)| (id, p.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<InstanceId, Vec<P>> {
        self.members
    }
}

/// Divides `partitions` between `instances`.
///
/// `instances` must not contain duplicates; ids are unique by construction and a duplicate means
/// membership tracking is broken upstream. Neither input needs to be sorted.
///
/// Fails with [`GroupError::InvalidMembership`] when `instances` is empty.
pub fn divide_partitions<P>(
    mut instances: Vec<InstanceId>,
    mut partitions: Vec<PartitionLeader<P>>,
) -> Result<Assignment<P>> {
    if instances.is_empty() {
        return Err(GroupError::InvalidMembership {
            partitions: partitions.len(),
        });
    }

    partitions.sort_unstable_by_key(PartitionLeader::sort_key);
    instances.sort_unstable();
    debug_assert!(
        instances.windows(2).all(|w| w[0] != w[1]),
        "duplicate instance ids"
    );

    let plen = partitions.len();
    let n = plen.div_ceil(instances.len());
    tracing::trace!(partitions = plen, instances = instances.len(), chunk = n, "dividing");

    let mut remaining = partitions.into_iter();
    let members = instances
        .into_iter()
        .map(|instance| {
            let owned: Vec<P> = remaining.by_ref().take(n).map(|pl| pl.partition).collect();
            (instance, owned)
        })
        .collect();

    Ok(Assignment { members })
}
