//! Coordination core of a consumer group that divides topic partitions between its instances
//! without instances ever talking to each other. Membership and topology live in a shared
//! registry; every instance computes the same assignment from them and claims its share.

pub mod assignment;
pub mod config;
pub mod error;
pub mod identity;
pub mod rebalance;
pub mod registry;
pub mod topology;
pub mod util;

use std::collections::BTreeSet;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::GroupConfig;
use crate::error::Result;
use crate::identity::InstanceId;
use crate::rebalance::{watch_registry, Rebalancer};
use crate::registry::{Store, WatchPrefix};
use crate::topology::TopicPartition;
use crate::util::Shutdown;

#[macro_use]
extern crate serde_derive;

pub async fn consumergroup<P: AsRef<std::path::Path>>(
    config_path: P,
    shutdown: Shutdown,
) -> Result<()> {
    let config = config::config(config_path)?;
    consumergroup_with_config(config, shutdown).await
}

pub async fn consumergroup_with_config(config: GroupConfig, shutdown: Shutdown) -> Result<()> {
    config.validate()?;
    let store = Store::open(&config.data_directory)?;
    let id = InstanceId::generate()?;
    tracing::info!(%id, group = %config.group, topics = ?config.topics, "starting instance");

    let (_owned, task) = spawn_instance(id, config, store, &shutdown);
    task.await?
}

/// Starts a group member on `store` and returns a view of the partitions it owns.
pub fn spawn_instance(
    id: InstanceId,
    config: GroupConfig,
    store: Store,
    shutdown: &Shutdown,
) -> (
    watch::Receiver<BTreeSet<TopicPartition>>,
    JoinHandle<Result<()>>,
) {
    let (trigger_tx, trigger_rx) = tokio::sync::mpsc::unbounded_channel();
    watch_registry(
        &store,
        vec![
            WatchPrefix::Members(config.group.clone()),
            WatchPrefix::Owners(config.group.clone()),
            WatchPrefix::Brokers,
            WatchPrefix::Topics,
        ],
        trigger_tx,
        config.watch_poll,
    );

    let rebalancer = Rebalancer::new(id, config, store);
    let owned = rebalancer.subscribe();
    let task = tokio::spawn(rebalancer.run(trigger_rx, shutdown.subscribe()));
    (owned, task)
}
