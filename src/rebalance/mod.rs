//! Keeps this instance's partition ownership in line with the computed assignment.
//!
//! A [`Rebalancer`] runs one rebalance at a time. Each rebalance reads membership and topology
//! fresh, computes the assignment for every topic, and only then touches ownership: partitions
//! this instance no longer owns are released before any newly assigned partition is claimed.

use std::collections::BTreeSet;

use tokio::sync::{broadcast, mpsc, watch};

use crate::assignment::{divide_partitions, retrieve_partition_leaders};
use crate::config::GroupConfig;
use crate::error::{GroupError, Result};
use crate::identity::InstanceId;
use crate::registry::Registry;
use crate::topology::{Partition, TopicPartition, TopologySource};

mod watcher;

pub use watcher::watch_registry;

/// Why a rebalance was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Membership,
    Topology,
    /// A partition changed hands, possibly one this instance is waiting to claim.
    Ownership,
    Manual,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalanceOutcome {
    pub released: Vec<TopicPartition>,
    pub claimed: Vec<TopicPartition>,
    pub owned: BTreeSet<TopicPartition>,
}

pub struct Rebalancer<R> {
    id: InstanceId,
    config: GroupConfig,
    registry: R,
    owned: BTreeSet<TopicPartition>,
    owned_tx: watch::Sender<BTreeSet<TopicPartition>>,
}

impl<R: Registry + TopologySource> Rebalancer<R> {
    pub fn new(id: InstanceId, config: GroupConfig, registry: R) -> Self {
        let (owned_tx, _) = watch::channel(BTreeSet::new());
        Self {
            id,
            config,
            registry,
            owned: BTreeSet::new(),
            owned_tx,
        }
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn owned(&self) -> &BTreeSet<TopicPartition> {
        &self.owned
    }

    /// Follows the set of partitions this instance holds.
    pub fn subscribe(&self) -> watch::Receiver<BTreeSet<TopicPartition>> {
        self.owned_tx.subscribe()
    }

    #[tracing::instrument(skip(self), fields(id = %self.id, group = %self.config.group))]
    pub fn join(&self) -> Result<()> {
        tracing::info!("joining group");
        self.registry.register_instance(&self.config.group, &self.id)
    }

    /// Releases everything held, then leaves the group.
    ///
    /// Every partition is attempted and the instance is deregistered even if a release fails.
    /// Partitions that could not be released stay in [`Rebalancer::owned`] and the first release
    /// error is returned.
    #[tracing::instrument(skip(self), fields(id = %self.id, group = %self.config.group))]
    pub fn leave(&mut self) -> Result<()> {
        tracing::info!(owned = self.owned.len(), "leaving group");
        let mut failed = None;
        for tp in std::mem::take(&mut self.owned) {
            if let Err(err) = self
                .registry
                .release_partition(&self.config.group, &tp, &self.id)
            {
                tracing::warn!(%tp, %err, "failed to release partition");
                self.owned.insert(tp);
                failed.get_or_insert(err);
            }
        }
        self.publish();

        let res = self
            .registry
            .deregister_instance(&self.config.group, &self.id);
        match failed {
            Some(err) => Err(err),
            None => res,
        }
    }

    /// The partitions the current membership and topology assign to this instance.
    ///
    /// Reads everything before returning, so a failure part way leaves ownership untouched.
    pub fn assignment(&self) -> Result<BTreeSet<TopicPartition>> {
        let instances = self
            .registry
            .instances(&self.config.group)
            .map_err(GroupError::into_topology)?;
        if !instances.contains(&self.id) {
            tracing::warn!(id = %self.id, "instance is not registered in its group");
        }

        let mut assigned = BTreeSet::new();
        for topic in &self.config.topics {
            let partitions = self
                .registry
                .partitions(topic)
                .map_err(GroupError::into_topology)?;
            let leaders = retrieve_partition_leaders(&partitions)?;
            let assignment = divide_partitions(instances.clone(), leaders)?;
            let mine = assignment.partitions(&self.id);
            tracing::debug!(
                %topic,
                instances = instances.len(),
                partitions = partitions.len(),
                assigned = ?mine.iter().map(|p| p.id.0).collect::<Vec<_>>(),
                "computed assignment"
            );
            assigned.extend(mine.iter().map(Partition::topic_partition));
        }

        Ok(assigned)
    }

    #[tracing::instrument(skip(self), fields(id = %self.id, group = %self.config.group))]
    pub async fn rebalance(&mut self) -> Result<RebalanceOutcome> {
        let assigned = self.assignment()?;
        let released: Vec<TopicPartition> = self.owned.difference(&assigned).cloned().collect();
        let claimed: Vec<TopicPartition> = assigned.difference(&self.owned).cloned().collect();

        for tp in &released {
            tracing::info!(%tp, "releasing partition");
            if let Err(err) = self
                .registry
                .release_partition(&self.config.group, tp, &self.id)
            {
                self.publish();
                return Err(err);
            }
            self.owned.remove(tp);
        }

        for tp in &claimed {
            tracing::info!(%tp, "claiming partition");
            if let Err(err) = self.claim(tp).await {
                self.publish();
                return Err(err);
            }
            self.owned.insert(tp.clone());
        }

        self.publish();
        Ok(RebalanceOutcome {
            released,
            claimed,
            owned: self.owned.clone(),
        })
    }

    /// Claims `tp`, waiting for its previous owner to let go.
    async fn claim(&self, tp: &TopicPartition) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self
                .registry
                .claim_partition(&self.config.group, tp, &self.id)
            {
                Err(err @ GroupError::ClaimConflict { .. })
                    if attempt < self.config.claim_retries =>
                {
                    tracing::debug!(%tp, %err, attempt, "partition still owned");
                    tokio::time::sleep(self.config.claim_backoff).await;
                    attempt += 1;
                }
                res => return res,
            }
        }
    }

    fn publish(&self) {
        self.owned_tx.send_replace(self.owned.clone());
    }

    /// Rebalances until it succeeds, a non retryable error occurs, or attempts run out.
    /// Returns `Ok(false)` if shutdown was requested while waiting to retry.
    async fn rebalance_with_retry(
        &mut self,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<bool> {
        let mut attempt = 1;
        loop {
            match self.rebalance().await {
                Ok(outcome) => {
                    tracing::info!(
                        released = outcome.released.len(),
                        claimed = outcome.claimed.len(),
                        owned = outcome.owned.len(),
                        "rebalanced"
                    );
                    return Ok(true);
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_rebalance_attempts => {
                    tracing::warn!(%err, attempt, "rebalance failed, retrying");
                    attempt += 1;
                    tokio::select! {
                        _ = shutdown.recv() => return Ok(false),
                        _ = tokio::time::sleep(self.config.rebalance_backoff) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Joins the group and rebalances whenever a trigger arrives, until shutdown.
    ///
    /// Triggers that arrive while a rebalance is running are coalesced into one follow up. A
    /// rebalance that keeps failing on transient errors is abandoned with ownership left as it
    /// was; the next trigger starts over. Any other error stops the member.
    pub async fn run(
        mut self,
        mut triggers: mpsc::UnboundedReceiver<Trigger>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        self.join()?;

        let res = loop {
            while triggers.try_recv().is_ok() {}
            match self.rebalance_with_retry(&mut shutdown).await {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(err) if err.is_retryable() => {
                    tracing::error!(%err, "rebalance abandoned until the next change");
                }
                Err(err) => break Err(err),
            }

            tokio::select! {
                _ = shutdown.recv() => break Ok(()),
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => tracing::debug!(?trigger, "rebalance triggered"),
                    None => break Ok(()),
                }
            }
        };

        if let Err(err) = &res {
            tracing::error!(%err, "rebalancing stopped");
        }
        self.leave()?;
        res
    }
}
