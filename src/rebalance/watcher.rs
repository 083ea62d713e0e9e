use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::rebalance::Trigger;
use crate::registry::{Store, WatchPrefix};

/// Forwards registry changes under `prefixes` as rebalance triggers.
///
/// sled subscriptions block, so each prefix is followed on its own blocking task. A watcher stops
/// once the receiving side of `tx` is gone, checked every `poll`.
pub fn watch_registry(
    store: &Store,
    prefixes: Vec<WatchPrefix>,
    tx: UnboundedSender<Trigger>,
    poll: Duration,
) -> Vec<JoinHandle<()>> {
    prefixes
        .into_iter()
        .map(|prefix| {
            let mut subscriber = store.watch(&prefix);
            let trigger = match prefix {
                WatchPrefix::Members(_) => Trigger::Membership,
                WatchPrefix::Owners(_) => Trigger::Ownership,
                WatchPrefix::Brokers | WatchPrefix::Topics => Trigger::Topology,
            };
            let tx = tx.clone();
            tokio::task::spawn_blocking(move || {
                while !tx.is_closed() {
                    match subscriber.next_timeout(poll) {
                        Ok(_) => {
                            if tx.send(trigger).is_err() {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::trace!(?prefix, "watcher stopped");
            })
        })
        .collect()
}
