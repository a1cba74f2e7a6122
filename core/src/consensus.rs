//! The consensus boundary.
//!
//! The byzantine-agreement wire protocol between operators is external; the
//! pipeline consumes only `propose` plus a decided-value subscription. The
//! contract: `propose` is called by the proposer-of-record for the slot, and
//! every node's subscribers observe exactly one decided value per duty before
//! its deadline.
//!
//! [`MemoryConsensus`] implements the interface in-process for single-node
//! clusters and multi-node tests: the first proposal for a duty is decided.

use crate::{Error, UnsignedSubscriber};
use dv_types::{Duty, Slot, UnsignedDataSet};
use parking_lot::Mutex;
use slog::{debug, Logger};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

pub trait Consensus: Send + Sync + 'static {
    /// Proposes a value for `duty`. Implementations must ensure at most one
    /// value is ever decided per duty cluster-wide.
    fn propose(
        &self,
        duty: Duty,
        data: UnsignedDataSet,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Registers a decided-value callback. Must complete before duty flow
    /// starts; not thread-safe.
    fn subscribe(&mut self, subscriber: UnsignedSubscriber);
}

/// The operator expected to propose the value for `slot`, round-robin.
pub fn proposer_of_record(slot: Slot, node_count: usize) -> usize {
    (slot.as_u64() % node_count as u64) as usize
}

struct Shared {
    decided: HashSet<Duty>,
    /// Per-node subscriber lists, appended during wiring only.
    subscribers: Vec<Vec<Arc<UnsignedSubscriber>>>,
}

/// In-process consensus: first proposal per duty wins and is delivered to
/// every node's subscribers.
#[derive(Clone)]
pub struct MemoryConsensus {
    node_index: usize,
    shared: Arc<Mutex<Shared>>,
    log: Logger,
}

impl MemoryConsensus {
    /// A consensus instance per node of an in-process cluster.
    pub fn cluster(node_count: usize, log: Logger) -> Vec<Self> {
        let shared = Arc::new(Mutex::new(Shared {
            decided: HashSet::new(),
            subscribers: vec![Vec::new(); node_count],
        }));
        (0..node_count)
            .map(|node_index| Self {
                node_index,
                shared: shared.clone(),
                log: log.clone(),
            })
            .collect()
    }

    /// Single-node consensus, for solo clusters.
    pub fn solo(log: Logger) -> Self {
        Self::cluster(1, log).remove(0)
    }
}

impl Consensus for MemoryConsensus {
    async fn propose(&self, duty: Duty, data: UnsignedDataSet) -> Result<(), Error> {
        let subscribers = {
            let mut shared = self.shared.lock();
            if !shared.decided.insert(duty) {
                // Someone else proposed first; their value was decided.
                return Ok(());
            }
            shared
                .subscribers
                .iter()
                .flatten()
                .cloned()
                .collect::<Vec<_>>()
        };

        debug!(self.log, "Consensus decided"; "duty" => %duty, "validators" => data.len());

        for subscriber in subscribers {
            // Each subscriber gets its own copy of the decided set.
            subscriber(duty, data.clone()).await?;
        }
        Ok(())
    }

    fn subscribe(&mut self, subscriber: UnsignedSubscriber) {
        self.shared.lock().subscribers[self.node_index].push(Arc::new(subscriber));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{null_logger, proposal_unsigned};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unsigned_set(slot: u64) -> UnsignedDataSet {
        let (pubkey, unsigned) = proposal_unsigned(slot, 1);
        UnsignedDataSet::from([(pubkey, unsigned)])
    }

    #[test]
    fn round_robin_proposer() {
        assert_eq!(proposer_of_record(Slot::new(0), 4), 0);
        assert_eq!(proposer_of_record(Slot::new(5), 4), 1);
        assert_eq!(proposer_of_record(Slot::new(7), 4), 3);
        assert_eq!(proposer_of_record(Slot::new(7), 1), 0);
    }

    #[tokio::test]
    async fn first_proposal_wins_and_reaches_all_nodes() {
        let mut nodes = MemoryConsensus::cluster(3, null_logger());
        let deliveries = Arc::new(AtomicUsize::new(0));

        for node in nodes.iter_mut() {
            let deliveries = deliveries.clone();
            node.subscribe(Box::new(move |_, _| {
                let deliveries = deliveries.clone();
                Box::pin(async move {
                    deliveries.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }));
        }

        let duty = Duty::proposer(Slot::new(64));
        nodes[0].propose(duty, unsigned_set(64)).await.unwrap();
        assert_eq!(deliveries.load(Ordering::SeqCst), 3);

        // A second proposal for the same duty is a no-op.
        nodes[1].propose(duty, unsigned_set(64)).await.unwrap();
        assert_eq!(deliveries.load(Ordering::SeqCst), 3);
    }
}
