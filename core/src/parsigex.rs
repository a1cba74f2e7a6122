//! The partial-signature exchange boundary.
//!
//! A reliable cluster-wide pub/sub for `ParSignedDataSet`: messages broadcast
//! by honest peers reach all honest peers within bounded time. Duplicate
//! delivery is allowed; ParSigDB deduplicates. The authenticated transport is
//! external; [`MemoryParSigEx`] is the in-process implementation used by
//! tests and solo clusters.

use crate::{Error, ParSigSubscriber};
use dv_types::{Duty, ParSignedDataSet};
use parking_lot::Mutex;
use slog::{debug, Logger};
use std::future::Future;
use std::sync::Arc;

pub trait ParSigEx: Send + Sync + 'static {
    /// Broadcasts this node's partial signatures to all peers.
    fn broadcast(
        &self,
        duty: Duty,
        set: ParSignedDataSet,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Registers a callback for sets received from peers. Must complete
    /// before duty flow starts; not thread-safe.
    fn subscribe(&mut self, subscriber: ParSigSubscriber);
}

/// Per-node subscriber lists shared by all nodes of an in-process cluster.
struct Bus {
    subscribers: Vec<Vec<Arc<ParSigSubscriber>>>,
}

#[derive(Clone)]
pub struct MemoryParSigEx {
    node_index: usize,
    bus: Arc<Mutex<Bus>>,
    log: Logger,
}

impl MemoryParSigEx {
    /// An exchange handle per node of an in-process cluster.
    pub fn cluster(node_count: usize, log: Logger) -> Vec<Self> {
        let bus = Arc::new(Mutex::new(Bus {
            subscribers: vec![Vec::new(); node_count],
        }));
        (0..node_count)
            .map(|node_index| Self {
                node_index,
                bus: bus.clone(),
                log: log.clone(),
            })
            .collect()
    }

    /// A loopback-free solo exchange: broadcasts go nowhere.
    pub fn solo(log: Logger) -> Self {
        Self::cluster(1, log).remove(0)
    }
}

impl ParSigEx for MemoryParSigEx {
    async fn broadcast(&self, duty: Duty, set: ParSignedDataSet) -> Result<(), Error> {
        let peers = {
            let bus = self.bus.lock();
            bus.subscribers
                .iter()
                .enumerate()
                .filter(|(node, _)| *node != self.node_index)
                .flat_map(|(_, subs)| subs.iter().cloned())
                .collect::<Vec<_>>()
        };

        debug!(
            self.log, "Broadcasting partial signatures";
            "duty" => %duty, "count" => set.len(), "peers" => peers.len(),
        );

        for subscriber in peers {
            subscriber(duty, set.clone()).await?;
        }
        Ok(())
    }

    fn subscribe(&mut self, subscriber: ParSigSubscriber) {
        self.bus.lock().subscribers[self.node_index].push(Arc::new(subscriber));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{null_logger, par_signed_attestation};
    use dv_types::{PublicKeyBytes, Slot};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn broadcast_reaches_only_peers() {
        let mut nodes = MemoryParSigEx::cluster(3, null_logger());
        let counters = (0..3)
            .map(|_| Arc::new(AtomicUsize::new(0)))
            .collect::<Vec<_>>();

        for (node, counter) in nodes.iter_mut().zip(counters.iter()) {
            let counter = counter.clone();
            node.subscribe(Box::new(move |_, _| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }));
        }

        let duty = Duty::attester(Slot::new(1));
        let set = ParSignedDataSet::from([(
            PublicKeyBytes::from([1u8; 48]),
            par_signed_attestation(1, 1),
        )]);
        nodes[0].broadcast(duty, set).await.unwrap();

        assert_eq!(counters[0].load(Ordering::SeqCst), 0);
        assert_eq!(counters[1].load(Ordering::SeqCst), 1);
        assert_eq!(counters[2].load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn solo_broadcast_is_noop() {
        let node = MemoryParSigEx::solo(null_logger());
        let duty = Duty::attester(Slot::new(1));
        node.broadcast(duty, ParSignedDataSet::new()).await.unwrap();
    }
}
