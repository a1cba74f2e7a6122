//! Storage for partial signatures, local and from peers.
//!
//! Per `(duty, pubkey)` this holds one partial per share index. The first
//! local insert is handed to the exchange for broadcast; when the number of
//! distinct partials over the *same* payload reaches the cluster threshold,
//! the set is forwarded to the aggregator exactly once.

use crate::{Error, ParSigSubscriber, ThresholdSubscriber};
use dv_types::{Duty, Hash256, ParSignedData, ParSignedDataSet, PublicKeyBytes, Slot};
use parking_lot::Mutex;
use slog::{debug, error, Logger};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, PartialEq)]
enum InsertOutcome {
    /// First time this share's partial was seen.
    New,
    /// Identical partial already stored; no state change.
    Duplicate,
}

struct Inner {
    sigs: HashMap<(Duty, PublicKeyBytes), BTreeMap<u64, ParSignedData>>,
    /// Keys already handed to the aggregator.
    emitted: HashSet<(Duty, PublicKeyBytes)>,
}

pub struct ParSigDb {
    inner: Mutex<Inner>,
    threshold: usize,
    internal_subscribers: Vec<ParSigSubscriber>,
    threshold_subscribers: Vec<ThresholdSubscriber>,
    log: Logger,
}

impl ParSigDb {
    pub fn new(threshold: usize, log: Logger) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sigs: HashMap::new(),
                emitted: HashSet::new(),
            }),
            threshold,
            internal_subscribers: Vec::new(),
            threshold_subscribers: Vec::new(),
            log,
        }
    }

    /// Subscribes to first-time local inserts (wired to the exchange).
    pub fn subscribe_internal(&mut self, subscriber: ParSigSubscriber) {
        self.internal_subscribers.push(subscriber);
    }

    /// Subscribes to threshold-reached events (wired to the aggregator).
    pub fn subscribe_threshold(&mut self, subscriber: ThresholdSubscriber) {
        self.threshold_subscribers.push(subscriber);
    }

    /// Stores partials produced by the local validator client.
    ///
    /// Each `(duty, pubkey)` is processed independently: a double-signing
    /// share only rejects its own pubkey's partial, while the rest of the set
    /// is stored, handed to the exchange and threshold-checked as usual. The
    /// first double-sign error is returned after the whole set is processed.
    pub async fn store_internal(&self, duty: Duty, set: ParSignedDataSet) -> Result<(), Error> {
        let mut fresh = ParSignedDataSet::new();
        let mut double_sign = None;
        for (pubkey, data) in &set {
            match self.insert(duty, *pubkey, data) {
                Ok(InsertOutcome::New) => {
                    fresh.insert(*pubkey, data.clone());
                }
                Ok(InsertOutcome::Duplicate) => {}
                Err(e) => double_sign = double_sign.or(Some(e)),
            }
        }

        if !fresh.is_empty() {
            debug!(
                self.log, "Storing local partial signatures";
                "duty" => %duty, "count" => fresh.len(),
            );
            for subscriber in &self.internal_subscribers {
                subscriber(duty, fresh.clone()).await?;
            }
        }

        self.emit_thresholds(duty, &set).await?;

        match double_sign {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stores partials received from a peer via the exchange. Duplicate
    /// delivery is expected and deduplicated here.
    ///
    /// Like [`Self::store_internal`], pubkeys are independent: one peer's
    /// double-signed share never drops the other validators' partials in the
    /// same delivery.
    pub async fn store_external(&self, duty: Duty, set: ParSignedDataSet) -> Result<(), Error> {
        let mut double_sign = None;
        for (pubkey, data) in &set {
            if let Err(e) = self.insert(duty, *pubkey, data) {
                double_sign = double_sign.or(Some(e));
            }
        }

        self.emit_thresholds(duty, &set).await?;

        match double_sign {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn insert(
        &self,
        duty: Duty,
        pubkey: PublicKeyBytes,
        data: &ParSignedData,
    ) -> Result<InsertOutcome, Error> {
        let mut inner = self.inner.lock();
        let entry = inner.sigs.entry((duty, pubkey)).or_default();

        match entry.get(&data.share_index) {
            None => {
                entry.insert(data.share_index, data.clone());
                Ok(InsertOutcome::New)
            }
            Some(existing) if existing == data => Ok(InsertOutcome::Duplicate),
            Some(existing) => {
                // Two distinct payloads signed by the same share. This is the
                // slashing-critical event the cluster exists to prevent.
                error!(
                    self.log, "Duplicate partial signature from same share";
                    "duty" => %duty,
                    "pubkey" => ?pubkey,
                    "share_index" => data.share_index,
                    "existing_root" => ?existing.message_root(),
                    "conflicting_root" => ?data.message_root(),
                );
                Err(Error::DoubleSign {
                    duty,
                    pubkey,
                    share_index: data.share_index,
                })
            }
        }
    }

    /// Forwards threshold-complete `(duty, pubkey)` sets to the aggregator,
    /// exactly once per key. Payload disagreement between shares is left for
    /// the aggregator to reject.
    async fn emit_thresholds(&self, duty: Duty, touched: &ParSignedDataSet) -> Result<(), Error> {
        let mut ready = Vec::new();
        {
            let mut inner = self.inner.lock();
            for pubkey in touched.keys() {
                let key = (duty, *pubkey);
                let Some(partials) = inner.sigs.get(&key) else {
                    continue;
                };
                if partials.len() >= self.threshold && !inner.emitted.contains(&key) {
                    let partials = partials.clone();
                    inner.emitted.insert(key);
                    ready.push((*pubkey, partials));
                }
            }
        }

        for (pubkey, partials) in ready {
            debug!(
                self.log, "Threshold reached";
                "duty" => %duty, "pubkey" => ?pubkey, "partials" => partials.len(),
            );
            for subscriber in &self.threshold_subscribers {
                subscriber(duty, pubkey, partials.clone()).await?;
            }
        }
        Ok(())
    }

    /// Number of distinct partials stored for `(duty, pubkey)`.
    pub fn partial_count(&self, duty: Duty, pubkey: PublicKeyBytes) -> usize {
        self.inner
            .lock()
            .sigs
            .get(&(duty, pubkey))
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Payload roots currently stored for `(duty, pubkey)`, deduplicated.
    pub fn payload_roots(&self, duty: Duty, pubkey: PublicKeyBytes) -> Vec<Hash256> {
        let inner = self.inner.lock();
        let mut roots = Vec::new();
        if let Some(partials) = inner.sigs.get(&(duty, pubkey)) {
            for data in partials.values() {
                let root = data.message_root();
                if !roots.contains(&root) {
                    roots.push(root);
                }
            }
        }
        roots
    }

    /// Drops all partial state for duties at or before `deadline`.
    pub fn prune(&self, deadline: Slot) {
        let mut inner = self.inner.lock();
        inner.sigs.retain(|(duty, _), _| duty.slot > deadline);
        inner.emitted.retain(|(duty, _)| duty.slot > deadline);
    }
}
