//! Storage for consensus-decided unsigned duty data with blocking reads.
//!
//! Validator-API handlers await values here while consensus runs; `store`
//! fulfils waiters under the same lock that guards the maps, so a reader
//! arriving after a store observes the value immediately. All state strictly
//! older than the duty deadline is pruned on slot ticks.

use crate::Error;
use dv_types::{
    Attestation, AttestationData, Duty, Hash256, PublicKeyBytes, Slot, SyncCommitteeContribution,
    UnsignedData, UnsignedDataSet, VersionedProposal,
};
use parking_lot::Mutex;
use slog::{debug, Logger};
use std::collections::HashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tree_hash::TreeHash;

/// Waiters keyed by lookup key; senders whose receiver has gone away are
/// swept on every store.
struct Waiters<K, V> {
    waiters: Vec<(K, oneshot::Sender<V>)>,
}

impl<K: PartialEq + Copy, V: Clone> Waiters<K, V> {
    fn new() -> Self {
        Self {
            waiters: Vec::new(),
        }
    }

    fn add(&mut self, key: K) -> oneshot::Receiver<V> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push((key, tx));
        rx
    }

    fn fulfil(&mut self, key: K, value: &V) {
        let mut kept = Vec::with_capacity(self.waiters.len());
        for (waiter_key, sender) in self.waiters.drain(..) {
            if waiter_key == key {
                // A dropped receiver is a cancelled waiter, fine to ignore.
                let _ = sender.send(value.clone());
            } else if !sender.is_closed() {
                kept.push((waiter_key, sender));
            }
        }
        self.waiters = kept;
    }
}

struct Inner {
    proposals: HashMap<Slot, VersionedProposal>,
    att_data: HashMap<(Slot, u64), AttestationData>,
    /// `(slot, committee_index, position_in_committee)` → group pubkey.
    att_pubkeys: HashMap<(Slot, u64, u64), PublicKeyBytes>,
    agg_atts: HashMap<(Slot, Hash256), Attestation>,
    contributions: HashMap<(Slot, u64, Hash256), SyncCommitteeContribution>,

    proposal_waiters: Waiters<Slot, VersionedProposal>,
    att_waiters: Waiters<(Slot, u64), AttestationData>,
    agg_waiters: Waiters<(Slot, Hash256), Attestation>,
    contribution_waiters: Waiters<(Slot, u64, Hash256), SyncCommitteeContribution>,
}

pub struct DutyDb {
    inner: Mutex<Inner>,
    shutdown: CancellationToken,
    log: Logger,
}

impl DutyDb {
    pub fn new(shutdown: CancellationToken, log: Logger) -> Self {
        Self {
            inner: Mutex::new(Inner {
                proposals: HashMap::new(),
                att_data: HashMap::new(),
                att_pubkeys: HashMap::new(),
                agg_atts: HashMap::new(),
                contributions: HashMap::new(),
                proposal_waiters: Waiters::new(),
                att_waiters: Waiters::new(),
                agg_waiters: Waiters::new(),
                contribution_waiters: Waiters::new(),
            }),
            shutdown,
            log,
        }
    }

    /// Stores a decided unsigned data set.
    ///
    /// Storing an equal value twice is a no-op; a different value under the
    /// same key is an invariant violation that must abort the node.
    pub fn store(&self, duty: Duty, set: &UnsignedDataSet) -> Result<(), Error> {
        let mut inner = self.inner.lock();

        for (pubkey, unsigned) in set {
            match unsigned {
                UnsignedData::Attestation(att_duty) => {
                    let key = (duty.slot, att_duty.definition.committee_index);
                    store_checked(&mut inner.att_data, duty, key_str(&key), key, &att_duty.data)?;
                    inner.att_waiters.fulfil(key, &att_duty.data);
                    inner.att_pubkeys.insert(
                        (
                            duty.slot,
                            att_duty.definition.committee_index,
                            att_duty.definition.validator_committee_index,
                        ),
                        *pubkey,
                    );
                }
                UnsignedData::Proposal(proposal) => {
                    store_checked(
                        &mut inner.proposals,
                        duty,
                        key_str(&duty.slot),
                        duty.slot,
                        proposal,
                    )?;
                    inner.proposal_waiters.fulfil(duty.slot, proposal);
                }
                UnsignedData::Aggregate(aggregate) => {
                    let key = (duty.slot, aggregate.data.tree_hash_root());
                    store_checked(&mut inner.agg_atts, duty, key_str(&key), key, aggregate)?;
                    inner.agg_waiters.fulfil(key, aggregate);
                }
                UnsignedData::SyncContribution(contribution) => {
                    let key = (
                        duty.slot,
                        contribution.subcommittee_index,
                        contribution.beacon_block_root,
                    );
                    store_checked(&mut inner.contributions, duty, key_str(&key), key, contribution)?;
                    inner.contribution_waiters.fulfil(key, contribution);
                }
            }
        }

        debug!(self.log, "Stored unsigned duty data"; "duty" => %duty, "validators" => set.len());
        Ok(())
    }

    pub async fn await_proposal(&self, slot: Slot) -> Result<VersionedProposal, Error> {
        let rx = {
            let mut inner = self.inner.lock();
            if let Some(proposal) = inner.proposals.get(&slot) {
                return Ok(proposal.clone());
            }
            inner.proposal_waiters.add(slot)
        };
        self.wait(rx).await
    }

    pub async fn await_att_data(
        &self,
        slot: Slot,
        committee_index: u64,
    ) -> Result<AttestationData, Error> {
        let rx = {
            let mut inner = self.inner.lock();
            if let Some(data) = inner.att_data.get(&(slot, committee_index)) {
                return Ok(data.clone());
            }
            inner.att_waiters.add((slot, committee_index))
        };
        self.wait(rx).await
    }

    pub async fn await_agg_attestation(
        &self,
        slot: Slot,
        att_data_root: Hash256,
    ) -> Result<Attestation, Error> {
        let rx = {
            let mut inner = self.inner.lock();
            if let Some(aggregate) = inner.agg_atts.get(&(slot, att_data_root)) {
                return Ok(aggregate.clone());
            }
            inner.agg_waiters.add((slot, att_data_root))
        };
        self.wait(rx).await
    }

    pub async fn await_sync_contribution(
        &self,
        slot: Slot,
        subcommittee_index: u64,
        block_root: Hash256,
    ) -> Result<SyncCommitteeContribution, Error> {
        let rx = {
            let mut inner = self.inner.lock();
            if let Some(contribution) =
                inner.contributions.get(&(slot, subcommittee_index, block_root))
            {
                return Ok(contribution.clone());
            }
            inner
                .contribution_waiters
                .add((slot, subcommittee_index, block_root))
        };
        self.wait(rx).await
    }

    /// Deterministic reverse lookup once attestation data is stored. The
    /// position is the validator's index within its committee, recoverable
    /// from a submitted attestation's aggregation bit.
    pub fn pubkey_by_attestation(
        &self,
        slot: Slot,
        committee_index: u64,
        position_in_committee: u64,
    ) -> Option<PublicKeyBytes> {
        self.inner
            .lock()
            .att_pubkeys
            .get(&(slot, committee_index, position_in_committee))
            .copied()
    }

    /// Non-blocking read of stored attestation data.
    pub fn att_data(&self, slot: Slot, committee_index: u64) -> Option<AttestationData> {
        self.inner.lock().att_data.get(&(slot, committee_index)).cloned()
    }

    /// Drops all state for slots at or before `deadline`.
    pub fn prune(&self, deadline: Slot) {
        let mut inner = self.inner.lock();
        inner.proposals.retain(|slot, _| *slot > deadline);
        inner.att_data.retain(|(slot, _), _| *slot > deadline);
        inner.att_pubkeys.retain(|(slot, _, _), _| *slot > deadline);
        inner.agg_atts.retain(|(slot, _), _| *slot > deadline);
        inner.contributions.retain(|(slot, _, _), _| *slot > deadline);
    }

    async fn wait<V>(&self, rx: oneshot::Receiver<V>) -> Result<V, Error> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(Error::Cancelled),
            value = rx => value.map_err(|_| Error::Cancelled),
        }
    }
}

fn key_str<K: std::fmt::Debug>(key: &K) -> String {
    format!("{:?}", key)
}

fn store_checked<K, V>(
    map: &mut HashMap<K, V>,
    duty: Duty,
    key: String,
    map_key: K,
    value: &V,
) -> Result<(), Error>
where
    K: std::hash::Hash + Eq,
    V: Clone + PartialEq,
{
    match map.get(&map_key) {
        None => {
            map.insert(map_key, value.clone());
            Ok(())
        }
        Some(existing) if existing == value => Ok(()),
        Some(_) => Err(Error::ConflictingStore {
            duty_type: duty.duty_type,
            key,
        }),
    }
}
