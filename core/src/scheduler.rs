//! Drives the pipeline from the beacon chain's wall clock.
//!
//! On each slot tick the scheduler resolves the epoch's duties (once, with
//! bounded retries), trims the validator cache on epoch transitions, emits
//! the slot's duty definitions to subscribers and fires slot hooks for
//! garbage collection.

use crate::validator_cache::ValidatorCache;
use crate::{DefinitionSubscriber, Error, SlotSubscriber};
use beacon_client::BeaconApi;
use dv_types::{
    Cluster, Duty, DutyDefinition, DutyDefinitionSet, DutyType, Epoch, Slot,
};
use parking_lot::Mutex;
use slog::{debug, error, info, warn, Logger};
use slot_clock::SlotClock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Attempts to resolve one epoch's duties before giving up on it.
const MAX_RESOLVE_ATTEMPTS: u32 = 3;

struct SchedulerState {
    definitions: HashMap<Duty, DutyDefinitionSet>,
    waiters: Vec<(Duty, oneshot::Sender<DutyDefinitionSet>)>,
    resolved_epoch: Option<Epoch>,
    resolve_attempts: HashMap<Epoch, u32>,
}

pub struct Scheduler<B: BeaconApi, C: SlotClock> {
    beacon: B,
    clock: C,
    cluster: Arc<Cluster>,
    cache: Arc<ValidatorCache<B>>,
    deadline_slots: u64,
    state: Mutex<SchedulerState>,
    duty_subscribers: Vec<DefinitionSubscriber>,
    slot_subscribers: Vec<SlotSubscriber>,
    shutdown: CancellationToken,
    log: Logger,
}

impl<B: BeaconApi, C: SlotClock> Scheduler<B, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        beacon: B,
        clock: C,
        cluster: Arc<Cluster>,
        cache: Arc<ValidatorCache<B>>,
        deadline_slots: u64,
        shutdown: CancellationToken,
        log: Logger,
    ) -> Self {
        Self {
            beacon,
            clock,
            cluster,
            cache,
            deadline_slots,
            state: Mutex::new(SchedulerState {
                definitions: HashMap::new(),
                waiters: Vec::new(),
                resolved_epoch: None,
                resolve_attempts: HashMap::new(),
            }),
            duty_subscribers: Vec::new(),
            slot_subscribers: Vec::new(),
            shutdown,
            log,
        }
    }

    /// Registers a subscriber for emitted duty definitions. Must complete
    /// before the scheduler starts; not thread-safe.
    pub fn subscribe(&mut self, subscriber: DefinitionSubscriber) {
        self.duty_subscribers.push(subscriber);
    }

    /// Registers a per-slot hook (garbage collection, tracking). Must
    /// complete before the scheduler starts; not thread-safe.
    pub fn subscribe_slot(&mut self, subscriber: SlotSubscriber) {
        self.slot_subscribers.push(subscriber);
    }

    /// The slot-tick loop. Runs until shutdown; beacon-node failures are
    /// logged and retried, they never stop the ticker.
    pub async fn run(self: Arc<Self>) {
        info!(self.log, "Scheduler started"; "slot_millis" => self.clock.slot_duration().as_millis());

        loop {
            let Some(sleep) = self.clock.duration_to_next_slot() else {
                // Before genesis; wait a slot and re-check.
                tokio::select! {
                    _ = self.shutdown.cancelled() => return,
                    _ = tokio::time::sleep(self.clock.slot_duration()) => continue,
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(sleep) => {}
            }

            let Some(slot) = self.clock.now() else {
                error!(self.log, "Failed to read slot clock");
                continue;
            };
            self.handle_slot(slot).await;
        }
    }

    /// Processes one slot tick. Public for deterministic tests.
    pub async fn handle_slot(&self, slot: Slot) {
        for subscriber in &self.slot_subscribers {
            subscriber(slot).await;
        }

        let epoch = slot.epoch();
        if let Err(e) = self.ensure_epoch_resolved(epoch, slot).await {
            warn!(
                self.log, "Failed to resolve epoch duties";
                "epoch" => %epoch, "error" => ?e,
            );
        }

        self.emit_slot_duties(slot).await;
        self.prune(slot);
    }

    async fn ensure_epoch_resolved(&self, epoch: Epoch, slot: Slot) -> Result<(), Error> {
        {
            let mut state = self.state.lock();
            if state.resolved_epoch == Some(epoch) {
                return Ok(());
            }
            let attempts = state.resolve_attempts.entry(epoch).or_insert(0);
            if *attempts >= MAX_RESOLVE_ATTEMPTS {
                return Ok(());
            }
            *attempts += 1;
        }

        // Epoch transition: stale validator state must not leak into the new
        // epoch. Trim happens here only; refills are lazy.
        if self
            .state
            .lock()
            .resolved_epoch
            .is_some_and(|prev| prev != epoch)
        {
            self.cache.trim().await;
        }

        let duties = self.resolve_epoch(epoch, slot).await?;

        let mut state = self.state.lock();
        for (duty, set) in duties {
            let entry = state.definitions.entry(duty).or_default();
            entry.extend(set);
            let snapshot = entry.clone();

            let mut kept = Vec::with_capacity(state.waiters.len());
            for (waiter_duty, sender) in state.waiters.drain(..) {
                if waiter_duty == duty {
                    let _ = sender.send(snapshot.clone());
                } else if !sender.is_closed() {
                    kept.push((waiter_duty, sender));
                }
            }
            state.waiters = kept;
        }
        state.resolved_epoch = Some(epoch);
        info!(self.log, "Resolved epoch duties"; "epoch" => %epoch);
        Ok(())
    }

    /// Fetches attester, proposer and sync-committee duties for the epoch and
    /// expands them into per-slot duty definition sets.
    async fn resolve_epoch(
        &self,
        epoch: Epoch,
        slot: Slot,
    ) -> Result<HashMap<Duty, DutyDefinitionSet>, Error> {
        let (validators, refreshed_by_slot) = self.cache.get_by_slot(slot).await?;
        if !refreshed_by_slot {
            debug!(self.log, "Duty resolution using head-state validators"; "epoch" => %epoch);
        }

        let active = validators
            .iter()
            .filter(|v| v.status.is_active())
            .collect::<Vec<_>>();
        let indices = active.iter().map(|v| v.index).collect::<Vec<_>>();
        if indices.is_empty() {
            debug!(self.log, "No active validators in cluster"; "epoch" => %epoch);
            return Ok(HashMap::new());
        }

        let mut duties: HashMap<Duty, DutyDefinitionSet> = HashMap::new();

        let attester = self
            .beacon
            .attester_duties(epoch, &indices)
            .await
            .map_err(Error::BeaconApi)?;
        for definition in attester {
            let pubkey = definition.pubkey;
            for duty_type in [
                DutyType::Attester,
                DutyType::PrepareAggregator,
                DutyType::Aggregator,
            ] {
                duties
                    .entry(Duty::new(definition.slot, duty_type))
                    .or_default()
                    .insert(pubkey, DutyDefinition::Attester(definition.clone()));
            }
        }

        let proposer = self
            .beacon
            .proposer_duties(epoch)
            .await
            .map_err(Error::BeaconApi)?;
        for definition in proposer {
            // The beacon node lists every proposer of the epoch; only cluster
            // validators are ours to perform.
            if self.cluster.validator_by_pubkey(&definition.pubkey).is_none() {
                continue;
            }
            let pubkey = definition.pubkey;
            for duty_type in [DutyType::Proposer, DutyType::Randao] {
                duties
                    .entry(Duty::new(definition.slot, duty_type))
                    .or_default()
                    .insert(pubkey, DutyDefinition::Proposer(definition.clone()));
            }
        }

        let sync = self
            .beacon
            .sync_duties(epoch, &indices)
            .await
            .map_err(Error::BeaconApi)?;
        for definition in sync {
            // Sync committee members produce a message every slot.
            for duty_slot in epoch.slots() {
                for duty_type in [
                    DutyType::SyncMessage,
                    DutyType::PrepareSyncContribution,
                    DutyType::SyncContribution,
                ] {
                    duties
                        .entry(Duty::new(duty_slot, duty_type))
                        .or_default()
                        .insert(
                            definition.pubkey,
                            DutyDefinition::SyncCommittee(definition.clone()),
                        );
                }
            }
        }

        Ok(duties)
    }

    async fn emit_slot_duties(&self, slot: Slot) {
        let to_emit = {
            let state = self.state.lock();
            state
                .definitions
                .iter()
                .filter(|(duty, _)| duty.slot == slot && duty.duty_type.requires_consensus())
                .map(|(duty, set)| (*duty, set.clone()))
                .collect::<Vec<_>>()
        };

        for (duty, set) in to_emit {
            debug!(self.log, "Emitting duty"; "duty" => %duty, "validators" => set.len());
            for subscriber in &self.duty_subscribers {
                if let Err(e) = subscriber(duty, set.clone()).await {
                    warn!(self.log, "Duty subscriber failed"; "duty" => %duty, "error" => ?e);
                }
            }
        }
    }

    /// Blocking lookup of a duty's definitions.
    ///
    /// Returns as soon as the scheduler has resolved the duty (waiting up to
    /// one slot) and *not-found* only after the duty's deadline has passed.
    pub async fn get_duty_definition(&self, duty: Duty) -> Result<DutyDefinitionSet, Error> {
        let deadline = duty.deadline_slot(self.deadline_slots);

        let rx = {
            let mut state = self.state.lock();
            if let Some(set) = state.definitions.get(&duty) {
                return Ok(set.clone());
            }
            if self.clock.now().is_some_and(|now| now > deadline) {
                return Err(Error::DutyNotFound(duty));
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push((duty, tx));
            rx
        };

        let until_deadline = self
            .clock
            .duration_to_slot(deadline + 1)
            .unwrap_or(self.clock.slot_duration());

        tokio::select! {
            _ = self.shutdown.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(until_deadline) => Err(Error::DutyNotFound(duty)),
            set = rx => set.map_err(|_| Error::Cancelled),
        }
    }

    /// Drops definitions whose duty deadline has passed.
    fn prune(&self, slot: Slot) {
        let mut state = self.state.lock();
        let deadline_slots = self.deadline_slots;
        state
            .definitions
            .retain(|duty, _| duty.deadline_slot(deadline_slots) >= slot);
        state
            .resolve_attempts
            .retain(|epoch, _| epoch.end_slot() + deadline_slots >= slot);
    }
}
