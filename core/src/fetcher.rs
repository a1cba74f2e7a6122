//! Fetches unsigned duty data from the beacon node.
//!
//! Attestation data is fetched once per committee and shared by all
//! validators in it. Proposals block on the aggregated RANDAO reveal;
//! aggregations block on threshold selection proofs. Root-indexed lookups the
//! beacon node cannot answer yet surface as retryable errors.

use crate::aggsigdb::AggSigDb;
use crate::dutydb::DutyDb;
use crate::{Error, UnsignedSubscriber};
use beacon_client::BeaconApi;
use dv_types::{
    is_attestation_aggregator, is_sync_committee_aggregator, AttestationData, AttestationDuty,
    Cluster, Duty, DutyDefinitionSet, DutyType, Hash256, SignedData, UnsignedData,
    UnsignedDataSet, SYNC_SUBCOMMITTEE_SIZE,
};
use slog::{debug, warn, Logger};
use slot_clock::SlotClock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tree_hash::TreeHash;

pub struct Fetcher<B: BeaconApi> {
    beacon: B,
    dutydb: Arc<DutyDb>,
    aggsigdb: Arc<AggSigDb>,
    cluster: Arc<Cluster>,
    graffiti: Option<Hash256>,
    builder_api: bool,
    subscribers: Vec<UnsignedSubscriber>,
    log: Logger,
}

impl<B: BeaconApi> Fetcher<B> {
    pub fn new(
        beacon: B,
        dutydb: Arc<DutyDb>,
        aggsigdb: Arc<AggSigDb>,
        cluster: Arc<Cluster>,
        graffiti: Option<Hash256>,
        builder_api: bool,
        log: Logger,
    ) -> Self {
        Self {
            beacon,
            dutydb,
            aggsigdb,
            cluster,
            graffiti,
            builder_api,
            subscribers: Vec::new(),
            log,
        }
    }

    /// Registers a subscriber for fetched unsigned data sets. Must complete
    /// before duty flow starts; not thread-safe.
    pub fn subscribe(&mut self, subscriber: UnsignedSubscriber) {
        self.subscribers.push(subscriber);
    }

    /// Fetches the unsigned data for `duty` and hands it to subscribers.
    ///
    /// Duties with no eligible validators (e.g. no elected aggregator)
    /// complete silently without data.
    pub async fn fetch(&self, duty: Duty, definitions: DutyDefinitionSet) -> Result<(), Error> {
        let unsigned = match duty.duty_type {
            DutyType::Attester => self.fetch_attester(duty, &definitions).await?,
            DutyType::Proposer => self.fetch_proposer(duty, &definitions).await?,
            DutyType::Aggregator => self.fetch_aggregator(duty, &definitions).await?,
            DutyType::SyncContribution => self.fetch_sync_contribution(duty, &definitions).await?,
            _ => return Err(Error::UnsupportedDuty(duty)),
        };

        if unsigned.is_empty() {
            debug!(self.log, "No unsigned data to fetch"; "duty" => %duty);
            return Ok(());
        }

        for subscriber in &self.subscribers {
            subscriber(duty, unsigned.clone()).await?;
        }
        Ok(())
    }

    async fn fetch_attester(
        &self,
        duty: Duty,
        definitions: &DutyDefinitionSet,
    ) -> Result<UnsignedDataSet, Error> {
        // One fetch per committee, shared across its validators. Still
        // queried per committee index: Electra pins the on-chain index to
        // zero but mainstream validator clients keep asking per committee.
        let mut by_committee: HashMap<u64, AttestationData> = HashMap::new();
        let mut set = UnsignedDataSet::new();

        for (pubkey, definition) in definitions {
            let Some(attester) = definition.as_attester() else {
                continue;
            };
            let data = match by_committee.get(&attester.committee_index) {
                Some(data) => data.clone(),
                None => {
                    let data = self
                        .beacon
                        .attestation_data(duty.slot, attester.committee_index)
                        .await
                        .map_err(Error::BeaconApi)?;
                    by_committee.insert(attester.committee_index, data.clone());
                    data
                }
            };
            set.insert(
                *pubkey,
                UnsignedData::Attestation(AttestationDuty {
                    data,
                    definition: attester.clone(),
                }),
            );
        }
        Ok(set)
    }

    async fn fetch_proposer(
        &self,
        duty: Duty,
        definitions: &DutyDefinitionSet,
    ) -> Result<UnsignedDataSet, Error> {
        let mut set = UnsignedDataSet::new();

        for (pubkey, definition) in definitions {
            if definition.as_proposer().is_none() {
                continue;
            }
            let validator = self
                .cluster
                .validator_by_pubkey(pubkey)
                .ok_or(Error::UnknownPubkey(*pubkey))?;

            // The aggregated RANDAO reveal is a prerequisite for the block.
            let randao = self
                .aggsigdb
                .await_signed(Duty::randao(duty.slot), *pubkey)
                .await?;
            let SignedData::Randao(randao) = randao else {
                return Err(Error::UnexpectedSignedData {
                    duty,
                    expected: "randao",
                });
            };

            let builder_boost_factor = (self.builder_api && validator.builder_enabled)
                .then_some(u64::MAX);
            let proposal = self
                .beacon
                .produce_proposal(duty.slot, randao.signature, self.graffiti, builder_boost_factor)
                .await
                .map_err(Error::BeaconApi)?;

            // A mismatching fee recipient is suspicious but non-fatal.
            let recipient = proposal.message.body.execution.fee_recipient;
            if recipient != validator.fee_recipient {
                warn!(
                    self.log, "Proposal fee recipient does not match configuration";
                    "duty" => %duty,
                    "expected" => ?validator.fee_recipient,
                    "actual" => ?recipient,
                );
            }

            set.insert(*pubkey, UnsignedData::Proposal(proposal));
        }
        Ok(set)
    }

    async fn fetch_aggregator(
        &self,
        duty: Duty,
        definitions: &DutyDefinitionSet,
    ) -> Result<UnsignedDataSet, Error> {
        let mut set = UnsignedDataSet::new();

        for (pubkey, definition) in definitions {
            let Some(attester) = definition.as_attester() else {
                continue;
            };

            let selection = self
                .aggsigdb
                .await_signed(Duty::prepare_aggregator(duty.slot), *pubkey)
                .await?;
            let SignedData::BeaconCommitteeSelection(selection) = selection else {
                return Err(Error::UnexpectedSignedData {
                    duty,
                    expected: "beacon committee selection",
                });
            };

            if !is_attestation_aggregator(&selection.selection_proof, attester.committee_length) {
                debug!(
                    self.log, "Validator not elected aggregator";
                    "duty" => %duty, "pubkey" => ?pubkey,
                );
                continue;
            }

            let data = self
                .dutydb
                .await_att_data(duty.slot, attester.committee_index)
                .await?;
            let root = data.tree_hash_root();
            let aggregate = self
                .beacon
                .aggregate_attestation(duty.slot, root)
                .await
                .map_err(Error::BeaconApi)?
                .ok_or(Error::AggregateNotFound {
                    slot: duty.slot,
                    root,
                })?;

            set.insert(*pubkey, UnsignedData::Aggregate(aggregate));
        }
        Ok(set)
    }

    async fn fetch_sync_contribution(
        &self,
        duty: Duty,
        definitions: &DutyDefinitionSet,
    ) -> Result<UnsignedDataSet, Error> {
        let mut set = UnsignedDataSet::new();

        for (pubkey, definition) in definitions {
            let Some(sync_def) = definition.as_sync_committee() else {
                continue;
            };

            let selection = self
                .aggsigdb
                .await_signed(Duty::prepare_sync_contribution(duty.slot), *pubkey)
                .await?;
            let SignedData::SyncCommitteeSelection(selection) = selection else {
                return Err(Error::UnexpectedSignedData {
                    duty,
                    expected: "sync committee selection",
                });
            };

            if !is_sync_committee_aggregator(&selection.selection_proof) {
                debug!(
                    self.log, "Validator not elected sync aggregator";
                    "duty" => %duty, "pubkey" => ?pubkey,
                );
                continue;
            }

            // The agreed sync-message block root is what the cluster signed.
            let message = self
                .aggsigdb
                .await_signed(Duty::sync_message(duty.slot), *pubkey)
                .await?;
            let SignedData::SyncMessage(message) = message else {
                return Err(Error::UnexpectedSignedData {
                    duty,
                    expected: "sync committee message",
                });
            };

            // Sanity: the selection must match one of this validator's seats.
            let in_subcommittee = sync_def
                .validator_sync_committee_indices
                .iter()
                .any(|index| index / SYNC_SUBCOMMITTEE_SIZE == selection.subcommittee_index);
            if !in_subcommittee {
                warn!(
                    self.log, "Selection proof for foreign subcommittee";
                    "duty" => %duty, "subcommittee" => selection.subcommittee_index,
                );
                continue;
            }

            let contribution = self
                .beacon
                .sync_contribution(
                    duty.slot,
                    selection.subcommittee_index,
                    message.beacon_block_root,
                )
                .await
                .map_err(Error::BeaconApi)?
                .ok_or(Error::SyncContributionNotFound {
                    slot: duty.slot,
                    subcommittee_index: selection.subcommittee_index,
                })?;

            set.insert(*pubkey, UnsignedData::SyncContribution(contribution));
        }
        Ok(set)
    }
}

/// Runs `fetch` with bounded retries until the duty deadline.
///
/// Transient beacon-node failures and root-indexed lookups that are not
/// available yet are retried with doubling backoff; everything else fails
/// immediately.
pub async fn fetch_with_retry<B: BeaconApi, C: SlotClock>(
    fetcher: Arc<Fetcher<B>>,
    clock: C,
    shutdown: CancellationToken,
    deadline_slots: u64,
    duty: Duty,
    definitions: DutyDefinitionSet,
) -> Result<(), Error> {
    let deadline = duty.deadline_slot(deadline_slots);
    let mut backoff = Duration::from_millis(500);

    loop {
        let remaining = clock
            .duration_to_slot(deadline + 1)
            .ok_or(Error::DeadlineExceeded(duty))?;

        let attempt = tokio::select! {
            _ = shutdown.cancelled() => return Err(Error::Cancelled),
            result = tokio::time::timeout(remaining, fetcher.fetch(duty, definitions.clone())) => {
                result.map_err(|_| Error::DeadlineExceeded(duty))?
            }
        };

        match attempt {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() => {
                debug!(
                    fetcher.log, "Retrying duty fetch";
                    "duty" => %duty, "error" => ?e, "backoff_millis" => backoff.as_millis(),
                );
                tokio::select! {
                    _ = shutdown.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = std::cmp::min(backoff * 2, clock.slot_duration());
            }
            Err(e) => return Err(e),
        }
    }
}
