//! In-memory [`BeaconApi`] implementation for tests and local simnets.
//!
//! Duty data is seeded by the test; all submissions are recorded for
//! assertions. Counters expose how often producers were hit so tests can
//! check fetch deduplication.

use crate::{BeaconApi, Error, GenesisData, StateId, VersionData};
use dv_types::{
    Attestation, AttestationData, AttesterDefinition, Epoch, Hash256, ProposerDefinition,
    PublicKeyBytes, SignatureBytes, SignedAggregateAndProof, SignedContributionAndProof,
    SignedValidatorRegistration, SignedVoluntaryExit, Slot, SyncCommitteeContribution,
    SyncCommitteeDefinition, SyncCommitteeMessage, ValidatorData, VersionedProposal,
    VersionedSignedProposal,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct State {
    genesis: Option<GenesisData>,
    validators: Vec<ValidatorData>,
    attester_duties: HashMap<Epoch, Vec<AttesterDefinition>>,
    proposer_duties: HashMap<Epoch, Vec<ProposerDefinition>>,
    sync_duties: HashMap<Epoch, Vec<SyncCommitteeDefinition>>,
    attestation_data: HashMap<(Slot, u64), AttestationData>,
    proposals: HashMap<Slot, VersionedProposal>,
    aggregates: HashMap<(Slot, Hash256), Attestation>,
    contributions: HashMap<(Slot, u64, Hash256), SyncCommitteeContribution>,

    submitted_attestations: Vec<Attestation>,
    submitted_proposals: Vec<VersionedSignedProposal>,
    submitted_aggregates: Vec<SignedAggregateAndProof>,
    submitted_sync_messages: Vec<SyncCommitteeMessage>,
    submitted_contributions: Vec<SignedContributionAndProof>,
    submitted_exits: Vec<SignedVoluntaryExit>,
    submitted_registrations: Vec<SignedValidatorRegistration>,

    attestation_data_requests: u64,
    proposal_requests: u64,
    /// When set, `validators` queries for a slot-keyed state fail, forcing
    /// callers onto the head fallback.
    fail_validators_by_slot: bool,
    /// Remaining submission calls to fail with a 503, for retry tests.
    failing_submissions: u32,
}

#[derive(Clone, Default)]
pub struct MockBeaconNode {
    state: Arc<Mutex<State>>,
}

impl MockBeaconNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_genesis(&self, genesis: GenesisData) {
        self.state.lock().genesis = Some(genesis);
    }

    pub fn set_validators(&self, validators: Vec<ValidatorData>) {
        self.state.lock().validators = validators;
    }

    pub fn set_attester_duties(&self, epoch: Epoch, duties: Vec<AttesterDefinition>) {
        self.state.lock().attester_duties.insert(epoch, duties);
    }

    pub fn set_proposer_duties(&self, epoch: Epoch, duties: Vec<ProposerDefinition>) {
        self.state.lock().proposer_duties.insert(epoch, duties);
    }

    pub fn set_sync_duties(&self, epoch: Epoch, duties: Vec<SyncCommitteeDefinition>) {
        self.state.lock().sync_duties.insert(epoch, duties);
    }

    pub fn set_attestation_data(&self, slot: Slot, committee_index: u64, data: AttestationData) {
        self.state
            .lock()
            .attestation_data
            .insert((slot, committee_index), data);
    }

    pub fn set_proposal(&self, slot: Slot, proposal: VersionedProposal) {
        self.state.lock().proposals.insert(slot, proposal);
    }

    pub fn set_aggregate(&self, slot: Slot, data_root: Hash256, aggregate: Attestation) {
        self.state.lock().aggregates.insert((slot, data_root), aggregate);
    }

    pub fn set_contribution(
        &self,
        slot: Slot,
        subcommittee_index: u64,
        block_root: Hash256,
        contribution: SyncCommitteeContribution,
    ) {
        self.state
            .lock()
            .contributions
            .insert((slot, subcommittee_index, block_root), contribution);
    }

    pub fn set_fail_validators_by_slot(&self, fail: bool) {
        self.state.lock().fail_validators_by_slot = fail;
    }

    /// Makes the next `count` submission calls fail with a 503.
    pub fn fail_next_submissions(&self, count: u32) {
        self.state.lock().failing_submissions = count;
    }

    fn check_submission(&self) -> Result<(), Error> {
        let mut guard = self.state.lock();
        if guard.failing_submissions > 0 {
            guard.failing_submissions -= 1;
            return Err(Error::StatusCode { status: 503 });
        }
        Ok(())
    }

    pub fn submitted_attestations(&self) -> Vec<Attestation> {
        self.state.lock().submitted_attestations.clone()
    }

    pub fn submitted_proposals(&self) -> Vec<VersionedSignedProposal> {
        self.state.lock().submitted_proposals.clone()
    }

    pub fn submitted_aggregates(&self) -> Vec<SignedAggregateAndProof> {
        self.state.lock().submitted_aggregates.clone()
    }

    pub fn submitted_sync_messages(&self) -> Vec<SyncCommitteeMessage> {
        self.state.lock().submitted_sync_messages.clone()
    }

    pub fn submitted_contributions(&self) -> Vec<SignedContributionAndProof> {
        self.state.lock().submitted_contributions.clone()
    }

    pub fn submitted_exits(&self) -> Vec<SignedVoluntaryExit> {
        self.state.lock().submitted_exits.clone()
    }

    pub fn submitted_registrations(&self) -> Vec<SignedValidatorRegistration> {
        self.state.lock().submitted_registrations.clone()
    }

    pub fn attestation_data_requests(&self) -> u64 {
        self.state.lock().attestation_data_requests
    }

    pub fn proposal_requests(&self) -> u64 {
        self.state.lock().proposal_requests
    }
}

fn missing(what: &str) -> Error {
    Error::ServerMessage {
        status: 500,
        message: format!("mock beacon node: {} not seeded", what),
    }
}

impl BeaconApi for MockBeaconNode {
    async fn genesis(&self) -> Result<GenesisData, Error> {
        self.state.lock().genesis.clone().ok_or_else(|| missing("genesis"))
    }

    async fn node_version(&self) -> Result<VersionData, Error> {
        Ok(VersionData {
            version: "mock/v0.0.0".to_string(),
        })
    }

    async fn validators(
        &self,
        state: StateId,
        pubkeys: &[PublicKeyBytes],
    ) -> Result<Vec<ValidatorData>, Error> {
        let guard = self.state.lock();
        if guard.fail_validators_by_slot && matches!(state, StateId::Slot(_)) {
            return Err(Error::StatusCode { status: 503 });
        }
        Ok(guard
            .validators
            .iter()
            .filter(|v| pubkeys.contains(&v.validator.pubkey))
            .cloned()
            .collect())
    }

    async fn attester_duties(
        &self,
        epoch: Epoch,
        indices: &[u64],
    ) -> Result<Vec<AttesterDefinition>, Error> {
        Ok(self
            .state
            .lock()
            .attester_duties
            .get(&epoch)
            .map(|duties| {
                duties
                    .iter()
                    .filter(|d| indices.contains(&d.validator_index))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn proposer_duties(&self, epoch: Epoch) -> Result<Vec<ProposerDefinition>, Error> {
        Ok(self
            .state
            .lock()
            .proposer_duties
            .get(&epoch)
            .cloned()
            .unwrap_or_default())
    }

    async fn sync_duties(
        &self,
        epoch: Epoch,
        indices: &[u64],
    ) -> Result<Vec<SyncCommitteeDefinition>, Error> {
        Ok(self
            .state
            .lock()
            .sync_duties
            .get(&epoch)
            .map(|duties| {
                duties
                    .iter()
                    .filter(|d| indices.contains(&d.validator_index))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn attestation_data(
        &self,
        slot: Slot,
        committee_index: u64,
    ) -> Result<AttestationData, Error> {
        let mut guard = self.state.lock();
        guard.attestation_data_requests += 1;
        guard
            .attestation_data
            .get(&(slot, committee_index))
            .cloned()
            .ok_or_else(|| missing("attestation data"))
    }

    async fn produce_proposal(
        &self,
        slot: Slot,
        randao_reveal: SignatureBytes,
        graffiti: Option<Hash256>,
        _builder_boost_factor: Option<u64>,
    ) -> Result<VersionedProposal, Error> {
        let mut guard = self.state.lock();
        guard.proposal_requests += 1;
        let mut proposal = guard
            .proposals
            .get(&slot)
            .cloned()
            .ok_or_else(|| missing("proposal"))?;
        // A real beacon node embeds the reveal (and graffiti) in the block.
        proposal.message.body.randao_reveal = randao_reveal;
        if let Some(graffiti) = graffiti {
            proposal.message.body.graffiti = graffiti;
        }
        Ok(proposal)
    }

    async fn aggregate_attestation(
        &self,
        slot: Slot,
        attestation_data_root: Hash256,
    ) -> Result<Option<Attestation>, Error> {
        Ok(self
            .state
            .lock()
            .aggregates
            .get(&(slot, attestation_data_root))
            .cloned())
    }

    async fn sync_contribution(
        &self,
        slot: Slot,
        subcommittee_index: u64,
        beacon_block_root: Hash256,
    ) -> Result<Option<SyncCommitteeContribution>, Error> {
        Ok(self
            .state
            .lock()
            .contributions
            .get(&(slot, subcommittee_index, beacon_block_root))
            .cloned())
    }

    async fn submit_attestations(&self, attestations: &[Attestation]) -> Result<(), Error> {
        self.check_submission()?;
        self.state
            .lock()
            .submitted_attestations
            .extend_from_slice(attestations);
        Ok(())
    }

    async fn submit_proposal(&self, proposal: &VersionedSignedProposal) -> Result<(), Error> {
        self.check_submission()?;
        self.state.lock().submitted_proposals.push(proposal.clone());
        Ok(())
    }

    async fn submit_aggregates(&self, aggregates: &[SignedAggregateAndProof]) -> Result<(), Error> {
        self.check_submission()?;
        self.state
            .lock()
            .submitted_aggregates
            .extend_from_slice(aggregates);
        Ok(())
    }

    async fn submit_sync_messages(&self, messages: &[SyncCommitteeMessage]) -> Result<(), Error> {
        self.check_submission()?;
        self.state
            .lock()
            .submitted_sync_messages
            .extend_from_slice(messages);
        Ok(())
    }

    async fn submit_sync_contributions(
        &self,
        contributions: &[SignedContributionAndProof],
    ) -> Result<(), Error> {
        self.check_submission()?;
        self.state
            .lock()
            .submitted_contributions
            .extend_from_slice(contributions);
        Ok(())
    }

    async fn submit_voluntary_exit(&self, exit: &SignedVoluntaryExit) -> Result<(), Error> {
        self.check_submission()?;
        self.state.lock().submitted_exits.push(exit.clone());
        Ok(())
    }

    async fn register_validators(
        &self,
        registrations: &[SignedValidatorRegistration],
    ) -> Result<(), Error> {
        self.check_submission()?;
        self.state
            .lock()
            .submitted_registrations
            .extend_from_slice(registrations);
        Ok(())
    }
}
