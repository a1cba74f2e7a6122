//! Domain model of the distributed validator middleware.
//!
//! One logical validator is operated by a cluster of nodes, each holding a BLS
//! key share. The types here describe the duties the cluster performs towards
//! the beacon chain and the data that flows through the duty pipeline: duty
//! definitions, unsigned payloads, partial signatures and aggregated signed
//! payloads.
//!
//! All set types are maps keyed by the validator *group* public key. They are
//! plain owned values; `Clone` performs the deep copy handed to subscribers.

mod aggregate;
mod attestation;
mod block;
mod cluster;
mod definition;
mod deposit;
mod duty;
mod exit;
mod registration;
mod selection;
mod signed;
mod signing;
mod slot_epoch;
mod sync;
mod unsigned;
mod validator;

pub use aggregate::{AggregateAndProof, SignedAggregateAndProof};
pub use attestation::{Attestation, AttestationData, Checkpoint, CommitteeBits};
pub use block::{
    ExecutionSummary, ForkName, ProposalBody, ProposalMessage, VersionedProposal,
    VersionedSignedProposal,
};
pub use cluster::{Cluster, ClusterError, ClusterValidator, Operator};
pub use definition::{
    AttesterDefinition, DutyDefinition, DutyDefinitionSet, ProposerDefinition,
    SyncCommitteeDefinition,
};
pub use deposit::{
    deposit_file_name, verify_deposit_amounts, DepositError, DepositMessage, GWEI_PER_ETH,
    MAX_COMPOUNDING_DEPOSIT_GWEI, MAX_STANDARD_DEPOSIT_GWEI, MIN_DEPOSIT_GWEI,
};
pub use duty::{Duty, DutyType};
pub use exit::{SignedVoluntaryExit, VoluntaryExit};
pub use registration::{SignedValidatorRegistration, ValidatorRegistration};
pub use selection::{
    is_attestation_aggregator, is_sync_committee_aggregator, BeaconCommitteeSelection,
    SyncCommitteeSelection,
};
pub use signed::{ParSignedData, ParSignedDataSet, SignedData, SignedDataSet, SignedRandao};
pub use signing::{
    compute_domain, signing_root, DomainType, SigningContext, DOMAIN_AGGREGATE_AND_PROOF,
    DOMAIN_APPLICATION_BUILDER, DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER,
    DOMAIN_CONTRIBUTION_AND_PROOF, DOMAIN_DEPOSIT, DOMAIN_RANDAO, DOMAIN_SELECTION_PROOF,
    DOMAIN_SYNC_COMMITTEE, DOMAIN_SYNC_COMMITTEE_SELECTION_PROOF, DOMAIN_VOLUNTARY_EXIT,
};
pub use slot_epoch::{Epoch, Slot};
pub use sync::{
    ContributionAndProof, SignedContributionAndProof, SubcommitteeBits,
    SyncAggregatorSelectionData, SyncCommitteeContribution, SyncCommitteeMessage,
};
pub use unsigned::{AttestationDuty, UnsignedData, UnsignedDataSet};
pub use validator::{ValidatorData, ValidatorStatus, ValidatorSummary};

pub use alloy_primitives::Address;
pub use tbls::{PublicKeyBytes, SignatureBytes};
pub use tree_hash::Hash256;

/// Slots per epoch (mainnet preset).
pub const SLOTS_PER_EPOCH: u64 = 32;

/// Sync committee size and its division into subnets (mainnet preset).
pub const SYNC_COMMITTEE_SIZE: u64 = 512;
pub const SYNC_COMMITTEE_SUBNET_COUNT: u64 = 4;
pub const SYNC_SUBCOMMITTEE_SIZE: u64 = SYNC_COMMITTEE_SIZE / SYNC_COMMITTEE_SUBNET_COUNT;

/// Modulo applied to the selection-proof hash when electing attestation
/// aggregators: one aggregator is expected per `TARGET_AGGREGATORS_PER_COMMITTEE`.
pub const TARGET_AGGREGATORS_PER_COMMITTEE: u64 = 16;

/// Modulo for sync-committee aggregator election, per subcommittee.
pub const TARGET_AGGREGATORS_PER_SYNC_SUBCOMMITTEE: u64 = 16;
