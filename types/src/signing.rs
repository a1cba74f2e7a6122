//! Beacon-chain signing domains and signing roots.
//!
//! A signature always covers `hash_tree_root(SigningData { object_root,
//! domain })` where the domain commits to the duty kind, the fork version and
//! the genesis validators root.

use crate::{DutyType, Hash256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainType(pub [u8; 4]);

pub const DOMAIN_BEACON_PROPOSER: DomainType = DomainType([0, 0, 0, 0]);
pub const DOMAIN_BEACON_ATTESTER: DomainType = DomainType([1, 0, 0, 0]);
pub const DOMAIN_RANDAO: DomainType = DomainType([2, 0, 0, 0]);
pub const DOMAIN_DEPOSIT: DomainType = DomainType([3, 0, 0, 0]);
pub const DOMAIN_VOLUNTARY_EXIT: DomainType = DomainType([4, 0, 0, 0]);
pub const DOMAIN_SELECTION_PROOF: DomainType = DomainType([5, 0, 0, 0]);
pub const DOMAIN_AGGREGATE_AND_PROOF: DomainType = DomainType([6, 0, 0, 0]);
pub const DOMAIN_SYNC_COMMITTEE: DomainType = DomainType([7, 0, 0, 0]);
pub const DOMAIN_SYNC_COMMITTEE_SELECTION_PROOF: DomainType = DomainType([8, 0, 0, 0]);
pub const DOMAIN_CONTRIBUTION_AND_PROOF: DomainType = DomainType([9, 0, 0, 0]);
pub const DOMAIN_APPLICATION_BUILDER: DomainType = DomainType([0, 0, 0, 1]);

/// Chain parameters every signing root depends on. Sourced from the cluster
/// manifest so all operators derive identical roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningContext {
    #[serde(with = "serde_utils::bytes_4_hex")]
    pub fork_version: [u8; 4],
    pub genesis_validators_root: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub genesis_time: u64,
}

impl SigningContext {
    pub fn domain(&self, domain_type: DomainType) -> [u8; 32] {
        // Builder registrations commit to the genesis fork version only, not
        // to the genesis validators root.
        if domain_type == DOMAIN_APPLICATION_BUILDER {
            compute_domain(domain_type, self.fork_version, Hash256::ZERO)
        } else {
            compute_domain(domain_type, self.fork_version, self.genesis_validators_root)
        }
    }

    pub fn signing_root(&self, domain_type: DomainType, object_root: Hash256) -> Hash256 {
        signing_root(object_root, self.domain(domain_type))
    }
}

/// `hash_tree_root(ForkData)` over two 32-byte leaves.
fn fork_data_root(fork_version: [u8; 4], genesis_validators_root: Hash256) -> Hash256 {
    let mut leaves = [0u8; 64];
    leaves[0..4].copy_from_slice(&fork_version);
    leaves[32..64].copy_from_slice(genesis_validators_root.as_slice());
    tree_hash::merkle_root(&leaves, 0)
}

pub fn compute_domain(
    domain_type: DomainType,
    fork_version: [u8; 4],
    genesis_validators_root: Hash256,
) -> [u8; 32] {
    let fork_root = fork_data_root(fork_version, genesis_validators_root);
    let mut domain = [0u8; 32];
    domain[0..4].copy_from_slice(&domain_type.0);
    domain[4..32].copy_from_slice(&fork_root.as_slice()[0..28]);
    domain
}

/// `hash_tree_root(SigningData { object_root, domain })`.
pub fn signing_root(object_root: Hash256, domain: [u8; 32]) -> Hash256 {
    let mut leaves = [0u8; 64];
    leaves[0..32].copy_from_slice(object_root.as_slice());
    leaves[32..64].copy_from_slice(&domain);
    tree_hash::merkle_root(&leaves, 0)
}

impl DutyType {
    /// The signing domain of the payloads this duty produces.
    pub fn domain(&self) -> DomainType {
        match self {
            DutyType::Proposer => DOMAIN_BEACON_PROPOSER,
            DutyType::Attester => DOMAIN_BEACON_ATTESTER,
            DutyType::Aggregator => DOMAIN_AGGREGATE_AND_PROOF,
            DutyType::SyncMessage => DOMAIN_SYNC_COMMITTEE,
            DutyType::SyncContribution => DOMAIN_CONTRIBUTION_AND_PROOF,
            DutyType::PrepareAggregator => DOMAIN_SELECTION_PROOF,
            DutyType::PrepareSyncContribution => DOMAIN_SYNC_COMMITTEE_SELECTION_PROOF,
            DutyType::Randao => DOMAIN_RANDAO,
            DutyType::BuilderRegistration => DOMAIN_APPLICATION_BUILDER,
            DutyType::VoluntaryExit => DOMAIN_VOLUNTARY_EXIT,
            // InfoSync never signs beacon-chain payloads; the attester domain
            // is a placeholder that is never reached.
            DutyType::InfoSync => DOMAIN_BEACON_ATTESTER,
        }
    }
}
