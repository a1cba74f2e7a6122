//! Duty definitions: what each cluster validator must do in a given slot.
//!
//! The attester and proposer forms mirror the beacon API duty DTOs so they can
//! be deserialized straight off the `duties/*` endpoints.

use crate::{PublicKeyBytes, Slot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One validator's attestation assignment, as returned by
/// `POST /eth/v1/validator/duties/attester/{epoch}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttesterDefinition {
    pub pubkey: PublicKeyBytes,
    #[serde(with = "serde_utils::quoted_u64")]
    pub validator_index: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub committee_index: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub committee_length: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub committees_at_slot: u64,
    /// Position of the validator within its committee.
    #[serde(with = "serde_utils::quoted_u64")]
    pub validator_committee_index: u64,
    pub slot: Slot,
}

/// One validator's proposal assignment, as returned by
/// `GET /eth/v1/validator/duties/proposer/{epoch}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposerDefinition {
    pub pubkey: PublicKeyBytes,
    #[serde(with = "serde_utils::quoted_u64")]
    pub validator_index: u64,
    pub slot: Slot,
}

/// One validator's sync-committee membership, as returned by
/// `POST /eth/v1/validator/duties/sync/{epoch}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCommitteeDefinition {
    pub pubkey: PublicKeyBytes,
    #[serde(with = "serde_utils::quoted_u64")]
    pub validator_index: u64,
    #[serde(with = "serde_utils::quoted_u64_vec")]
    pub validator_sync_committee_indices: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "definition", rename_all = "snake_case")]
pub enum DutyDefinition {
    Attester(AttesterDefinition),
    Proposer(ProposerDefinition),
    SyncCommittee(SyncCommitteeDefinition),
}

impl DutyDefinition {
    pub fn validator_index(&self) -> u64 {
        match self {
            DutyDefinition::Attester(d) => d.validator_index,
            DutyDefinition::Proposer(d) => d.validator_index,
            DutyDefinition::SyncCommittee(d) => d.validator_index,
        }
    }

    pub fn as_attester(&self) -> Option<&AttesterDefinition> {
        match self {
            DutyDefinition::Attester(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_proposer(&self) -> Option<&ProposerDefinition> {
        match self {
            DutyDefinition::Proposer(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_sync_committee(&self) -> Option<&SyncCommitteeDefinition> {
        match self {
            DutyDefinition::SyncCommittee(d) => Some(d),
            _ => None,
        }
    }
}

/// Definitions for one duty, keyed by validator group public key.
pub type DutyDefinitionSet = BTreeMap<PublicKeyBytes, DutyDefinition>;
