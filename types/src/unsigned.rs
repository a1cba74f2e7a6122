//! The unsigned-data family: payloads the cluster must agree on before any
//! operator's validator client signs them.

use crate::{
    Attestation, AttestationData, AttesterDefinition, Hash256, PublicKeyBytes,
    SyncCommitteeContribution, VersionedProposal,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tree_hash::TreeHash;

/// Attestation data paired with the attester definition it satisfies, so that
/// validator clients can be served both the data and their committee position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationDuty {
    pub data: AttestationData,
    pub definition: AttesterDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UnsignedData {
    Attestation(AttestationDuty),
    Proposal(VersionedProposal),
    /// An aggregated attestation awaiting the aggregator's signature.
    Aggregate(Attestation),
    SyncContribution(SyncCommitteeContribution),
}

impl UnsignedData {
    /// Root identifying the payload for equality/conflict checks.
    pub fn payload_root(&self) -> Hash256 {
        match self {
            UnsignedData::Attestation(a) => a.data.tree_hash_root(),
            UnsignedData::Proposal(p) => p.hash_tree_root(),
            UnsignedData::Aggregate(a) => a.data.tree_hash_root(),
            UnsignedData::SyncContribution(c) => c.tree_hash_root(),
        }
    }

    pub fn as_attestation(&self) -> Option<&AttestationDuty> {
        match self {
            UnsignedData::Attestation(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_proposal(&self) -> Option<&VersionedProposal> {
        match self {
            UnsignedData::Proposal(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_aggregate(&self) -> Option<&Attestation> {
        match self {
            UnsignedData::Aggregate(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_sync_contribution(&self) -> Option<&SyncCommitteeContribution> {
        match self {
            UnsignedData::SyncContribution(c) => Some(c),
            _ => None,
        }
    }
}

/// Unsigned payloads for one duty, keyed by validator group public key.
pub type UnsignedDataSet = BTreeMap<PublicKeyBytes, UnsignedData>;
