//! The signed-data family: payloads carrying a BLS signature, either partial
//! (by one operator's share) or aggregated (the group signature).

use crate::{
    Attestation, BeaconCommitteeSelection, DutyType, Epoch, Hash256, PublicKeyBytes,
    SignatureBytes, SignedAggregateAndProof, SignedContributionAndProof,
    SignedValidatorRegistration, SignedVoluntaryExit, SigningContext, SyncCommitteeMessage,
    SyncCommitteeSelection, VersionedSignedProposal,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tree_hash::TreeHash;

/// A RANDAO reveal: a signature over the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRandao {
    pub epoch: Epoch,
    pub signature: SignatureBytes,
}

/// Any signed payload flowing through the pipeline.
///
/// The variant determines the signing domain; `message_root()` is the
/// hash-tree-root of the message being signed (before domain separation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SignedData {
    Attestation(Attestation),
    Proposal(VersionedSignedProposal),
    AggregateAndProof(SignedAggregateAndProof),
    SyncMessage(SyncCommitteeMessage),
    SyncContribution(SignedContributionAndProof),
    Randao(SignedRandao),
    VoluntaryExit(SignedVoluntaryExit),
    Registration(SignedValidatorRegistration),
    BeaconCommitteeSelection(BeaconCommitteeSelection),
    SyncCommitteeSelection(SyncCommitteeSelection),
}

impl SignedData {
    pub fn signature(&self) -> SignatureBytes {
        match self {
            SignedData::Attestation(a) => a.signature,
            SignedData::Proposal(p) => p.signature,
            SignedData::AggregateAndProof(a) => a.signature,
            SignedData::SyncMessage(m) => m.signature,
            SignedData::SyncContribution(c) => c.signature,
            SignedData::Randao(r) => r.signature,
            SignedData::VoluntaryExit(e) => e.signature,
            SignedData::Registration(r) => r.signature,
            SignedData::BeaconCommitteeSelection(s) => s.selection_proof,
            SignedData::SyncCommitteeSelection(s) => s.selection_proof,
        }
    }

    /// Returns a copy carrying `signature` instead of the current one.
    pub fn with_signature(&self, signature: SignatureBytes) -> SignedData {
        let mut copy = self.clone();
        match &mut copy {
            SignedData::Attestation(a) => a.signature = signature,
            SignedData::Proposal(p) => p.signature = signature,
            SignedData::AggregateAndProof(a) => a.signature = signature,
            SignedData::SyncMessage(m) => m.signature = signature,
            SignedData::SyncContribution(c) => c.signature = signature,
            SignedData::Randao(r) => r.signature = signature,
            SignedData::VoluntaryExit(e) => e.signature = signature,
            SignedData::Registration(r) => r.signature = signature,
            SignedData::BeaconCommitteeSelection(s) => s.selection_proof = signature,
            SignedData::SyncCommitteeSelection(s) => s.selection_proof = signature,
        }
        copy
    }

    /// Hash-tree-root of the signed message (without domain separation).
    pub fn message_root(&self) -> Hash256 {
        match self {
            SignedData::Attestation(a) => a.data.tree_hash_root(),
            SignedData::Proposal(p) => p.hash_tree_root(),
            SignedData::AggregateAndProof(a) => a.message.tree_hash_root(),
            // Sync messages sign the beacon block root directly.
            SignedData::SyncMessage(m) => m.beacon_block_root,
            SignedData::SyncContribution(c) => c.message.tree_hash_root(),
            SignedData::Randao(r) => r.epoch.tree_hash_root(),
            SignedData::VoluntaryExit(e) => e.message.tree_hash_root(),
            SignedData::Registration(r) => r.message.tree_hash_root(),
            SignedData::BeaconCommitteeSelection(s) => s.slot.tree_hash_root(),
            SignedData::SyncCommitteeSelection(s) => {
                crate::SyncAggregatorSelectionData {
                    slot: s.slot,
                    subcommittee_index: s.subcommittee_index,
                }
                .tree_hash_root()
            }
        }
    }

    /// The duty type whose domain this payload signs under.
    pub fn duty_type(&self) -> DutyType {
        match self {
            SignedData::Attestation(_) => DutyType::Attester,
            SignedData::Proposal(_) => DutyType::Proposer,
            SignedData::AggregateAndProof(_) => DutyType::Aggregator,
            SignedData::SyncMessage(_) => DutyType::SyncMessage,
            SignedData::SyncContribution(_) => DutyType::SyncContribution,
            SignedData::Randao(_) => DutyType::Randao,
            SignedData::VoluntaryExit(_) => DutyType::VoluntaryExit,
            SignedData::Registration(_) => DutyType::BuilderRegistration,
            SignedData::BeaconCommitteeSelection(_) => DutyType::PrepareAggregator,
            SignedData::SyncCommitteeSelection(_) => DutyType::PrepareSyncContribution,
        }
    }

    /// The 32-byte message actually covered by the BLS signature.
    pub fn signing_root(&self, ctx: &SigningContext) -> Hash256 {
        ctx.signing_root(self.duty_type().domain(), self.message_root())
    }
}

/// A partial signature produced by one operator's key share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParSignedData {
    pub signed: SignedData,
    /// 1-indexed share index of the signing operator.
    #[serde(with = "serde_utils::quoted_u64")]
    pub share_index: u64,
}

impl ParSignedData {
    pub fn new(signed: SignedData, share_index: u64) -> Self {
        Self {
            signed,
            share_index,
        }
    }

    pub fn signature(&self) -> SignatureBytes {
        self.signed.signature()
    }

    pub fn message_root(&self) -> Hash256 {
        self.signed.message_root()
    }
}

/// Aggregated (group-signed) payloads for one duty, keyed by group pubkey.
pub type SignedDataSet = BTreeMap<PublicKeyBytes, SignedData>;

/// Partial signatures for one duty, keyed by group pubkey.
pub type ParSignedDataSet = BTreeMap<PublicKeyBytes, ParSignedData>;
