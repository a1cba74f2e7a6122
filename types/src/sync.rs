//! Sync-committee message and contribution containers.

use crate::{Hash256, SignatureBytes, Slot};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::typenum::U128;
use ssz_types::BitVector;
use tree_hash_derive::TreeHash;

/// Participation bits of one sync subcommittee (mainnet preset).
pub type SubcommitteeBits = BitVector<U128>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SyncCommitteeMessage {
    pub slot: Slot,
    pub beacon_block_root: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub validator_index: u64,
    pub signature: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SyncCommitteeContribution {
    pub slot: Slot,
    pub beacon_block_root: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub subcommittee_index: u64,
    pub aggregation_bits: SubcommitteeBits,
    pub signature: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct ContributionAndProof {
    #[serde(with = "serde_utils::quoted_u64")]
    pub aggregator_index: u64,
    pub contribution: SyncCommitteeContribution,
    pub selection_proof: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SignedContributionAndProof {
    pub message: ContributionAndProof,
    pub signature: SignatureBytes,
}

/// The message signed to prove sync-committee aggregator selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SyncAggregatorSelectionData {
    pub slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    pub subcommittee_index: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_hash::TreeHash;

    #[test]
    fn selection_data_root_depends_on_subcommittee() {
        let a = SyncAggregatorSelectionData {
            slot: Slot::new(10),
            subcommittee_index: 0,
        };
        let b = SyncAggregatorSelectionData {
            slot: Slot::new(10),
            subcommittee_index: 1,
        };
        assert_ne!(a.tree_hash_root(), b.tree_hash_root());
    }

    #[test]
    fn contribution_serde_roundtrip() {
        let contribution = SyncCommitteeContribution {
            slot: Slot::new(3),
            beacon_block_root: Hash256::repeat_byte(0x11),
            subcommittee_index: 2,
            aggregation_bits: SubcommitteeBits::new(),
            signature: SignatureBytes::empty(),
        };
        let json = serde_json::to_string(&contribution).unwrap();
        let back: SyncCommitteeContribution = serde_json::from_str(&json).unwrap();
        assert_eq!(contribution, back);
    }
}
