//! Aggregation-selection DTOs for the distributed-validator selection
//! endpoints (`beacon_committee_selections` / `sync_committee_selections`).
//!
//! The `selection_proof` field carries a partial signature on the way in and
//! the threshold-aggregated proof on the way out.

use crate::{
    SignatureBytes, Slot, SYNC_SUBCOMMITTEE_SIZE, TARGET_AGGREGATORS_PER_COMMITTEE,
    TARGET_AGGREGATORS_PER_SYNC_SUBCOMMITTEE,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconCommitteeSelection {
    #[serde(with = "serde_utils::quoted_u64")]
    pub validator_index: u64,
    pub slot: Slot,
    pub selection_proof: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCommitteeSelection {
    #[serde(with = "serde_utils::quoted_u64")]
    pub validator_index: u64,
    pub slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    pub subcommittee_index: u64,
    pub selection_proof: SignatureBytes,
}

fn proof_hash_mod(proof: &SignatureBytes, modulo: u64) -> bool {
    let digest = ethereum_hashing::hash(proof.as_slice());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[0..8]);
    u64::from_le_bytes(prefix) % modulo == 0
}

/// Whether the aggregated `selection_proof` elects its validator as the
/// attestation aggregator of its committee.
pub fn is_attestation_aggregator(proof: &SignatureBytes, committee_length: u64) -> bool {
    let modulo = std::cmp::max(1, committee_length / TARGET_AGGREGATORS_PER_COMMITTEE);
    proof_hash_mod(proof, modulo)
}

/// Whether the aggregated `selection_proof` elects its validator as a
/// sync-committee aggregator for its subcommittee.
pub fn is_sync_committee_aggregator(proof: &SignatureBytes) -> bool {
    let modulo = std::cmp::max(
        1,
        SYNC_SUBCOMMITTEE_SIZE / TARGET_AGGREGATORS_PER_SYNC_SUBCOMMITTEE,
    );
    proof_hash_mod(proof, modulo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_committee_always_aggregates() {
        // committee_length <= TARGET_AGGREGATORS_PER_COMMITTEE gives modulo 1.
        let proof = SignatureBytes::from([0x37; 96]);
        assert!(is_attestation_aggregator(&proof, 4));
        assert!(is_attestation_aggregator(&proof, 16));
    }

    #[test]
    fn large_committee_selects_subset() {
        // With modulo 8 roughly one in eight proofs is selected; check that
        // selection is a function of the proof bytes alone.
        let selected = (0u8..255)
            .filter(|b| is_attestation_aggregator(&SignatureBytes::from([*b; 96]), 128))
            .count();
        assert!(selected > 0 && selected < 255);

        let proof = SignatureBytes::from([0x42; 96]);
        assert_eq!(
            is_attestation_aggregator(&proof, 128),
            is_attestation_aggregator(&proof, 128),
        );
    }
}
