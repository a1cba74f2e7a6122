//! Attestation containers.

use crate::{Epoch, Hash256, SignatureBytes, Slot};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::typenum::U2048;
use ssz_types::BitList;
use tree_hash_derive::TreeHash;

/// Aggregation bits sized for the mainnet committee bound.
pub type CommitteeBits = BitList<U2048>;

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: Hash256,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct AttestationData {
    pub slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,
    pub beacon_block_root: Hash256,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Attestation {
    pub aggregation_bits: CommitteeBits,
    pub data: AttestationData,
    pub signature: SignatureBytes,
}

impl Attestation {
    /// An unsigned single-validator attestation with the bit at
    /// `committee_position` set.
    pub fn unsigned(
        data: AttestationData,
        committee_position: usize,
        committee_length: usize,
    ) -> Result<Self, ssz_types::Error> {
        let mut aggregation_bits = CommitteeBits::with_capacity(committee_length)?;
        aggregation_bits.set(committee_position, true)?;
        Ok(Self {
            aggregation_bits,
            data,
            signature: SignatureBytes::empty(),
        })
    }
}
