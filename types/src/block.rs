//! Fork-versioned block proposals.
//!
//! The middleware does not interpret execution payloads; a proposal carries an
//! explicit fork version, a blinded flag and a compact body whose tree hash is
//! what the cluster agrees on and what validator clients sign. Byte-level
//! parity with a consensus client's full per-fork bodies is out of scope.

use crate::{Address, Hash256, SignatureBytes, Slot};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumString};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ForkName {
    Phase0,
    Altair,
    Bellatrix,
    Capella,
    Deneb,
    Electra,
}

impl ForkName {
    /// Forks from which block production may return a blinded (builder) block.
    pub fn supports_builder(&self) -> bool {
        *self >= ForkName::Bellatrix
    }
}

/// Compact execution summary: the payload fields the middleware inspects.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct ExecutionSummary {
    pub fee_recipient: Address,
    pub block_hash: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub block_number: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub gas_limit: u64,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct ProposalBody {
    pub randao_reveal: SignatureBytes,
    pub graffiti: Hash256,
    pub execution: ExecutionSummary,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct ProposalMessage {
    pub slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proposer_index: u64,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body: ProposalBody,
}

/// An unsigned proposal as produced by the beacon node's v3 block endpoint.
///
/// The serde form matches the `produceBlockV3` response envelope, so this is
/// both the wire type and the pipeline type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedProposal {
    pub version: ForkName,
    #[serde(rename = "execution_payload_blinded")]
    pub blinded: bool,
    #[serde(rename = "data")]
    pub message: ProposalMessage,
    /// Wei value of the execution payload, reported back to the VC in the
    /// `Eth-Execution-Payload-Value` header.
    #[serde(with = "serde_utils::quoted_u64")]
    pub execution_payload_value: u64,
    /// Gwei consensus-layer reward, reported in `Eth-Consensus-Block-Value`.
    #[serde(with = "serde_utils::quoted_u64")]
    pub consensus_block_value: u64,
}

impl VersionedProposal {
    pub fn slot(&self) -> Slot {
        self.message.slot
    }

    pub fn proposer_index(&self) -> u64 {
        self.message.proposer_index
    }

    pub fn hash_tree_root(&self) -> Hash256 {
        self.message.tree_hash_root()
    }
}

/// A proposal signed by the (distributed) validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedSignedProposal {
    pub version: ForkName,
    pub blinded: bool,
    pub message: ProposalMessage,
    pub signature: SignatureBytes,
}

impl VersionedSignedProposal {
    pub fn slot(&self) -> Slot {
        self.message.slot
    }

    pub fn proposer_index(&self) -> u64 {
        self.message.proposer_index
    }

    pub fn hash_tree_root(&self) -> Hash256 {
        self.message.tree_hash_root()
    }

    pub fn from_proposal(proposal: &VersionedProposal, signature: SignatureBytes) -> Self {
        Self {
            version: proposal.version,
            blinded: proposal.blinded,
            message: proposal.message.clone(),
            signature,
        }
    }
}

impl fmt::Display for VersionedSignedProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} block at slot {}",
            if self.blinded { "blinded " } else { "" },
            self.version,
            self.slot(),
        )
    }
}

/// Parses the `Eth-Consensus-Version` header value.
pub fn fork_from_header(value: &str) -> Option<ForkName> {
    ForkName::from_str(&value.to_lowercase()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn proposal(slot: u64, proposer_index: u64) -> VersionedProposal {
        VersionedProposal {
            version: ForkName::Deneb,
            blinded: false,
            message: ProposalMessage {
                slot: Slot::new(slot),
                proposer_index,
                parent_root: Hash256::repeat_byte(0x01),
                state_root: Hash256::repeat_byte(0x02),
                body: ProposalBody {
                    randao_reveal: SignatureBytes::empty(),
                    graffiti: Hash256::ZERO,
                    execution: ExecutionSummary {
                        fee_recipient: Address::repeat_byte(0x42),
                        block_hash: Hash256::repeat_byte(0x03),
                        block_number: 100,
                        gas_limit: 30_000_000,
                    },
                },
            },
            execution_payload_value: 1_000,
            consensus_block_value: 42,
        }
    }

    #[test]
    fn signed_root_matches_unsigned_root() {
        let unsigned = proposal(64, 7);
        let signed =
            VersionedSignedProposal::from_proposal(&unsigned, SignatureBytes::from([9u8; 96]));
        assert_eq!(unsigned.hash_tree_root(), signed.hash_tree_root());
        assert_eq!(signed.slot(), Slot::new(64));
        assert_eq!(signed.proposer_index(), 7);
    }

    #[test]
    fn fork_ordering_and_parsing() {
        assert!(ForkName::Deneb.supports_builder());
        assert!(!ForkName::Altair.supports_builder());
        assert_eq!(fork_from_header("deneb"), Some(ForkName::Deneb));
        assert_eq!(fork_from_header("Electra"), Some(ForkName::Electra));
        assert_eq!(fork_from_header("unknown"), None);
    }

    #[test]
    fn version_is_explicit_in_serde() {
        let json = serde_json::to_string(&proposal(1, 2)).unwrap();
        assert!(json.contains("\"version\":\"deneb\""));
        assert!(json.contains("\"execution_payload_blinded\":false"));
        assert!(json.contains("\"data\":{"));
    }
}
