//! Additional DTOs of the beacon-node REST API that are not pipeline types.

use dv_types::{Hash256, PublicKeyBytes, Slot};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `{state_id}` path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateId {
    Head,
    Slot(Slot),
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateId::Head => write!(f, "head"),
            StateId::Slot(slot) => write!(f, "{}", slot),
        }
    }
}

impl FromStr for StateId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "head" => Ok(StateId::Head),
            other => other
                .parse::<u64>()
                .map(|slot| StateId::Slot(Slot::new(slot)))
                .map_err(|e| format!("{} cannot be parsed as a state id: {}", other, e)),
        }
    }
}

/// The `{"data": ...}` envelope wrapping most responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericResponse<T> {
    pub data: T,
}

impl<T> GenericResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Envelope of the duty endpoints, carrying the dependent root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DutiesResponse<T> {
    pub dependent_root: Hash256,
    #[serde(default)]
    pub execution_optimistic: bool,
    pub data: T,
}

/// A non-2xx `{code, message}` error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisData {
    #[serde(with = "serde_utils::quoted_u64")]
    pub genesis_time: u64,
    pub genesis_validators_root: Hash256,
    #[serde(with = "serde_utils::bytes_4_hex")]
    pub genesis_fork_version: [u8; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionData {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncingData {
    pub is_syncing: bool,
    #[serde(with = "serde_utils::quoted_u64")]
    pub head_slot: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub sync_distance: u64,
}

/// Body of `POST /eth/v1/beacon/states/{state_id}/validators`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorsRequest {
    pub ids: Vec<PublicKeyBytes>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_id_roundtrip() {
        assert_eq!(StateId::Head.to_string(), "head");
        assert_eq!(StateId::Slot(Slot::new(9)).to_string(), "9");
        assert_eq!("head".parse::<StateId>().unwrap(), StateId::Head);
        assert_eq!(
            "12".parse::<StateId>().unwrap(),
            StateId::Slot(Slot::new(12))
        );
        assert!("latest".parse::<StateId>().is_err());
    }

    #[test]
    fn genesis_serde() {
        let json = r#"{
            "genesis_time": "1606824023",
            "genesis_validators_root": "0x4b363db94e286120d76eb905340fdd4e54bfe9f06bf33ff6cf5ad27f511bfe95",
            "genesis_fork_version": "0x00000000"
        }"#;
        let genesis: GenesisData = serde_json::from_str(json).unwrap();
        assert_eq!(genesis.genesis_time, 1_606_824_023);
        assert_eq!(genesis.genesis_fork_version, [0, 0, 0, 0]);
    }
}
