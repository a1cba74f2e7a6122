//! Beacon-chain validator records, as served by `GET /eth/v1/beacon/states/
//! {state_id}/validators`.

use crate::PublicKeyBytes;
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValidatorStatus {
    PendingInitialized,
    PendingQueued,
    ActiveOngoing,
    ActiveExiting,
    ActiveSlashed,
    ExitedUnslashed,
    ExitedSlashed,
    WithdrawalPossible,
    WithdrawalDone,
}

impl ValidatorStatus {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ValidatorStatus::ActiveOngoing
                | ValidatorStatus::ActiveExiting
                | ValidatorStatus::ActiveSlashed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSummary {
    pub pubkey: PublicKeyBytes,
    #[serde(with = "serde_utils::quoted_u64")]
    pub effective_balance: u64,
    pub slashed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorData {
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub balance: u64,
    pub status: ValidatorStatus,
    pub validator: ValidatorSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_activity() {
        assert!(ValidatorStatus::ActiveOngoing.is_active());
        assert!(ValidatorStatus::ActiveExiting.is_active());
        assert!(!ValidatorStatus::ExitedSlashed.is_active());
        assert!(!ValidatorStatus::PendingQueued.is_active());
    }

    #[test]
    fn serde_matches_beacon_api() {
        let json = r#"{
            "index": "42",
            "balance": "32000000000",
            "status": "active_ongoing",
            "validator": {
                "pubkey": "0x93247f2209abcacf57b75a51dafae777f9dd38bc7053d1af526f220a7489a6d3a2753e5f3e8b1cfe39b56f43611df74a",
                "effective_balance": "32000000000",
                "slashed": false
            }
        }"#;
        let data: ValidatorData = serde_json::from_str(json).unwrap();
        assert_eq!(data.index, 42);
        assert_eq!(data.status, ValidatorStatus::ActiveOngoing);
        assert!(!data.validator.slashed);
    }
}
