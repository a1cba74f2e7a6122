//! Deposit messages and amount validation.

use crate::{Address, Hash256, PublicKeyBytes};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

pub const GWEI_PER_ETH: u64 = 1_000_000_000;

/// Smallest accepted (partial) deposit.
pub const MIN_DEPOSIT_GWEI: u64 = GWEI_PER_ETH;
/// Activation balance and ceiling for standard (`0x01`) credentials.
pub const MAX_STANDARD_DEPOSIT_GWEI: u64 = 32 * GWEI_PER_ETH;
/// Ceiling for compounding (`0x02`) credentials.
pub const MAX_COMPOUNDING_DEPOSIT_GWEI: u64 = 2048 * GWEI_PER_ETH;

const STANDARD_CREDENTIAL_PREFIX: u8 = 0x01;
const COMPOUNDING_CREDENTIAL_PREFIX: u8 = 0x02;

#[derive(Debug, PartialEq, Eq)]
pub enum DepositError {
    AmountTooLow { amount_gwei: u64 },
    AmountTooHigh { amount_gwei: u64, max_gwei: u64 },
    InsufficientTotal { total_gwei: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct DepositMessage {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub amount: u64,
}

impl DepositMessage {
    /// Builds a deposit message for `amount_gwei`, choosing the credential
    /// prefix by the compounding flag and bounding the amount accordingly.
    pub fn new(
        pubkey: PublicKeyBytes,
        withdrawal_address: Address,
        amount_gwei: u64,
        compounding: bool,
    ) -> Result<Self, DepositError> {
        if amount_gwei < MIN_DEPOSIT_GWEI {
            return Err(DepositError::AmountTooLow { amount_gwei });
        }
        let max_gwei = if compounding {
            MAX_COMPOUNDING_DEPOSIT_GWEI
        } else {
            MAX_STANDARD_DEPOSIT_GWEI
        };
        if amount_gwei > max_gwei {
            return Err(DepositError::AmountTooHigh {
                amount_gwei,
                max_gwei,
            });
        }

        let prefix = if compounding {
            COMPOUNDING_CREDENTIAL_PREFIX
        } else {
            STANDARD_CREDENTIAL_PREFIX
        };
        let mut credentials = [0u8; 32];
        credentials[0] = prefix;
        credentials[12..32].copy_from_slice(withdrawal_address.as_slice());

        Ok(Self {
            pubkey,
            withdrawal_credentials: Hash256::from(credentials),
            amount: amount_gwei,
        })
    }
}

/// Validates a set of partial deposit amounts for one validator.
///
/// Every partial must be at least 1 ETH, non-compounding partials may not
/// exceed 32 ETH each, and the total must reach the 32 ETH activation balance.
pub fn verify_deposit_amounts(amounts_gwei: &[u64], compounding: bool) -> Result<(), DepositError> {
    let mut total: u64 = 0;
    for amount_gwei in amounts_gwei.iter().copied() {
        if amount_gwei < MIN_DEPOSIT_GWEI {
            return Err(DepositError::AmountTooLow { amount_gwei });
        }
        if !compounding && amount_gwei > MAX_STANDARD_DEPOSIT_GWEI {
            return Err(DepositError::AmountTooHigh {
                amount_gwei,
                max_gwei: MAX_STANDARD_DEPOSIT_GWEI,
            });
        }
        total = total.saturating_add(amount_gwei);
    }
    if total < MAX_STANDARD_DEPOSIT_GWEI {
        return Err(DepositError::InsufficientTotal { total_gwei: total });
    }
    Ok(())
}

/// File name for deposit-data output, e.g. `deposit-data-32eth.json`.
pub fn deposit_file_name(amount_gwei: Option<u64>) -> String {
    match amount_gwei {
        Some(amount) => format!("deposit-data-{}eth.json", amount / GWEI_PER_ETH),
        None => "deposit-data.json".to_string(),
    }
}
