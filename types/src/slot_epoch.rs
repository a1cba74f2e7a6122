//! `Slot` and `Epoch` newtypes with the arithmetic the pipeline needs.
//!
//! Subtraction saturates at zero, matching beacon-chain slot math.

use crate::SLOTS_PER_EPOCH;
use serde::{Deserialize, Serialize};
use ssz::{Decode, DecodeError, Encode};
use std::fmt;
use std::str::FromStr;
use tree_hash::{Hash256, PackedEncoding, TreeHash, TreeHashType};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Slot(#[serde(with = "serde_utils::quoted_u64")] u64);

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Epoch(#[serde(with = "serde_utils::quoted_u64")] u64);

macro_rules! impl_common {
    ($type:ident) => {
        impl $type {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn as_u64(&self) -> u64 {
                self.0
            }

            pub fn saturating_sub(&self, other: u64) -> Self {
                Self(self.0.saturating_sub(other))
            }
        }

        impl From<u64> for $type {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$type> for u64 {
            fn from(value: $type) -> u64 {
                value.0
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $type {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                u64::from_str(s).map(Self)
            }
        }

        impl std::ops::Add<u64> for $type {
            type Output = Self;

            fn add(self, rhs: u64) -> Self {
                Self(self.0.saturating_add(rhs))
            }
        }

        impl Encode for $type {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                8
            }

            fn ssz_bytes_len(&self) -> usize {
                8
            }

            fn ssz_append(&self, buf: &mut Vec<u8>) {
                self.0.ssz_append(buf)
            }
        }

        impl Decode for $type {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                8
            }

            fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
                u64::from_ssz_bytes(bytes).map(Self)
            }
        }

        impl TreeHash for $type {
            fn tree_hash_type() -> TreeHashType {
                u64::tree_hash_type()
            }

            fn tree_hash_packed_encoding(&self) -> PackedEncoding {
                self.0.tree_hash_packed_encoding()
            }

            fn tree_hash_packing_factor() -> usize {
                u64::tree_hash_packing_factor()
            }

            fn tree_hash_root(&self) -> Hash256 {
                self.0.tree_hash_root()
            }
        }
    };
}

impl_common!(Slot);
impl_common!(Epoch);

impl Slot {
    pub fn epoch(&self) -> Epoch {
        Epoch(self.0 / SLOTS_PER_EPOCH)
    }

    /// Position of this slot within its epoch.
    pub fn epoch_offset(&self) -> u64 {
        self.0 % SLOTS_PER_EPOCH
    }

    pub fn is_epoch_start(&self) -> bool {
        self.epoch_offset() == 0
    }
}

impl Epoch {
    pub fn start_slot(&self) -> Slot {
        Slot(self.0 * SLOTS_PER_EPOCH)
    }

    pub fn end_slot(&self) -> Slot {
        Slot((self.0 + 1) * SLOTS_PER_EPOCH - 1)
    }

    pub fn slots(&self) -> impl Iterator<Item = Slot> {
        (self.start_slot().0..=self.end_slot().0).map(Slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_boundaries() {
        assert_eq!(Slot::new(0).epoch(), Epoch::new(0));
        assert_eq!(Slot::new(31).epoch(), Epoch::new(0));
        assert_eq!(Slot::new(32).epoch(), Epoch::new(1));
        assert!(Slot::new(32).is_epoch_start());
        assert!(!Slot::new(33).is_epoch_start());

        assert_eq!(Epoch::new(2).start_slot(), Slot::new(64));
        assert_eq!(Epoch::new(2).end_slot(), Slot::new(95));
        assert_eq!(Epoch::new(1).slots().count(), 32);
    }

    #[test]
    fn saturating_arithmetic() {
        assert_eq!(Slot::new(1).saturating_sub(3), Slot::new(0));
        assert_eq!(Slot::new(5) + 2, Slot::new(7));
    }

    #[test]
    fn serde_quoted() {
        let slot: Slot = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(slot, Slot::new(42));
        assert_eq!(serde_json::to_string(&slot).unwrap(), "\"42\"");
    }
}
