//! Compressed byte-array forms of public keys and signatures.
//!
//! These are the forms that flow through the duty pipeline, serde-encoded as
//! 0x-prefixed hex and SSZ-encoded as fixed-length byte vectors. Decompression
//! to curve points happens only at verification/aggregation boundaries.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ssz::{Decode, DecodeError, Encode};
use std::fmt;
use std::str::FromStr;
use tree_hash::{Hash256, PackedEncoding, TreeHash, TreeHashType};

pub const PUBLIC_KEY_BYTES_LEN: usize = 48;
pub const SIGNATURE_BYTES_LEN: usize = 96;

macro_rules! bytes_struct {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) [u8; $len]);

        impl $name {
            pub fn empty() -> Self {
                Self([0; $len])
            }

            pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
                if bytes.len() != $len {
                    return Err(format!(
                        "expected {} bytes, got {}",
                        $len,
                        bytes.len()
                    ));
                }
                let mut array = [0; $len];
                array.copy_from_slice(bytes);
                Ok(Self(array))
            }

            pub fn as_slice(&self) -> &[u8] {
                &self.0
            }

            pub fn into_inner(self) -> [u8; $len] {
                self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Keys are long; the first few bytes identify them in logs.
                write!(f, "0x{}…", hex::encode(&self.0[0..4]))
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let stripped = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(stripped).map_err(|e| format!("invalid hex: {}", e))?;
                Self::from_bytes(&bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_str(&s).map_err(serde::de::Error::custom)
            }
        }

        impl Encode for $name {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $len
            }

            fn ssz_bytes_len(&self) -> usize {
                $len
            }

            fn ssz_append(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.0)
            }
        }

        impl Decode for $name {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $len
            }

            fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
                Self::from_bytes(bytes).map_err(|_| DecodeError::InvalidByteLength {
                    len: bytes.len(),
                    expected: $len,
                })
            }
        }

        impl TreeHash for $name {
            fn tree_hash_type() -> TreeHashType {
                TreeHashType::Vector
            }

            fn tree_hash_packed_encoding(&self) -> PackedEncoding {
                unreachable!("Vector should never be packed")
            }

            fn tree_hash_packing_factor() -> usize {
                unreachable!("Vector should never be packed")
            }

            fn tree_hash_root(&self) -> Hash256 {
                tree_hash::merkle_root(&self.0, 0)
            }
        }
    };
}

bytes_struct!(
    PublicKeyBytes,
    PUBLIC_KEY_BYTES_LEN,
    "A compressed BLS public key; either a validator group key or one share's pubkey."
);
bytes_struct!(
    SignatureBytes,
    SIGNATURE_BYTES_LEN,
    "A compressed BLS signature; partial or aggregated."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let mut raw = [0u8; PUBLIC_KEY_BYTES_LEN];
        raw[0] = 0xab;
        raw[47] = 0x01;
        let pk = PublicKeyBytes::from(raw);

        let encoded = pk.to_string();
        assert!(encoded.starts_with("0xab"));
        assert_eq!(PublicKeyBytes::from_str(&encoded).unwrap(), pk);
    }

    #[test]
    fn serde_json_form() {
        let sig = SignatureBytes::from([0x11; SIGNATURE_BYTES_LEN]);
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "11".repeat(SIGNATURE_BYTES_LEN)));
        let back: SignatureBytes = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn length_checked() {
        assert!(PublicKeyBytes::from_bytes(&[0u8; 47]).is_err());
        assert!(SignatureBytes::from_bytes(&[0u8; 95]).is_err());
    }
}
