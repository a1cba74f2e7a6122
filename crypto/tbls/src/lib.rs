//! Threshold BLS primitives for the distributed validator.
//!
//! Wraps `blst` (min-pk scheme, G2 signatures) with the small surface the duty
//! pipeline needs: share keys, partial signing/verification and Lagrange
//! aggregation of at least `threshold` partial signatures into one group
//! signature.

mod bytes;
mod threshold;

pub use bytes::{PublicKeyBytes, SignatureBytes, PUBLIC_KEY_BYTES_LEN, SIGNATURE_BYTES_LEN};
pub use threshold::{combine_partial_signatures, generate_insecure_key_shares, KeyShares};

use blst::min_pk as blst_core;
use blst::BLST_ERROR;
use zeroize::Zeroize;

/// Domain separation tag of the beacon-chain signature scheme.
pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

pub const SECRET_KEY_BYTES_LEN: usize = 32;

#[derive(Debug)]
pub enum Error {
    /// The byte representation does not decode to a valid curve point or scalar.
    InvalidBytes(BLST_ERROR),
    /// A signature failed verification against the given public key.
    VerificationFailed,
    /// Fewer distinct shares than required were supplied to the aggregator.
    InsufficientShares { got: usize, required: usize },
    /// A share index was zero. Share indices are 1-indexed.
    ZeroShareIndex,
    /// Threshold parameters are inconsistent (`threshold` must be in `1..=n`).
    InvalidThreshold { threshold: usize, n: usize },
}

/// A BLS secret key (either a group secret or one operator's share).
pub struct SecretKey(blst_core::SecretKey);

impl SecretKey {
    /// Derives a key from at least 32 bytes of input key material.
    pub fn from_ikm(ikm: &[u8]) -> Result<Self, Error> {
        blst_core::SecretKey::key_gen(ikm, &[])
            .map(Self)
            .map_err(Error::InvalidBytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        blst_core::SecretKey::from_bytes(bytes)
            .map(Self)
            .map_err(Error::InvalidBytes)
    }

    pub fn to_bytes(&self) -> [u8; SECRET_KEY_BYTES_LEN] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.sk_to_pk())
    }

    /// Signs a 32-byte signing root.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message, DST, &[]))
    }
}

impl Clone for SecretKey {
    fn clone(&self) -> Self {
        // Round-tripping through bytes is infallible for a valid key; the
        // intermediate buffer is wiped.
        let mut bytes = self.0.to_bytes();
        let copy = blst_core::SecretKey::from_bytes(&bytes)
            .unwrap_or_else(|_| unreachable!("valid secret key round-trips"));
        bytes.zeroize();
        Self(copy)
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey(..)")
    }
}

/// A BLS public key on G1.
#[derive(Clone)]
pub struct PublicKey(blst_core::PublicKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        blst_core::PublicKey::key_validate(bytes)
            .map(Self)
            .map_err(Error::InvalidBytes)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_BYTES_LEN] {
        self.0.to_bytes()
    }

    pub fn compressed(&self) -> PublicKeyBytes {
        PublicKeyBytes(self.to_bytes())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.compressed())
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

/// A BLS signature on G2.
#[derive(Clone)]
pub struct Signature(blst_core::Signature);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        blst_core::Signature::from_bytes(bytes)
            .map(Self)
            .map_err(Error::InvalidBytes)
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_BYTES_LEN] {
        self.0.to_bytes()
    }

    pub fn compressed(&self) -> SignatureBytes {
        SignatureBytes(self.to_bytes())
    }

    /// Verifies `self` over `message` against `pubkey`.
    pub fn verify(&self, pubkey: &PublicKey, message: &[u8]) -> Result<(), Error> {
        match self.0.verify(true, message, DST, &[], &pubkey.0, true) {
            BLST_ERROR::BLST_SUCCESS => Ok(()),
            _ => Err(Error::VerificationFailed),
        }
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.compressed())
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

/// Convenience: verify a compressed signature against a compressed pubkey.
///
/// Decompression failures surface as `InvalidBytes`, a bad signature as
/// `VerificationFailed`.
pub fn verify_compressed(
    pubkey: &PublicKeyBytes,
    message: &[u8],
    signature: &SignatureBytes,
) -> Result<(), Error> {
    let pubkey = PublicKey::from_bytes(pubkey.as_slice())?;
    let signature = Signature::from_bytes(signature.as_slice())?;
    signature.verify(&pubkey, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let sk = SecretKey::from_ikm(&[7u8; 32]).unwrap();
        let pk = sk.public_key();
        let msg = [42u8; 32];

        let sig = sk.sign(&msg);
        sig.verify(&pk, &msg).expect("signature verifies");

        let other = [43u8; 32];
        assert!(sig.verify(&pk, &other).is_err());
    }

    #[test]
    fn compressed_verification() {
        let sk = SecretKey::from_ikm(&[9u8; 32]).unwrap();
        let msg = [1u8; 32];
        let sig = sk.sign(&msg).compressed();
        let pk = sk.public_key().compressed();

        verify_compressed(&pk, &msg, &sig).expect("compressed verification");
        assert!(verify_compressed(&pk, &[2u8; 32], &sig).is_err());
    }

    #[test]
    fn invalid_bytes_rejected() {
        assert!(PublicKey::from_bytes(&[0u8; PUBLIC_KEY_BYTES_LEN]).is_err());
        assert!(Signature::from_bytes(&[1u8; SIGNATURE_BYTES_LEN]).is_err());
    }
}
