//! Shamir share generation and Lagrange aggregation of partial signatures.
//!
//! Operators sign with distinct shares of one secret polynomial; any
//! `threshold` partial signatures interpolate to the group signature at x=0.
//! Share indices are 1-indexed, index 0 is the group secret itself.

use crate::{Error, PublicKey, SecretKey, Signature, SECRET_KEY_BYTES_LEN, SIGNATURE_BYTES_LEN};
use blst::{
    blst_bendian_from_scalar, blst_fr, blst_fr_add, blst_fr_from_scalar, blst_fr_from_uint64,
    blst_fr_inverse, blst_fr_mul, blst_fr_sub, blst_p2, blst_p2_add_or_double, blst_p2_affine,
    blst_p2_compress, blst_p2_from_affine, blst_p2_mult, blst_p2_uncompress, blst_scalar,
    blst_scalar_from_bendian, blst_scalar_from_fr, BLST_ERROR,
};
use std::collections::BTreeMap;
use zeroize::Zeroize;

/// The result of splitting one group secret into `n` operator shares.
pub struct KeyShares {
    pub group_secret: SecretKey,
    pub group_public: PublicKey,
    /// Share secrets; `shares[i]` belongs to share index `i + 1`.
    pub shares: Vec<SecretKey>,
}

/// Deterministically splits a seeded secret into `n` Shamir shares with
/// reconstruction threshold `t`.
///
/// INSECURE: suitable only for tests and local simnets. Real clusters receive
/// shares from a distributed key generation ceremony and no party ever holds
/// the group secret.
pub fn generate_insecure_key_shares(seed: u64, n: usize, t: usize) -> Result<KeyShares, Error> {
    if t == 0 || t > n {
        return Err(Error::InvalidThreshold { threshold: t, n });
    }

    // Polynomial coefficients a_0..a_{t-1}, each a valid BLS secret scalar.
    let coefficients = (0..t)
        .map(|i| {
            let mut ikm = [0u8; 32];
            ikm[0..8].copy_from_slice(&seed.to_be_bytes());
            ikm[8..16].copy_from_slice(&(i as u64).to_be_bytes());
            ikm[16] = 0x5e;
            SecretKey::from_ikm(&ikm)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let coefficient_frs = coefficients
        .iter()
        .map(|sk| fr_from_secret(sk))
        .collect::<Vec<_>>();

    let shares = (1..=n as u64)
        .map(|index| {
            let eval = poly_eval(&coefficient_frs, fr_from_u64(index));
            secret_from_fr(&eval)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let group_secret = coefficients.into_iter().next().ok_or(Error::InvalidThreshold {
        threshold: t,
        n,
    })?;
    let group_public = group_secret.public_key();

    Ok(KeyShares {
        group_secret,
        group_public,
        shares,
    })
}

/// Combines partial signatures (keyed by 1-indexed share index) into the group
/// signature via Lagrange interpolation at x=0.
///
/// All supplied partials must sign the same message; the caller verifies each
/// partial beforehand and should verify the returned signature against the
/// group public key afterwards.
pub fn combine_partial_signatures(
    partials: &BTreeMap<u64, Signature>,
    threshold: usize,
) -> Result<Signature, Error> {
    if partials.len() < threshold {
        return Err(Error::InsufficientShares {
            got: partials.len(),
            required: threshold,
        });
    }
    if partials.keys().any(|index| *index == 0) {
        return Err(Error::ZeroShareIndex);
    }

    let indices = partials.keys().copied().collect::<Vec<_>>();
    let coefficients = lagrange_coefficients_at_zero(&indices);

    let mut acc: Option<blst_p2> = None;
    for (signature, coefficient) in partials.values().zip(coefficients.iter()) {
        let point = uncompress_signature(signature)?;
        let scaled = p2_mult_fr(&point, coefficient);
        acc = Some(match acc {
            None => scaled,
            Some(total) => p2_add(&total, &scaled),
        });
    }

    // `threshold >= 1` was checked above, so the accumulator is populated.
    let total = acc.ok_or(Error::InsufficientShares {
        got: 0,
        required: threshold,
    })?;

    let mut compressed = [0u8; SIGNATURE_BYTES_LEN];
    unsafe { blst_p2_compress(compressed.as_mut_ptr(), &total) };
    Signature::from_bytes(&compressed)
}

/// `c_i = Π_{j≠i} x_j / (x_j - x_i)` over the BLS scalar field.
fn lagrange_coefficients_at_zero(indices: &[u64]) -> Vec<blst_fr> {
    let xs = indices.iter().map(|i| fr_from_u64(*i)).collect::<Vec<_>>();

    xs.iter()
        .enumerate()
        .map(|(i, x_i)| {
            let mut numerator = fr_one();
            let mut denominator = fr_one();
            for (j, x_j) in xs.iter().enumerate() {
                if i == j {
                    continue;
                }
                numerator = fr_mul(&numerator, x_j);
                denominator = fr_mul(&denominator, &fr_sub(x_j, x_i));
            }
            fr_mul(&numerator, &fr_inverse(&denominator))
        })
        .collect()
}

fn poly_eval(coefficients: &[blst_fr], x: blst_fr) -> blst_fr {
    // Horner, highest coefficient first.
    let mut acc = fr_zero();
    for coefficient in coefficients.iter().rev() {
        acc = fr_add(&fr_mul(&acc, &x), coefficient);
    }
    acc
}

fn fr_from_secret(secret: &SecretKey) -> blst_fr {
    let bytes = secret.to_bytes();
    let mut scalar = blst_scalar::default();
    let mut fr = blst_fr::default();
    unsafe {
        blst_scalar_from_bendian(&mut scalar, bytes.as_ptr());
        blst_fr_from_scalar(&mut fr, &scalar);
    }
    fr
}

fn secret_from_fr(fr: &blst_fr) -> Result<SecretKey, Error> {
    let mut scalar = blst_scalar::default();
    let mut bytes = [0u8; SECRET_KEY_BYTES_LEN];
    unsafe {
        blst_scalar_from_fr(&mut scalar, fr);
        blst_bendian_from_scalar(bytes.as_mut_ptr(), &scalar);
    }
    let secret = SecretKey::from_bytes(&bytes);
    bytes.zeroize();
    secret
}

fn uncompress_signature(signature: &Signature) -> Result<blst_p2, Error> {
    let bytes = signature.to_bytes();
    let mut affine = blst_p2_affine::default();
    let mut point = blst_p2::default();
    unsafe {
        let err = blst_p2_uncompress(&mut affine, bytes.as_ptr());
        if err != BLST_ERROR::BLST_SUCCESS {
            return Err(Error::InvalidBytes(err));
        }
        blst_p2_from_affine(&mut point, &affine);
    }
    Ok(point)
}

fn p2_mult_fr(point: &blst_p2, fr: &blst_fr) -> blst_p2 {
    let mut scalar = blst_scalar::default();
    let mut out = blst_p2::default();
    unsafe {
        blst_scalar_from_fr(&mut scalar, fr);
        blst_p2_mult(&mut out, point, scalar.b.as_ptr(), 255);
    }
    out
}

fn p2_add(a: &blst_p2, b: &blst_p2) -> blst_p2 {
    let mut out = blst_p2::default();
    unsafe { blst_p2_add_or_double(&mut out, a, b) };
    out
}

fn fr_zero() -> blst_fr {
    blst_fr::default()
}

fn fr_one() -> blst_fr {
    fr_from_u64(1)
}

fn fr_from_u64(value: u64) -> blst_fr {
    let limbs = [value, 0, 0, 0];
    let mut fr = blst_fr::default();
    unsafe { blst_fr_from_uint64(&mut fr, limbs.as_ptr()) };
    fr
}

fn fr_add(a: &blst_fr, b: &blst_fr) -> blst_fr {
    let mut out = blst_fr::default();
    unsafe { blst_fr_add(&mut out, a, b) };
    out
}

fn fr_sub(a: &blst_fr, b: &blst_fr) -> blst_fr {
    let mut out = blst_fr::default();
    unsafe { blst_fr_sub(&mut out, a, b) };
    out
}

fn fr_mul(a: &blst_fr, b: &blst_fr) -> blst_fr {
    let mut out = blst_fr::default();
    unsafe { blst_fr_mul(&mut out, a, b) };
    out
}

fn fr_inverse(a: &blst_fr) -> blst_fr {
    let mut out = blst_fr::default();
    unsafe { blst_fr_inverse(&mut out, a) };
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partials_for(
        shares: &KeyShares,
        indices: &[u64],
        message: &[u8],
    ) -> BTreeMap<u64, Signature> {
        indices
            .iter()
            .map(|index| {
                let share = &shares.shares[(*index - 1) as usize];
                (*index, share.sign(message))
            })
            .collect()
    }

    #[test]
    fn threshold_aggregation_matches_group_signature() {
        let shares = generate_insecure_key_shares(1, 4, 3).unwrap();
        let message = [0x22u8; 32];
        let expected = shares.group_secret.sign(&message);

        for subset in [&[1u64, 2, 3][..], &[1, 2, 4], &[2, 3, 4], &[1, 3, 4]] {
            let partials = partials_for(&shares, subset, &message);
            let combined = combine_partial_signatures(&partials, 3).unwrap();
            assert_eq!(combined, expected, "subset {subset:?}");
            combined
                .verify(&shares.group_public, &message)
                .expect("combined signature verifies against group key");
        }
    }

    #[test]
    fn more_than_threshold_also_interpolates() {
        let shares = generate_insecure_key_shares(2, 4, 3).unwrap();
        let message = [0x33u8; 32];
        let partials = partials_for(&shares, &[1, 2, 3, 4], &message);

        let combined = combine_partial_signatures(&partials, 3).unwrap();
        assert_eq!(combined, shares.group_secret.sign(&message));
    }

    #[test]
    fn too_few_shares_rejected() {
        let shares = generate_insecure_key_shares(3, 4, 3).unwrap();
        let partials = partials_for(&shares, &[1, 4], &[0x44u8; 32]);

        match combine_partial_signatures(&partials, 3) {
            Err(Error::InsufficientShares { got: 2, required: 3 }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn partial_signatures_verify_against_share_pubkeys() {
        let shares = generate_insecure_key_shares(4, 4, 3).unwrap();
        let message = [0x55u8; 32];

        for share in &shares.shares {
            let sig = share.sign(&message);
            sig.verify(&share.public_key(), &message).unwrap();
            // A share signature is not the group signature.
            assert!(sig.verify(&shares.group_public, &message).is_err());
        }
    }

    #[test]
    fn zero_share_index_rejected() {
        let shares = generate_insecure_key_shares(5, 4, 3).unwrap();
        let message = [0x66u8; 32];
        let mut partials = partials_for(&shares, &[1, 2], &message);
        partials.insert(0, shares.group_secret.sign(&message));

        assert!(matches!(
            combine_partial_signatures(&partials, 3),
            Err(Error::ZeroShareIndex)
        ));
    }

    #[test]
    fn deterministic_generation() {
        let a = generate_insecure_key_shares(7, 4, 3).unwrap();
        let b = generate_insecure_key_shares(7, 4, 3).unwrap();
        assert_eq!(a.group_public, b.group_public);
        assert_eq!(a.shares[2].to_bytes(), b.shares[2].to_bytes());

        let c = generate_insecure_key_shares(8, 4, 3).unwrap();
        assert!(a.group_public != c.group_public);
    }

    #[test]
    fn invalid_threshold_rejected() {
        assert!(matches!(
            generate_insecure_key_shares(1, 3, 4),
            Err(Error::InvalidThreshold { threshold: 4, n: 3 })
        ));
        assert!(matches!(
            generate_insecure_key_shares(1, 3, 0),
            Err(Error::InvalidThreshold { threshold: 0, n: 3 })
        ));
    }
}
