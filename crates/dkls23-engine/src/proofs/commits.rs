//! Salted hash commitments

use crate::primitives::{hash, point_to_bytes, random_bytes, HashOutput};
use crate::SECURITY;
use k256::AffinePoint;
use rand_core::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;

/// Salt length in bytes.
pub const SALT_LEN: usize = 2 * SECURITY;

/// Commits to `msg` with a fresh salt. The salt stays with the committer
/// until the reveal.
pub fn commit<R: RngCore + CryptoRng>(rng: &mut R, msg: &[u8]) -> (HashOutput, Vec<u8>) {
    let salt: [u8; SALT_LEN] = random_bytes(rng);
    (commit_with_salt(msg, &salt), salt.to_vec())
}

/// Deterministic part of [`commit`].
pub fn commit_with_salt(msg: &[u8], salt: &[u8]) -> HashOutput {
    hash(msg, salt)
}

/// Checks that `(msg, salt)` opens `commitment`.
pub fn verify_commitment(msg: &[u8], commitment: &HashOutput, salt: &[u8]) -> bool {
    if salt.len() != SALT_LEN {
        return false;
    }
    commit_with_salt(msg, salt).ct_eq(commitment).into()
}

/// [`commit`] for a curve point.
pub fn commit_point<R: RngCore + CryptoRng>(
    rng: &mut R,
    point: &AffinePoint,
) -> (HashOutput, Vec<u8>) {
    commit(rng, &point_to_bytes(point))
}

/// [`verify_commitment`] for a curve point.
pub fn verify_commitment_point(point: &AffinePoint, commitment: &HashOutput, salt: &[u8]) -> bool {
    verify_commitment(&point_to_bytes(point), commitment, salt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::{elliptic_curve::Field, Scalar};
    use rand::rngs::OsRng;

    #[test]
    fn opens_with_the_right_salt() {
        let (commitment, salt) = commit(&mut OsRng, b"chain code");
        assert!(verify_commitment(b"chain code", &commitment, &salt));
    }

    #[test]
    fn rejects_other_message_or_salt() {
        let (commitment, mut salt) = commit(&mut OsRng, b"chain code");
        assert!(!verify_commitment(b"chain codf", &commitment, &salt));

        salt[0] ^= 1;
        assert!(!verify_commitment(b"chain code", &commitment, &salt));
        assert!(!verify_commitment(b"chain code", &commitment, &salt[1..]));
    }

    #[test]
    fn point_commitment() {
        let point = (AffinePoint::GENERATOR * Scalar::random(&mut OsRng)).to_affine();
        let other = (AffinePoint::GENERATOR * Scalar::random(&mut OsRng)).to_affine();
        let (commitment, salt) = commit_point(&mut OsRng, &point);

        assert!(verify_commitment_point(&point, &commitment, &salt));
        assert!(!verify_commitment_point(&other, &commitment, &salt));
    }
}
