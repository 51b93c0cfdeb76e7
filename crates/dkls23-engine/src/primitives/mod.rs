//! Primitives facade
//!
//! Scalar/point helpers, hashing into bytes, scalars and points, and the
//! randomness conventions used by every other module.
//!
//! Every function that samples secret material takes an explicit
//! `R: RngCore + CryptoRng`. Drivers pass `OsRng`; tests may pass
//! [`seeded_rng`] for reproducible runs.

pub mod hashes;

pub use hashes::{
    hash, hash_as_point, hash_as_scalar, join_fields, point_from_bytes, point_to_bytes,
    scalar_from_bytes, scalar_to_bytes, x_coordinate, HashOutput, POINT_BYTES,
};

use crate::PartyIndex;
use k256::{
    elliptic_curve::{bigint::U256, ops::Reduce},
    FieldBytes, Scalar,
};
use merlin::Transcript;
use rand_chacha::ChaCha20Rng;
use rand_core::{CryptoRng, RngCore, SeedableRng};

/// ChaCha20 generator with an explicit seed.
pub fn seeded_rng(seed: [u8; 32]) -> ChaCha20Rng {
    ChaCha20Rng::from_seed(seed)
}

/// Fills a fixed-size array from the generator.
pub fn random_bytes<const N: usize, R: RngCore + CryptoRng>(rng: &mut R) -> [u8; N] {
    let mut bytes = [0u8; N];
    rng.fill_bytes(&mut bytes);
    bytes
}

/// Draws a scalar challenge from a Fiat-Shamir transcript.
pub fn challenge_scalar(transcript: &mut Transcript, label: &'static [u8]) -> Scalar {
    let mut bytes = [0u8; 32];
    transcript.challenge_bytes(label, &mut bytes);
    reduce_to_scalar(&bytes)
}

/// Big-endian bytes reduced modulo the group order.
pub fn reduce_to_scalar(bytes: &[u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(*bytes))
}

/// The scalar `i` for party index `i`.
pub fn index_scalar(index: PartyIndex) -> Scalar {
    Scalar::from(u32::from(index))
}

/// Lagrange coefficient at zero for `index` within `set`.
///
/// `set` may or may not contain `index`. Returns `None` when two indices
/// coincide.
pub fn lagrange_coefficient(index: PartyIndex, set: &[PartyIndex]) -> Option<Scalar> {
    let i = index_scalar(index);
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;

    for &other in set {
        if other == index {
            continue;
        }
        let j = index_scalar(other);
        numerator *= j;
        denominator *= j - i;
    }

    Option::<Scalar>::from(denominator.invert()).map(|inverse| numerator * inverse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lagrange_interpolates_constant_term() {
        // p(x) = 7 + 3x
        let eval = |x: u32| Scalar::from(7u32) + Scalar::from(3u32) * Scalar::from(x);
        let set = [1u8, 3];

        let mut secret = Scalar::ZERO;
        for &i in &set {
            let lambda = lagrange_coefficient(i, &set).unwrap();
            secret += lambda * eval(u32::from(i));
        }

        assert_eq!(secret, Scalar::from(7u32));
    }

    #[test]
    fn lagrange_of_single_party_is_one() {
        assert_eq!(lagrange_coefficient(4, &[4]), Some(Scalar::ONE));
    }

    #[test]
    fn transcript_challenges_depend_on_messages() {
        let mut a = Transcript::new(b"test");
        let mut b = Transcript::new(b"test");
        a.append_message(b"m", b"one");
        b.append_message(b"m", b"two");

        assert_ne!(challenge_scalar(&mut a, b"c"), challenge_scalar(&mut b, b"c"));
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let a: [u8; 16] = random_bytes(&mut seeded_rng([9; 32]));
        let b: [u8; 16] = random_bytes(&mut seeded_rng([9; 32]));
        assert_eq!(a, b);
    }
}
