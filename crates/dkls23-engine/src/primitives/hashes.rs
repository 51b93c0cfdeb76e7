//! Hashing and encoding helpers over secp256k1

use crate::SECURITY;
use k256::{
    elliptic_curve::{
        bigint::U256,
        ops::Reduce,
        point::{AffineCoordinates, DecompressPoint},
        sec1::{FromEncodedPoint, ToEncodedPoint},
        subtle::Choice,
        PrimeField,
    },
    AffinePoint, EncodedPoint, FieldBytes, Scalar,
};
use sha2::{Digest, Sha256};

/// Output of [`hash`]; also the size of seeds and commitments.
pub type HashOutput = [u8; SECURITY];

/// Size of a compressed SEC1 point.
pub const POINT_BYTES: usize = 33;

/// SHA-256 of `len(salt) || salt || msg`.
///
/// The length prefix keeps `(msg, salt)` pairs of different split points from
/// colliding.
pub fn hash(msg: &[u8], salt: &[u8]) -> HashOutput {
    let mut hasher = Sha256::new();
    hasher.update((salt.len() as u64).to_be_bytes());
    hasher.update(salt);
    hasher.update(msg);

    let mut output = [0u8; SECURITY];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// Concatenates `fields`, each behind its length as a big-endian `u64`.
///
/// Used for session ids, so that two field lists never give the same bytes.
pub fn join_fields(fields: &[&[u8]]) -> Vec<u8> {
    let mut output = Vec::with_capacity(fields.iter().map(|field| field.len() + 8).sum());
    for field in fields {
        output.extend_from_slice(&(field.len() as u64).to_be_bytes());
        output.extend_from_slice(field);
    }
    output
}

/// Hashes into the scalar field.
pub fn hash_as_scalar(msg: &[u8], salt: &[u8]) -> Scalar {
    let digest = hash(msg, salt);
    <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(digest))
}

/// Hashes onto the curve by try-and-increment.
///
/// The discrete logarithm of the output is unknown to everybody, which is
/// what the base OT relies on.
pub fn hash_as_point(msg: &[u8], salt: &[u8]) -> AffinePoint {
    let mut counter: u32 = 0;
    loop {
        let candidate = hash(&[msg, &counter.to_be_bytes()].concat(), salt);
        let decompressed = AffinePoint::decompress(&FieldBytes::from(candidate), Choice::from(0));
        if let Some(point) = Option::<AffinePoint>::from(decompressed) {
            return point;
        }
        counter = counter.wrapping_add(1);
    }
}

/// Compressed encoding. The identity maps to all zeros.
pub fn point_to_bytes(point: &AffinePoint) -> [u8; POINT_BYTES] {
    let encoded = point.to_encoded_point(true);
    let bytes = encoded.as_bytes();

    let mut output = [0u8; POINT_BYTES];
    output[..bytes.len()].copy_from_slice(bytes);
    output
}

/// Decodes a SEC1 point (compressed or not).
pub fn point_from_bytes(bytes: &[u8]) -> Option<AffinePoint> {
    let encoded = EncodedPoint::from_bytes(bytes).ok()?;
    Option::from(AffinePoint::from_encoded_point(&encoded))
}

/// Big-endian scalar encoding.
pub fn scalar_to_bytes(scalar: &Scalar) -> [u8; 32] {
    let mut output = [0u8; 32];
    output.copy_from_slice(&scalar.to_bytes());
    output
}

/// Canonical decoding; values not below the group order are rejected.
pub fn scalar_from_bytes(bytes: &[u8; 32]) -> Option<Scalar> {
    Option::from(Scalar::from_repr(FieldBytes::from(*bytes)))
}

/// x-coordinate of a point, big-endian.
pub fn x_coordinate(point: &AffinePoint) -> [u8; 32] {
    let mut output = [0u8; 32];
    output.copy_from_slice(&point.x());
    output
}
