//! Arithmetic in GF(2^256)
//!
//! Elements are polynomials over GF(2) modulo `x^256 + x^10 + x^5 + x^2 + 1`,
//! stored as four little-endian 64-bit limbs. Bit `j` of the byte encoding is
//! the coefficient of `x^j`. Used by the OT-extension consistency check.

use serde::{Deserialize, Serialize};
use std::ops::{BitXor, BitXorAssign};
use subtle::{Choice, ConstantTimeEq};

/// Low part of the reduction polynomial: `x^10 + x^5 + x^2 + 1`.
const REDUCTION: u64 = 0x425;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldElement(pub [u64; 4]);

impl FieldElement {
    pub const ZERO: FieldElement = FieldElement([0; 4]);
    pub const ONE: FieldElement = FieldElement([1, 0, 0, 0]);

    pub fn from_bytes(bytes: &[u8; 32]) -> FieldElement {
        let mut limbs = [0u64; 4];
        for (limb, chunk) in limbs.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            *limb = u64::from_le_bytes(word);
        }
        FieldElement(limbs)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (chunk, limb) in bytes.chunks_exact_mut(8).zip(self.0.iter()) {
            chunk.copy_from_slice(&limb.to_le_bytes());
        }
        bytes
    }

    /// Coefficient of `x^index`.
    pub fn bit(&self, index: usize) -> u64 {
        (self.0[index / 64] >> (index % 64)) & 1
    }

    fn mul_by_x(&self) -> FieldElement {
        let carry = self.0[3] >> 63;
        let mut limbs = [0u64; 4];
        limbs[0] = self.0[0] << 1;
        for k in 1..4 {
            limbs[k] = (self.0[k] << 1) | (self.0[k - 1] >> 63);
        }
        limbs[0] ^= carry.wrapping_neg() & REDUCTION;
        FieldElement(limbs)
    }

    /// Constant-time product.
    pub fn mul(&self, other: &FieldElement) -> FieldElement {
        let mut result = FieldElement::ZERO;
        for index in (0..256).rev() {
            result = result.mul_by_x();
            let mask = other.bit(index).wrapping_neg();
            for k in 0..4 {
                result.0[k] ^= self.0[k] & mask;
            }
        }
        result
    }

    /// `self` if `bit` is set, zero otherwise, without branching.
    pub fn select(&self, bit: bool) -> FieldElement {
        let mask = u64::from(bit).wrapping_neg();
        FieldElement(self.0.map(|limb| limb & mask))
    }
}

impl BitXor for FieldElement {
    type Output = FieldElement;

    fn bitxor(mut self, rhs: FieldElement) -> FieldElement {
        self ^= rhs;
        self
    }
}

impl BitXorAssign for FieldElement {
    fn bitxor_assign(&mut self, rhs: FieldElement) {
        for (limb, other) in self.0.iter_mut().zip(rhs.0.iter()) {
            *limb ^= other;
        }
    }
}

impl ConstantTimeEq for FieldElement {
    fn ct_eq(&self, other: &FieldElement) -> Choice {
        self.0.ct_eq(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::random_bytes;
    use rand::rngs::OsRng;

    fn random_element() -> FieldElement {
        FieldElement::from_bytes(&random_bytes(&mut OsRng))
    }

    #[test]
    fn bytes_round_trip_keeps_bit_order() {
        let mut bytes = [0u8; 32];
        bytes[1] = 0b0000_0100;
        let element = FieldElement::from_bytes(&bytes);

        assert_eq!(element.bit(10), 1);
        assert_eq!(element.to_bytes(), bytes);
    }

    #[test]
    fn one_is_neutral() {
        let a = random_element();
        assert_eq!(a.mul(&FieldElement::ONE), a);
        assert_eq!(FieldElement::ONE.mul(&a), a);
        assert_eq!(a.mul(&FieldElement::ZERO), FieldElement::ZERO);
    }

    #[test]
    fn product_is_commutative_and_distributive() {
        let (a, b, c) = (random_element(), random_element(), random_element());

        assert_eq!(a.mul(&b), b.mul(&a));
        assert_eq!(a.mul(&(b ^ c)), a.mul(&b) ^ a.mul(&c));
        assert_eq!(a.mul(&b).mul(&c), a.mul(&b.mul(&c)));
    }

    #[test]
    fn top_degree_wraps_to_reduction() {
        let mut x255 = FieldElement::ZERO;
        x255.0[3] = 1 << 63;
        let x = FieldElement([2, 0, 0, 0]);

        assert_eq!(x255.mul(&x), FieldElement([REDUCTION, 0, 0, 0]));
    }

    #[test]
    fn select_masks() {
        let a = random_element();
        assert_eq!(a.select(true), a);
        assert_eq!(a.select(false), FieldElement::ZERO);
    }
}
