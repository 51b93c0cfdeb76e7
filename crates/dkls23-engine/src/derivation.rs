//! BIP-32 key derivation for threshold keys
//!
//! Only non-hardened derivation is possible: the child tweak depends on the
//! public key and the chain code, which every party knows. Adding the same
//! tweak to every share `p(i)` adds it to the group secret, because the
//! Lagrange coefficients of any signing set sum to one.

use crate::primitives::{point_to_bytes, scalar_from_bytes};
use crate::types::{compute_eth_address, ChainCode, KeyShare};
use crate::{Error, Result};
use derivation_path::{ChildIndex, DerivationPath};
use hmac::{Hmac, Mac};
use k256::{AffinePoint, ProjectivePoint, Scalar};
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

/// Key fingerprint: first bytes of HASH160 of the compressed public key
pub type Fingerprint = [u8; 4];

/// Position of a key in the BIP-32 tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivData {
    pub depth: u8,
    pub child_number: u32,
    pub parent_fingerprint: Fingerprint,
    pub chain_code: ChainCode,
}

impl DerivData {
    /// The master node for `chain_code`.
    pub fn master(chain_code: ChainCode) -> Self {
        Self {
            depth: 0,
            child_number: 0,
            parent_fingerprint: [0; 4],
            chain_code,
        }
    }

    /// Tweak and chain code of child `index` below `public_key`.
    pub fn child_tweak(&self, public_key: &AffinePoint, index: u32) -> Result<(Scalar, ChainCode)> {
        if index >= 1 << 31 {
            return Err(Error::Derivation(
                "Hardened derivation is not supported for threshold keys".into(),
            ));
        }

        let mut hmac = Hmac::<Sha512>::new_from_slice(&self.chain_code)
            .map_err(|e| Error::Derivation(e.to_string()))?;
        hmac.update(&point_to_bytes(public_key));
        hmac.update(&index.to_be_bytes());
        let result = hmac.finalize().into_bytes();

        let mut tweak_bytes = [0u8; 32];
        tweak_bytes.copy_from_slice(&result[..32]);
        let tweak = scalar_from_bytes(&tweak_bytes)
            .ok_or_else(|| Error::Derivation(format!("Invalid tweak for child {index}")))?;

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&result[32..]);

        Ok((tweak, chain_code))
    }

    /// Child `index`: its tweak, public key and position.
    pub fn derive_child(
        &self,
        public_key: &AffinePoint,
        index: u32,
    ) -> Result<(Scalar, AffinePoint, DerivData)> {
        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| Error::Derivation("Maximum depth reached".into()))?;

        let (tweak, chain_code) = self.child_tweak(public_key, index)?;
        let child_key =
            (ProjectivePoint::GENERATOR * tweak + ProjectivePoint::from(*public_key)).to_affine();
        if child_key == AffinePoint::IDENTITY {
            return Err(Error::Derivation(format!("Invalid child key {index}")));
        }

        let child = DerivData {
            depth,
            child_number: index,
            parent_fingerprint: fingerprint(public_key),
            chain_code,
        };
        Ok((tweak, child_key, child))
    }

    /// Follows a path like `m/0/1`. Returns the accumulated tweak, the final
    /// public key and its position.
    pub fn derive_from_path(
        &self,
        public_key: &AffinePoint,
        path: &str,
    ) -> Result<(Scalar, AffinePoint, DerivData)> {
        let path: DerivationPath = path
            .parse()
            .map_err(|e| Error::Derivation(format!("Invalid path: {e}")))?;

        let mut total_tweak = Scalar::ZERO;
        let mut current_key = *public_key;
        let mut current = self.clone();

        for child_index in path.path() {
            let index = match child_index {
                ChildIndex::Normal(index) => *index,
                ChildIndex::Hardened(_) => {
                    return Err(Error::Derivation(
                        "Hardened derivation is not supported for threshold keys".into(),
                    ));
                }
            };

            let (tweak, child_key, child) = current.derive_child(&current_key, index)?;
            total_tweak += tweak;
            current_key = child_key;
            current = child;
        }

        Ok((total_tweak, current_key, current))
    }
}

/// HASH160 fingerprint of a public key
pub fn fingerprint(public_key: &AffinePoint) -> Fingerprint {
    let sha = Sha256::digest(point_to_bytes(public_key));
    let ripemd = Ripemd160::digest(sha);

    let mut output = [0u8; 4];
    output.copy_from_slice(&ripemd[..4]);
    output
}

impl KeyShare {
    /// Share of child `index`.
    pub fn derive_child(&self, index: u32) -> Result<KeyShare> {
        let (tweak, public_key, derivation) =
            self.derivation.derive_child(&self.public_key, index)?;
        Ok(self.with_tweak(tweak, public_key, derivation))
    }

    /// Share of the key at `path`, relative to this one.
    pub fn derive_from_path(&self, path: &str) -> Result<KeyShare> {
        let (tweak, public_key, derivation) =
            self.derivation.derive_from_path(&self.public_key, path)?;
        Ok(self.with_tweak(tweak, public_key, derivation))
    }

    fn with_tweak(&self, tweak: Scalar, public_key: AffinePoint, derivation: DerivData) -> KeyShare {
        let mut child = self.clone();
        child.secret_share += tweak;
        child.public_key = public_key;
        child.eth_address = compute_eth_address(&public_key);
        child.derivation = derivation;
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::elliptic_curve::Field;
    use rand::rngs::OsRng;

    fn master() -> (Scalar, AffinePoint, DerivData) {
        let secret = Scalar::random(&mut OsRng);
        let public_key = (AffinePoint::GENERATOR * secret).to_affine();
        (secret, public_key, DerivData::master([7; 32]))
    }

    #[test]
    fn child_tweak_matches_public_derivation() {
        let (secret, public_key, data) = master();
        let (tweak, child_key, child) = data.derive_child(&public_key, 5).unwrap();

        assert_eq!((AffinePoint::GENERATOR * (secret + tweak)).to_affine(), child_key);
        assert_eq!(child.depth, 1);
        assert_eq!(child.child_number, 5);
        assert_eq!(child.parent_fingerprint, fingerprint(&public_key));
        assert_ne!(child.chain_code, data.chain_code);
    }

    #[test]
    fn path_equals_repeated_children() {
        let (_, public_key, data) = master();

        let (t1, k1, d1) = data.derive_child(&public_key, 0).unwrap();
        let (t2, k2, d2) = d1.derive_child(&k1, 1).unwrap();
        let (tweak, key, derived) = data.derive_from_path(&public_key, "m/0/1").unwrap();

        assert_eq!(tweak, t1 + t2);
        assert_eq!(key, k2);
        assert_eq!(derived, d2);
    }

    #[test]
    fn empty_path_is_identity() {
        let (_, public_key, data) = master();
        let (tweak, key, derived) = data.derive_from_path(&public_key, "m").unwrap();

        assert_eq!(tweak, Scalar::ZERO);
        assert_eq!(key, public_key);
        assert_eq!(derived, data);
    }

    #[test]
    fn hardened_steps_are_rejected() {
        let (_, public_key, data) = master();

        assert!(matches!(
            data.derive_from_path(&public_key, "m/0/1'"),
            Err(Error::Derivation(_))
        ));
        assert!(data.derive_child(&public_key, 1 << 31).is_err());
        assert!(data.derive_from_path(&public_key, "not a path").is_err());
    }

    #[test]
    fn depth_is_capped() {
        let (_, public_key, mut data) = master();
        data.depth = u8::MAX;
        assert!(data.derive_child(&public_key, 0).is_err());
    }
}
