//! Base oblivious transfer
//!
//! Endemic-style OT over secp256k1, run once per ordered pair of parties
//! during DKG. The OT sender publishes `z = s*G` with a DLog proof. The OT
//! receiver derives `h` from a public seed and, for every choice bit `b`,
//! sends `(u, v) = (r*h, r*G + b*h)` with an [`EncProof`]. The sender ends up
//! with two keys per instance and the receiver with the one it chose.

use crate::primitives::{
    hash, hash_as_point, point_to_bytes, random_bytes, scalar_to_bytes, HashOutput,
};
use crate::proofs::{DLogProof, EncProof};
use crate::RAW_SECURITY;
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

#[cfg(feature = "multi-thread")]
use crate::primitives::seeded_rng;
#[cfg(feature = "multi-thread")]
use rayon::prelude::*;

/// Public seed from which the OT receiver derives `h`.
pub type Seed = HashOutput;

/// OT sender state: the secret `s` and the nonce used to derive the keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OTSender {
    pub s: Scalar,
    pub nonce: Scalar,
}

/// What the OT sender publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OTSenderMessage {
    pub dlog_proof: DLogProof,
    pub nonce: Scalar,
}

/// OT receiver state.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OTReceiver {
    pub seed: Seed,
}

impl OTSender {
    pub fn init<R: RngCore + CryptoRng>(session_id: &[u8], rng: &mut R) -> (OTSender, OTSenderMessage) {
        let s = Scalar::random(&mut *rng);
        let nonce = Scalar::random(&mut *rng);
        let dlog_proof = DLogProof::prove(&s, session_id, rng);

        (OTSender { s, nonce }, OTSenderMessage { dlog_proof, nonce })
    }

    /// Checks the receiver's encryption proofs and derives both keys of every
    /// instance. Returns `None` if any proof or the seed does not match.
    pub fn run_phase2(
        &self,
        session_id: &[u8],
        seed: &Seed,
        enc_proofs: &[EncProof],
    ) -> Option<(Vec<HashOutput>, Vec<HashOutput>)> {
        if enc_proofs.len() != RAW_SECURITY {
            return None;
        }

        let h = hash_as_point(seed, session_id);
        let proof_is_valid = |proof: &EncProof| proof.base_h() == h && proof.verify(session_id);

        #[cfg(feature = "multi-thread")]
        let all_valid = enc_proofs.par_iter().all(proof_is_valid);
        #[cfg(not(feature = "multi-thread"))]
        let all_valid = enc_proofs.iter().all(proof_is_valid);

        if !all_valid {
            return None;
        }

        let h = ProjectivePoint::from(h);
        let mut keys0 = Vec::with_capacity(RAW_SECURITY);
        let mut keys1 = Vec::with_capacity(RAW_SECURITY);
        for (index, proof) in enc_proofs.iter().enumerate() {
            let (_, v) = proof.get_u_and_v();
            let v = ProjectivePoint::from(v);

            keys0.push(derive_key(session_id, &self.nonce, index, &(v * self.s)));
            keys1.push(derive_key(session_id, &self.nonce, index, &((v - h) * self.s)));
        }

        Some((keys0, keys1))
    }
}

impl OTReceiver {
    pub fn init<R: RngCore + CryptoRng>(rng: &mut R) -> OTReceiver {
        OTReceiver {
            seed: random_bytes(rng),
        }
    }

    /// Encrypts the choice bits. Returns the encryption randomness, which is
    /// needed again in [`OTReceiver::run_phase2`], and the proofs to send.
    pub fn run_phase1<R: RngCore + CryptoRng>(
        &self,
        session_id: &[u8],
        bits: &[bool],
        rng: &mut R,
    ) -> (Vec<Scalar>, Vec<EncProof>) {
        let h = hash_as_point(&self.seed, session_id);
        let vec_r: Vec<Scalar> = bits.iter().map(|_| Scalar::random(&mut *rng)).collect();

        #[cfg(feature = "multi-thread")]
        let enc_proofs = {
            let seeds: Vec<[u8; 32]> = bits.iter().map(|_| random_bytes(&mut *rng)).collect();
            vec_r
                .par_iter()
                .zip(bits.par_iter())
                .zip(seeds.into_par_iter())
                .map(|((r, bit), seed)| {
                    EncProof::prove(session_id, &h, r, *bit, &mut seeded_rng(seed))
                })
                .collect()
        };
        #[cfg(not(feature = "multi-thread"))]
        let enc_proofs = vec_r
            .iter()
            .zip(bits.iter())
            .map(|(r, bit)| EncProof::prove(session_id, &h, r, *bit, &mut *rng))
            .collect();

        (vec_r, enc_proofs)
    }

    /// Verifies the sender's DLog proof and derives the chosen keys.
    pub fn run_phase2(
        &self,
        session_id: &[u8],
        vec_r: &[Scalar],
        sender_message: &OTSenderMessage,
    ) -> Option<Vec<HashOutput>> {
        if !sender_message.dlog_proof.verify(session_id) {
            return None;
        }

        let z = ProjectivePoint::from(sender_message.dlog_proof.point);
        let keys = vec_r
            .iter()
            .enumerate()
            .map(|(index, r)| derive_key(session_id, &sender_message.nonce, index, &(z * r)))
            .collect();
        Some(keys)
    }
}

fn derive_key(session_id: &[u8], nonce: &Scalar, index: usize, point: &ProjectivePoint) -> HashOutput {
    let salt = [
        session_id,
        &scalar_to_bytes(nonce),
        &(index as u16).to_be_bytes(),
    ]
    .concat();
    hash(&point_to_bytes(&point.to_affine()), &salt)
}
