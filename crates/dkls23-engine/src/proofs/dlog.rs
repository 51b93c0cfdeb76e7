//! Proof of knowledge of a discrete logarithm
//!
//! Non-interactive Schnorr proofs made online-extractable with the randomized
//! Fischlin transform: the prover runs [`R`] independent Schnorr instances and,
//! for each of them, samples [`T`]-bit challenges until the round hash starts
//! with [`L`] zero bits. A cheating prover has to win every round, so the
//! soundness error is `2^(-R*L)`.

use crate::primitives::{hash, point_to_bytes, random_bytes, scalar_to_bytes, HashOutput};
use k256::{elliptic_curve::Field, AffinePoint, ProjectivePoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Number of parallel Schnorr rounds.
pub const R: usize = 64;

/// Proof-of-work bits required of every round hash.
pub const L: usize = 4;

/// Bit length of each round challenge.
pub const T: usize = 32;

const CHALLENGE_BYTES: usize = T / 8;

/// One Schnorr round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveDLogProof {
    pub challenge: Vec<u8>,
    pub challenge_response: Scalar,
}

/// Proof that the prover knows `x` with `point = x * G`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DLogProof {
    pub point: AffinePoint,
    pub rand_commitments: Vec<AffinePoint>,
    pub proofs: Vec<InteractiveDLogProof>,
}

impl DLogProof {
    /// Proves knowledge of `scalar` under `session_id`.
    pub fn prove<Rng: RngCore + CryptoRng>(
        scalar: &Scalar,
        session_id: &[u8],
        rng: &mut Rng,
    ) -> DLogProof {
        let point = (ProjectivePoint::GENERATOR * scalar).to_affine();

        let mut nonces: Vec<Scalar> = (0..R).map(|_| Scalar::random(&mut *rng)).collect();
        let rand_commitments: Vec<AffinePoint> = nonces
            .iter()
            .map(|k| (ProjectivePoint::GENERATOR * k).to_affine())
            .collect();

        let prefix = transcript_prefix(session_id, &point, &rand_commitments);

        let mut proofs = Vec::with_capacity(R);
        for (round, nonce) in nonces.iter().enumerate() {
            loop {
                let challenge: [u8; CHALLENGE_BYTES] = random_bytes(rng);
                let response = nonce - &(challenge_as_scalar(&challenge) * scalar);

                if round_is_valid(&prefix, round, &challenge, &response) {
                    proofs.push(InteractiveDLogProof {
                        challenge: challenge.to_vec(),
                        challenge_response: response,
                    });
                    break;
                }
            }
        }
        nonces.zeroize();

        DLogProof {
            point,
            rand_commitments,
            proofs,
        }
    }

    /// Verifies the proof under `session_id`.
    pub fn verify(&self, session_id: &[u8]) -> bool {
        if self.rand_commitments.len() != R || self.proofs.len() != R {
            return false;
        }
        if self.point == AffinePoint::IDENTITY {
            return false;
        }

        let prefix = transcript_prefix(session_id, &self.point, &self.rand_commitments);
        let point = ProjectivePoint::from(self.point);

        self.proofs
            .iter()
            .zip(self.rand_commitments.iter())
            .enumerate()
            .all(|(round, (proof, commitment))| {
                let challenge: [u8; CHALLENGE_BYTES] = match proof.challenge.as_slice().try_into()
                {
                    Ok(challenge) => challenge,
                    Err(_) => return false,
                };
                if !round_is_valid(&prefix, round, &challenge, &proof.challenge_response) {
                    return false;
                }

                let lhs = ProjectivePoint::GENERATOR * proof.challenge_response
                    + point * challenge_as_scalar(&challenge);
                lhs == ProjectivePoint::from(*commitment)
            })
    }

    /// Proves and commits to the proof in one go.
    pub fn prove_commit<Rng: RngCore + CryptoRng>(
        scalar: &Scalar,
        session_id: &[u8],
        rng: &mut Rng,
    ) -> (DLogProof, HashOutput) {
        let proof = DLogProof::prove(scalar, session_id, rng);
        let commitment = proof.commitment(session_id);
        (proof, commitment)
    }

    /// Hash commitment to the canonical encoding of the proof.
    pub fn commitment(&self, session_id: &[u8]) -> HashOutput {
        hash(&self.to_bytes(), session_id)
    }

    /// Checks that this proof is the one committed to. The proof itself is
    /// not verified here.
    pub fn opens(&self, commitment: &HashOutput, session_id: &[u8]) -> bool {
        self.commitment(session_id).ct_eq(commitment).into()
    }

    /// Commitment check followed by proof verification.
    pub fn decommit_verify(&self, commitment: &HashOutput, session_id: &[u8]) -> bool {
        self.opens(commitment, session_id) && self.verify(session_id)
    }

    /// Canonical byte encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(33 * (R + 1) + (CHALLENGE_BYTES + 32) * R);
        bytes.extend_from_slice(&point_to_bytes(&self.point));
        for commitment in &self.rand_commitments {
            bytes.extend_from_slice(&point_to_bytes(commitment));
        }
        for proof in &self.proofs {
            bytes.extend_from_slice(&proof.challenge);
            bytes.extend_from_slice(&scalar_to_bytes(&proof.challenge_response));
        }
        bytes
    }
}

fn transcript_prefix(
    session_id: &[u8],
    point: &AffinePoint,
    rand_commitments: &[AffinePoint],
) -> HashOutput {
    let mut msg = Vec::with_capacity(33 * (rand_commitments.len() + 1));
    msg.extend_from_slice(&point_to_bytes(point));
    for commitment in rand_commitments {
        msg.extend_from_slice(&point_to_bytes(commitment));
    }
    hash(&msg, &[b"DLogProof".as_slice(), session_id].concat())
}

fn challenge_as_scalar(challenge: &[u8; CHALLENGE_BYTES]) -> Scalar {
    Scalar::from(u32::from_be_bytes(*challenge))
}

fn round_is_valid(
    prefix: &HashOutput,
    round: usize,
    challenge: &[u8; CHALLENGE_BYTES],
    response: &Scalar,
) -> bool {
    let mut msg = Vec::with_capacity(2 + CHALLENGE_BYTES + 32);
    msg.extend_from_slice(&(round as u16).to_be_bytes());
    msg.extend_from_slice(challenge);
    msg.extend_from_slice(&scalar_to_bytes(response));

    leading_zero_bits(&hash(&msg, prefix)) >= L
}

fn leading_zero_bits(digest: &HashOutput) -> usize {
    let mut count = 0;
    for byte in digest {
        if *byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros() as usize;
            break;
        }
    }
    count
}
