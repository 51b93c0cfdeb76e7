//! Chaum-Pedersen proofs and the OR-proof used by the base OT
//!
//! A [`CPProof`] shows that `point_u = x * base_g` and `point_v = x * base_h`
//! for the same `x`. [`EncProof`] combines two of them, one simulated, to show
//! that an OT receiver's ciphertext `(u, v) = (r*h, r*G + b*h)` encodes a bit.

use crate::primitives::{challenge_scalar, point_to_bytes};
use k256::{elliptic_curve::Field, AffinePoint, ProjectivePoint, Scalar};
use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// First prover message of a Chaum-Pedersen proof.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomCommitments {
    pub rc_g: AffinePoint,
    pub rc_h: AffinePoint,
}

/// Chaum-Pedersen proof of equal discrete logarithms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CPProof {
    pub base_g: AffinePoint,
    pub base_h: AffinePoint,
    pub point_u: AffinePoint,
    pub point_v: AffinePoint,
    pub challenge_response: Scalar,
}

impl CPProof {
    /// Samples the prover nonce and its commitments.
    pub fn prove_step1<R: RngCore + CryptoRng>(
        base_g: &AffinePoint,
        base_h: &AffinePoint,
        rng: &mut R,
    ) -> (Scalar, RandomCommitments) {
        let nonce = Scalar::random(rng);
        let commitments = RandomCommitments {
            rc_g: (*base_g * nonce).to_affine(),
            rc_h: (*base_h * nonce).to_affine(),
        };
        (nonce, commitments)
    }

    /// Answers `challenge` for the witness `scalar`.
    pub fn prove_step2(
        base_g: &AffinePoint,
        base_h: &AffinePoint,
        scalar: &Scalar,
        nonce: &Scalar,
        challenge: &Scalar,
    ) -> CPProof {
        CPProof {
            base_g: *base_g,
            base_h: *base_h,
            point_u: (*base_g * scalar).to_affine(),
            point_v: (*base_h * scalar).to_affine(),
            challenge_response: nonce + &(challenge * scalar),
        }
    }

    /// Produces an accepting transcript for an arbitrary statement without a
    /// witness. Returns the commitments and the challenge it answers.
    pub fn simulate<R: RngCore + CryptoRng>(
        base_g: &AffinePoint,
        base_h: &AffinePoint,
        point_u: &AffinePoint,
        point_v: &AffinePoint,
        rng: &mut R,
    ) -> (CPProof, RandomCommitments, Scalar) {
        let challenge = Scalar::random(&mut *rng);
        let response = Scalar::random(&mut *rng);

        let commitments = RandomCommitments {
            rc_g: (*base_g * response - *point_u * challenge).to_affine(),
            rc_h: (*base_h * response - *point_v * challenge).to_affine(),
        };
        let proof = CPProof {
            base_g: *base_g,
            base_h: *base_h,
            point_u: *point_u,
            point_v: *point_v,
            challenge_response: response,
        };
        (proof, commitments, challenge)
    }

    /// Checks the proof against its commitments and challenge.
    pub fn verify(&self, commitments: &RandomCommitments, challenge: &Scalar) -> bool {
        let lhs_g = self.base_g * self.challenge_response;
        let rhs_g = ProjectivePoint::from(commitments.rc_g) + self.point_u * challenge;

        let lhs_h = self.base_h * self.challenge_response;
        let rhs_h = ProjectivePoint::from(commitments.rc_h) + self.point_v * challenge;

        lhs_g == rhs_g && lhs_h == rhs_h
    }

    /// Non-interactive proof with the challenge taken from a transcript over
    /// the statement, the commitments and `session_id`.
    pub fn prove_standalone<R: RngCore + CryptoRng>(
        scalar: &Scalar,
        base_g: &AffinePoint,
        base_h: &AffinePoint,
        session_id: &[u8],
        rng: &mut R,
    ) -> (CPProof, RandomCommitments) {
        let (mut nonce, commitments) = CPProof::prove_step1(base_g, base_h, rng);
        let point_u = (*base_g * scalar).to_affine();
        let point_v = (*base_h * scalar).to_affine();

        let challenge = standalone_challenge(
            session_id,
            [base_g, base_h, &point_u, &point_v],
            &commitments,
        );
        let proof = CPProof::prove_step2(base_g, base_h, scalar, &nonce, &challenge);
        nonce.zeroize();

        (proof, commitments)
    }

    /// Verifies a proof produced by [`CPProof::prove_standalone`].
    pub fn verify_standalone(&self, commitments: &RandomCommitments, session_id: &[u8]) -> bool {
        let challenge = standalone_challenge(
            session_id,
            [&self.base_g, &self.base_h, &self.point_u, &self.point_v],
            commitments,
        );
        self.verify(commitments, &challenge)
    }
}

fn standalone_challenge(
    session_id: &[u8],
    statement: [&AffinePoint; 4],
    commitments: &RandomCommitments,
) -> Scalar {
    let mut transcript = Transcript::new(b"DKLs23 CPProof");
    transcript.append_message(b"session id", session_id);
    for point in statement {
        transcript.append_message(b"statement", &point_to_bytes(point));
    }
    transcript.append_message(b"rc_g", &point_to_bytes(&commitments.rc_g));
    transcript.append_message(b"rc_h", &point_to_bytes(&commitments.rc_h));
    challenge_scalar(&mut transcript, b"challenge")
}

/// Proof that `(u, v) = (r*h, r*G + b*h)` for some `r` and `b` in `{0, 1}`.
///
/// Branch `beta` is the Chaum-Pedersen statement
/// `v - beta*h = r*G` and `u = r*h`. The branch that does not match the real
/// bit is simulated; the two challenges add up to the transcript challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncProof {
    pub proof0: CPProof,
    pub proof1: CPProof,
    pub commitments0: RandomCommitments,
    pub commitments1: RandomCommitments,
    pub challenge0: Scalar,
    pub challenge1: Scalar,
}

impl EncProof {
    /// Encrypts `bit` under `base_h` with randomness `scalar` and proves it.
    pub fn prove<R: RngCore + CryptoRng>(
        session_id: &[u8],
        base_h: &AffinePoint,
        scalar: &Scalar,
        bit: bool,
        rng: &mut R,
    ) -> EncProof {
        let base_g = AffinePoint::GENERATOR;
        let h = ProjectivePoint::from(*base_h);

        let u = (h * scalar).to_affine();
        let v_real = ProjectivePoint::GENERATOR * scalar;
        let v = if bit { v_real + h } else { v_real };

        // The statement of the branch we cannot prove.
        let fake_point_u = (if bit { v } else { v - h }).to_affine();

        let (mut nonce, real_commitments) = CPProof::prove_step1(&base_g, base_h, rng);
        let (fake_proof, fake_commitments, fake_challenge) =
            CPProof::simulate(&base_g, base_h, &fake_point_u, &u, rng);

        let (commitments0, commitments1) = if bit {
            (fake_commitments, real_commitments)
        } else {
            (real_commitments, fake_commitments)
        };

        let challenge = enc_challenge(
            session_id,
            base_h,
            &u,
            &v.to_affine(),
            &commitments0,
            &commitments1,
        );
        let real_challenge = challenge - fake_challenge;
        let real_proof = CPProof::prove_step2(&base_g, base_h, scalar, &nonce, &real_challenge);
        nonce.zeroize();

        if bit {
            EncProof {
                proof0: fake_proof,
                proof1: real_proof,
                commitments0,
                commitments1,
                challenge0: fake_challenge,
                challenge1: real_challenge,
            }
        } else {
            EncProof {
                proof0: real_proof,
                proof1: fake_proof,
                commitments0,
                commitments1,
                challenge0: real_challenge,
                challenge1: fake_challenge,
            }
        }
    }

    /// Verifies the OR-proof. The caller still has to check that
    /// [`EncProof::base_h`] is the point it expects.
    pub fn verify(&self, session_id: &[u8]) -> bool {
        let generator = AffinePoint::GENERATOR;
        let (p0, p1) = (&self.proof0, &self.proof1);

        if p0.base_g != generator || p1.base_g != generator || p0.base_h != p1.base_h {
            return false;
        }
        if p0.base_h == AffinePoint::IDENTITY || p0.point_v != p1.point_v {
            return false;
        }
        // Branch statements differ by exactly h.
        if ProjectivePoint::from(p0.point_u) - p1.point_u != ProjectivePoint::from(p0.base_h) {
            return false;
        }

        let (u, v) = self.get_u_and_v();
        let challenge = enc_challenge(
            session_id,
            &p0.base_h,
            &u,
            &v,
            &self.commitments0,
            &self.commitments1,
        );
        if self.challenge0 + self.challenge1 != challenge {
            return false;
        }

        p0.verify(&self.commitments0, &self.challenge0)
            && p1.verify(&self.commitments1, &self.challenge1)
    }

    /// The ciphertext `(u, v)`.
    pub fn get_u_and_v(&self) -> (AffinePoint, AffinePoint) {
        (self.proof0.point_v, self.proof0.point_u)
    }

    /// The point `h` the ciphertext is formed under.
    pub fn base_h(&self) -> AffinePoint {
        self.proof0.base_h
    }
}

fn enc_challenge(
    session_id: &[u8],
    base_h: &AffinePoint,
    u: &AffinePoint,
    v: &AffinePoint,
    commitments0: &RandomCommitments,
    commitments1: &RandomCommitments,
) -> Scalar {
    let mut transcript = Transcript::new(b"DKLs23 EncProof");
    transcript.append_message(b"session id", session_id);
    transcript.append_message(b"h", &point_to_bytes(base_h));
    transcript.append_message(b"u", &point_to_bytes(u));
    transcript.append_message(b"v", &point_to_bytes(v));
    for commitments in [commitments0, commitments1] {
        transcript.append_message(b"rc_g", &point_to_bytes(&commitments.rc_g));
        transcript.append_message(b"rc_h", &point_to_bytes(&commitments.rc_h));
    }
    challenge_scalar(&mut transcript, b"challenge")
}
