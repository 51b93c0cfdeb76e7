//! Two-party multiplication
//!
//! The receiver holds a scalar `b`, the sender a vector `a` of [`OT_WIDTH`]
//! scalars. Afterwards the sender holds `c` and the receiver `d` with
//! `c_j + d_j = a_j * b`.
//!
//! The receiver encodes `b` over a gadget vector of [`BATCH_SIZE`] entries
//! and uses the choice bits in the OT extension. The sender transfers a random
//! correlation `(a_tilde, a_hat)`, proves it used the same correlation in
//! every OT with the `verify_r`/`verify_u` check, and finally derandomizes
//! with `gamma_sender = a - a_tilde`.

use super::base::{OTReceiver, OTSender, OTSenderMessage, Seed};
use super::extension::{OTEDataToSender, OTEReceiver, OTESender, Row};
use super::{BATCH_SIZE, OT_WIDTH};
use crate::primitives::{challenge_scalar, hash, hash_as_scalar, scalar_to_bytes, HashOutput};
use crate::proofs::EncProof;
use crate::RAW_SECURITY;
use k256::{
    elliptic_curve::{
        subtle::{Choice, ConditionallySelectable, ConstantTimeEq},
        Field,
    },
    Scalar,
};
use merlin::Transcript;
use rand::Rng;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Number of scalars transferred per OT: `a_tilde` and `a_hat`.
const WIDTH: usize = 2 * OT_WIDTH;

/// The sender side, set up once per pair during DKG.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct MulSender {
    pub ote_sender: OTESender,
}

/// The receiver side, set up once per pair during DKG.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct MulReceiver {
    pub ote_receiver: OTEReceiver,
}

/// Base-OT state of a future sender between DKG phases 3 and 4.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MulSenderInit {
    pub ot_receiver: OTReceiver,
    pub correlation: Vec<bool>,
    pub vec_r: Vec<Scalar>,
}

/// Receiver state between its two phases.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MulDataToKeepReceiver {
    pub b: Scalar,
    pub choice_bits: Vec<bool>,
    pub rows: Vec<Row>,
}

/// The sender's message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MulDataToReceiver {
    pub tau: Vec<Vec<Scalar>>,
    pub verify_r: HashOutput,
    pub verify_u: Vec<Scalar>,
    pub gamma_sender: Vec<Scalar>,
}

impl MulSender {
    /// Base-OT receiver side of the setup: samples the correlation and
    /// encrypts it.
    pub fn init_phase1<R: RngCore + CryptoRng>(
        session_id: &[u8],
        rng: &mut R,
    ) -> (MulSenderInit, Seed, Vec<EncProof>) {
        let ot_receiver = OTReceiver::init(rng);
        let correlation: Vec<bool> = (0..RAW_SECURITY).map(|_| rng.gen()).collect();
        let (vec_r, enc_proofs) = ot_receiver.run_phase1(session_id, &correlation, rng);
        let seed = ot_receiver.seed;

        (
            MulSenderInit {
                ot_receiver,
                correlation,
                vec_r,
            },
            seed,
            enc_proofs,
        )
    }

    /// Finishes the setup once the base-OT sender's message arrived.
    pub fn init_phase2(
        init: &MulSenderInit,
        session_id: &[u8],
        sender_message: &OTSenderMessage,
    ) -> Option<MulSender> {
        let seeds = init
            .ot_receiver
            .run_phase2(session_id, &init.vec_r, sender_message)?;

        Some(MulSender {
            ote_sender: OTESender {
                correlation: init.correlation.clone(),
                seeds,
            },
        })
    }

    /// Multiplies `input` by the receiver's secret.
    ///
    /// Returns the sender's additive shares and the message for the
    /// receiver, or `None` if the OT-extension check failed.
    pub fn run<R: RngCore + CryptoRng>(
        &self,
        session_id: &[u8],
        input: &[Scalar],
        data: &OTEDataToSender,
        rng: &mut R,
    ) -> Option<(Vec<Scalar>, MulDataToReceiver)> {
        if input.len() != OT_WIDTH {
            return None;
        }

        let q = self.ote_sender.run(session_id, data)?;
        let delta = self.ote_sender.delta();

        let mut correlation: Vec<Scalar> = (0..WIDTH).map(|_| Scalar::random(&mut *rng)).collect();

        let mut z_a = Vec::with_capacity(BATCH_SIZE);
        let mut tau = Vec::with_capacity(BATCH_SIZE);
        for (index, row) in q.iter().enumerate() {
            let mut other = *row;
            for (byte, d) in other.iter_mut().zip(delta.iter()) {
                *byte ^= d;
            }

            let v0 = expand_row(row, session_id, index);
            let v1 = expand_row(&other, session_id, index);
            other.zeroize();

            tau.push(
                (0..WIDTH)
                    .map(|k| v1[k] - v0[k] + correlation[k])
                    .collect::<Vec<_>>(),
            );
            z_a.push(v0);
        }

        let (chi_tilde, chi_hat) = check_coefficients(session_id, &tau);

        let (a_tilde, a_hat) = correlation.split_at(OT_WIDTH);
        let verify_u: Vec<Scalar> = (0..OT_WIDTH)
            .map(|j| chi_tilde[j] * a_tilde[j] + chi_hat[j] * a_hat[j])
            .collect();

        let mut r_bytes = Vec::with_capacity(BATCH_SIZE * OT_WIDTH * 32);
        for row in &z_a {
            for j in 0..OT_WIDTH {
                let r = chi_tilde[j] * row[j] + chi_hat[j] * row[OT_WIDTH + j];
                r_bytes.extend_from_slice(&scalar_to_bytes(&r));
            }
        }
        let verify_r = hash(&r_bytes, session_id);

        let gamma_sender: Vec<Scalar> = input
            .iter()
            .zip(a_tilde.iter())
            .map(|(a, a_tilde)| a - a_tilde)
            .collect();

        let gadget = gadget_vector(session_id);
        let output: Vec<Scalar> = (0..OT_WIDTH)
            .map(|j| {
                z_a.iter()
                    .zip(gadget.iter())
                    .fold(Scalar::ZERO, |acc, (row, g)| acc + g * &row[j])
            })
            .collect();

        correlation.zeroize();
        z_a.zeroize();

        Some((
            output,
            MulDataToReceiver {
                tau,
                verify_r,
                verify_u,
                gamma_sender,
            },
        ))
    }
}

impl MulReceiver {
    /// Base-OT sender side of the setup: checks the encryption proofs and
    /// keeps both keys of every base OT.
    pub fn init_phase2(
        ot_sender: &OTSender,
        session_id: &[u8],
        seed: &Seed,
        enc_proofs: &[EncProof],
    ) -> Option<MulReceiver> {
        let (seeds0, seeds1) = ot_sender.run_phase2(session_id, seed, enc_proofs)?;
        Some(MulReceiver {
            ote_receiver: OTEReceiver { seeds0, seeds1 },
        })
    }

    /// Samples the receiver's secret `b` and starts the OT extension with its
    /// gadget encoding.
    pub fn run_phase1<R: RngCore + CryptoRng>(
        &self,
        session_id: &[u8],
        rng: &mut R,
    ) -> (Scalar, MulDataToKeepReceiver, OTEDataToSender) {
        let b = Scalar::random(&mut *rng);
        let gadget = gadget_vector(session_id);

        // The top bits are random; the low RAW_SECURITY bits absorb the rest.
        let mut choice_bits = vec![false; BATCH_SIZE];
        let mut remainder = b;
        for index in RAW_SECURITY..BATCH_SIZE {
            let bit: bool = rng.gen();
            choice_bits[index] = bit;
            remainder -= Scalar::conditional_select(
                &Scalar::ZERO,
                &gadget[index],
                Choice::from(u8::from(bit)),
            );
        }

        let mut bytes = scalar_to_bytes(&remainder);
        for (index, bit) in choice_bits.iter_mut().take(RAW_SECURITY).enumerate() {
            *bit = (bytes[31 - index / 8] >> (index % 8)) & 1 == 1;
        }
        bytes.zeroize();
        remainder.zeroize();

        let (rows, data) = self.ote_receiver.run_phase1(session_id, &choice_bits, rng);

        (
            b,
            MulDataToKeepReceiver {
                b,
                choice_bits,
                rows,
            },
            data,
        )
    }

    /// Checks the sender's message and returns the receiver's shares, or
    /// `None` if the sender did not use a consistent correlation.
    pub fn run_phase2(
        &self,
        session_id: &[u8],
        kept: &MulDataToKeepReceiver,
        data: &MulDataToReceiver,
    ) -> Option<Vec<Scalar>> {
        if data.tau.len() != BATCH_SIZE
            || data.tau.iter().any(|row| row.len() != WIDTH)
            || data.verify_u.len() != OT_WIDTH
            || data.gamma_sender.len() != OT_WIDTH
            || kept.rows.len() != BATCH_SIZE
            || kept.choice_bits.len() != BATCH_SIZE
        {
            return None;
        }

        let mut z_b = Vec::with_capacity(BATCH_SIZE);
        for (index, ((row, bit), tau)) in kept
            .rows
            .iter()
            .zip(kept.choice_bits.iter())
            .zip(data.tau.iter())
            .enumerate()
        {
            let v = expand_row(row, session_id, index);
            let choice = Choice::from(u8::from(*bit));
            let entry: [Scalar; WIDTH] = core::array::from_fn(|k| {
                Scalar::conditional_select(&Scalar::ZERO, &tau[k], choice) - v[k]
            });
            z_b.push(entry);
        }

        let (chi_tilde, chi_hat) = check_coefficients(session_id, &data.tau);

        let mut r_bytes = Vec::with_capacity(BATCH_SIZE * OT_WIDTH * 32);
        for (row, bit) in z_b.iter().zip(kept.choice_bits.iter()) {
            let choice = Choice::from(u8::from(*bit));
            for j in 0..OT_WIDTH {
                let masked = Scalar::conditional_select(&Scalar::ZERO, &data.verify_u[j], choice);
                let r = masked - (chi_tilde[j] * row[j] + chi_hat[j] * row[OT_WIDTH + j]);
                r_bytes.extend_from_slice(&scalar_to_bytes(&r));
            }
        }
        if !bool::from(hash(&r_bytes, session_id).ct_eq(&data.verify_r)) {
            return None;
        }

        let gadget = gadget_vector(session_id);
        let output = (0..OT_WIDTH)
            .map(|j| {
                let sum = z_b
                    .iter()
                    .zip(gadget.iter())
                    .fold(Scalar::ZERO, |acc, (row, g)| acc + g * &row[j]);
                sum + kept.b * data.gamma_sender[j]
            })
            .collect();

        z_b.zeroize();
        Some(output)
    }
}

/// Powers of two for the low bits, hashed scalars for the rest.
fn gadget_vector(session_id: &[u8]) -> Vec<Scalar> {
    let two = Scalar::from(2u32);
    let mut gadget = Vec::with_capacity(BATCH_SIZE);
    let mut power = Scalar::ONE;
    for _ in 0..RAW_SECURITY {
        gadget.push(power);
        power *= two;
    }
    let salt = [b"gadget".as_slice(), session_id].concat();
    for index in RAW_SECURITY..BATCH_SIZE {
        gadget.push(hash_as_scalar(&(index as u16).to_be_bytes(), &salt));
    }
    gadget
}

/// Turns an OT row into the [`WIDTH`] scalars it stands for.
fn expand_row(row: &Row, session_id: &[u8], index: usize) -> [Scalar; WIDTH] {
    core::array::from_fn(|k| {
        let salt = [session_id, &(index as u16).to_be_bytes(), &[k as u8]].concat();
        hash_as_scalar(row, &salt)
    })
}

fn check_coefficients(session_id: &[u8], tau: &[Vec<Scalar>]) -> (Vec<Scalar>, Vec<Scalar>) {
    let mut transcript = Transcript::new(b"DKLs23 multiplication");
    transcript.append_message(b"session id", session_id);
    for row in tau {
        for value in row {
            transcript.append_message(b"tau", &scalar_to_bytes(value));
        }
    }

    let chi_tilde = (0..OT_WIDTH)
        .map(|_| challenge_scalar(&mut transcript, b"chi_tilde"))
        .collect();
    let chi_hat = (0..OT_WIDTH)
        .map(|_| challenge_scalar(&mut transcript, b"chi_hat"))
        .collect();
    (chi_tilde, chi_hat)
}
