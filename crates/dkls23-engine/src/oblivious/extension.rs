//! OT extension
//!
//! KOS-style correlated OT extension. The extension receiver holds both keys
//! of each of the `RAW_SECURITY` base OTs, the extension sender holds one key
//! per base OT and the correlation `delta` formed by its base-OT choices.
//! Base keys are expanded with a ChaCha20 PRG into columns of
//! [`EXTENDED_BATCH_SIZE`] bits. The receiver's extra `RAW_SECURITY +
//! STAT_SECURITY` random choice bits pad the batch for the consistency check
//! in GF(2^256).

use super::field::FieldElement;
use super::BATCH_SIZE;
use crate::primitives::{hash, random_bytes, seeded_rng, HashOutput};
use crate::{RAW_SECURITY, STAT_SECURITY};
use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Number of extended OTs, padding included.
pub const EXTENDED_BATCH_SIZE: usize = BATCH_SIZE + RAW_SECURITY + STAT_SECURITY;

/// One PRG-expanded column.
pub type PRGOutput = [u8; EXTENDED_BATCH_SIZE / 8];

/// One row of the OT matrix, `RAW_SECURITY` bits wide.
pub type Row = [u8; RAW_SECURITY / 8];

/// Extension sender: base-OT receiver outputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct OTESender {
    pub correlation: Vec<bool>,
    pub seeds: Vec<HashOutput>,
}

/// Extension receiver: base-OT sender outputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct OTEReceiver {
    pub seeds0: Vec<HashOutput>,
    pub seeds1: Vec<HashOutput>,
}

/// The receiver's message: the correction columns and the check values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OTEDataToSender {
    #[serde(with = "columns_serde")]
    pub u: Vec<PRGOutput>,
    pub verify_x: FieldElement,
    pub verify_t: FieldElement,
}

impl OTEReceiver {
    /// Extends the base OTs to [`BATCH_SIZE`] choices.
    ///
    /// Returns, for every choice, the row the receiver learned, together with
    /// the message for the sender.
    pub fn run_phase1<R: RngCore + CryptoRng>(
        &self,
        session_id: &[u8],
        choice_bits: &[bool],
        rng: &mut R,
    ) -> (Vec<Row>, OTEDataToSender) {
        // Choices first, random padding after.
        let mut extended: PRGOutput = random_bytes(rng);
        for (index, bit) in choice_bits.iter().take(BATCH_SIZE).enumerate() {
            set_bit(&mut extended, index, *bit);
        }

        let mut t0 = Vec::with_capacity(RAW_SECURITY);
        let mut u = Vec::with_capacity(RAW_SECURITY);
        for (seed0, seed1) in self.seeds0.iter().zip(self.seeds1.iter()) {
            let column0 = prg(seed0, session_id);
            let column1 = prg(seed1, session_id);

            let mut correction = [0u8; EXTENDED_BATCH_SIZE / 8];
            for k in 0..correction.len() {
                correction[k] = column0[k] ^ column1[k] ^ extended[k];
            }

            t0.push(column0);
            u.push(correction);
        }

        let mut rows = transpose(&t0);
        let chi = check_coefficients(session_id, &u);

        let mut verify_x = FieldElement::ZERO;
        let mut verify_t = FieldElement::ZERO;
        for (index, (row, coefficient)) in rows.iter().zip(chi.iter()).enumerate() {
            verify_x ^= coefficient.select(get_bit(&extended, index));
            verify_t ^= FieldElement::from_bytes(row).mul(coefficient);
        }

        extended.zeroize();
        t0.zeroize();
        rows.truncate(BATCH_SIZE);

        (
            rows,
            OTEDataToSender {
                u,
                verify_x,
                verify_t,
            },
        )
    }
}

impl OTESender {
    /// Checks the receiver's message and returns the rows `q_i`. The receiver
    /// learned `q_i` when its choice was 0 and `q_i ^ delta` otherwise.
    ///
    /// `None` means the consistency check failed.
    pub fn run(&self, session_id: &[u8], data: &OTEDataToSender) -> Option<Vec<Row>> {
        if data.u.len() != RAW_SECURITY
            || self.seeds.len() != RAW_SECURITY
            || self.correlation.len() != RAW_SECURITY
        {
            return None;
        }

        let mut q = Vec::with_capacity(RAW_SECURITY);
        for ((seed, bit), correction) in self
            .seeds
            .iter()
            .zip(self.correlation.iter())
            .zip(data.u.iter())
        {
            let mut column = prg(seed, session_id);
            let mask = u8::from(*bit).wrapping_neg();
            for (byte, u_byte) in column.iter_mut().zip(correction.iter()) {
                *byte ^= u_byte & mask;
            }
            q.push(column);
        }

        let mut rows = transpose(&q);
        q.zeroize();
        let chi = check_coefficients(session_id, &data.u);

        let mut lhs = FieldElement::ZERO;
        for (row, coefficient) in rows.iter().zip(chi.iter()) {
            lhs ^= FieldElement::from_bytes(row).mul(coefficient);
        }
        let delta = FieldElement::from_bytes(&self.delta());
        let rhs = data.verify_t ^ data.verify_x.mul(&delta);

        if !bool::from(lhs.ct_eq(&rhs)) {
            return None;
        }

        rows.truncate(BATCH_SIZE);
        Some(rows)
    }

    /// The correlation packed as a row.
    pub fn delta(&self) -> Row {
        let mut delta = [0u8; RAW_SECURITY / 8];
        for (index, bit) in self.correlation.iter().enumerate() {
            set_bit(&mut delta, index, *bit);
        }
        delta
    }
}

fn prg(seed: &HashOutput, session_id: &[u8]) -> PRGOutput {
    let mut generator = seeded_rng(hash(seed, session_id));
    let mut output = [0u8; EXTENDED_BATCH_SIZE / 8];
    generator.fill_bytes(&mut output);
    output
}

fn get_bit(bytes: &[u8], index: usize) -> bool {
    (bytes[index / 8] >> (index % 8)) & 1 == 1
}

fn set_bit(bytes: &mut [u8], index: usize, bit: bool) {
    let mask = 1u8 << (index % 8);
    if bit {
        bytes[index / 8] |= mask;
    } else {
        bytes[index / 8] &= !mask;
    }
}

/// Turns `RAW_SECURITY` columns into `EXTENDED_BATCH_SIZE` rows.
fn transpose(columns: &[PRGOutput]) -> Vec<Row> {
    let mut rows = vec![[0u8; RAW_SECURITY / 8]; EXTENDED_BATCH_SIZE];
    for (j, column) in columns.iter().enumerate() {
        for (i, row) in rows.iter_mut().enumerate() {
            let bit = (column[i / 8] >> (i % 8)) & 1;
            row[j / 8] |= bit << (j % 8);
        }
    }
    rows
}

fn check_coefficients(session_id: &[u8], u: &[PRGOutput]) -> Vec<FieldElement> {
    let mut transcript = Transcript::new(b"DKLs23 OT extension");
    transcript.append_message(b"session id", session_id);
    for column in u {
        transcript.append_message(b"u", column);
    }

    (0..EXTENDED_BATCH_SIZE)
        .map(|_| {
            let mut bytes = [0u8; 32];
            transcript.challenge_bytes(b"chi", &mut bytes);
            FieldElement::from_bytes(&bytes)
        })
        .collect()
}

mod columns_serde {
    use super::PRGOutput;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(columns: &[PRGOutput], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(columns.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<PRGOutput>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Vec<String> = Vec::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|column| {
                let bytes = hex::decode(column).map_err(serde::de::Error::custom)?;
                PRGOutput::try_from(bytes.as_slice())
                    .map_err(|_| serde::de::Error::custom("Invalid column length"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::OsRng, Rng};

    /// Base-OT outputs as the two roles would hold them.
    fn base_setup() -> (OTESender, OTEReceiver) {
        let correlation: Vec<bool> = (0..RAW_SECURITY).map(|_| OsRng.gen()).collect();
        let seeds0: Vec<HashOutput> = (0..RAW_SECURITY).map(|_| OsRng.gen()).collect();
        let seeds1: Vec<HashOutput> = (0..RAW_SECURITY).map(|_| OsRng.gen()).collect();
        let seeds = correlation
            .iter()
            .enumerate()
            .map(|(j, bit)| if *bit { seeds1[j] } else { seeds0[j] })
            .collect();

        (
            OTESender { correlation, seeds },
            OTEReceiver { seeds0, seeds1 },
        )
    }

    #[test]
    fn receiver_learns_the_chosen_rows() {
        let (sender, receiver) = base_setup();
        let choices: Vec<bool> = (0..BATCH_SIZE).map(|_| OsRng.gen()).collect();

        let (rows, data) = receiver.run_phase1(b"ote", &choices, &mut OsRng);
        let q = sender.run(b"ote", &data).expect("check passes");
        let delta = sender.delta();

        assert_eq!(rows.len(), BATCH_SIZE);
        assert_eq!(q.len(), BATCH_SIZE);
        for i in 0..BATCH_SIZE {
            let mut expected = q[i];
            if choices[i] {
                for k in 0..expected.len() {
                    expected[k] ^= delta[k];
                }
            }
            assert_eq!(rows[i], expected, "row {i}");
        }
    }

    #[test]
    fn inconsistent_choices_are_caught() {
        let (sender, receiver) = base_setup();
        let choices = vec![false; BATCH_SIZE];

        let (_, mut data) = receiver.run_phase1(b"ote", &choices, &mut OsRng);
        // Using a different choice vector in one column.
        data.u[3][0] ^= 1;

        assert!(sender.run(b"ote", &data).is_none());
    }

    #[test]
    fn tampered_check_values_are_caught() {
        let (sender, receiver) = base_setup();
        let choices = vec![true; BATCH_SIZE];

        let (_, mut data) = receiver.run_phase1(b"ote", &choices, &mut OsRng);
        data.verify_x.0[0] ^= 1;
        assert!(sender.run(b"ote", &data).is_none());
    }

    #[test]
    fn columns_serialize_as_hex() {
        let (_, receiver) = base_setup();
        let (_, data) = receiver.run_phase1(b"ote", &[true; BATCH_SIZE], &mut OsRng);

        let json = serde_json::to_string(&data).unwrap();
        let decoded: OTEDataToSender = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn transpose_moves_bits() {
        let mut columns = vec![[0u8; EXTENDED_BATCH_SIZE / 8]; RAW_SECURITY];
        columns[9][2] = 0b0000_1000; // column 9, row 19
        let rows = transpose(&columns);

        assert_eq!(rows[19][1], 0b0000_0010);
        assert_eq!(rows.iter().filter(|row| row.iter().any(|b| *b != 0)).count(), 1);
    }
}
