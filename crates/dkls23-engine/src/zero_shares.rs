//! Pairwise zero-sharing
//!
//! Every pair of parties agrees on a seed during DKG. For each signature, a
//! party adds `PRF(seed, sid)` for the pairs where it has the lower index and
//! subtracts it otherwise, so the values of a signing set sum to zero.

use crate::primitives::{hash, hash_as_scalar, random_bytes, HashOutput};
use crate::proofs::commits;
use crate::{Error, PartyIndex, Result, SECURITY};
use k256::Scalar;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Seed shared by two parties.
pub type Seed = [u8; SECURITY];

/// The combined seed for one counterparty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SeedPair {
    /// Whether we hold the lower index of the pair.
    pub lowest_index: bool,
    pub index_counterparty: PartyIndex,
    pub seed: Seed,
}

/// Seeds towards every other party of the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZeroShare {
    pub seeds: BTreeMap<PartyIndex, SeedPair>,
}

impl ZeroShare {
    /// Samples our contribution to a pair seed and commits to it.
    pub fn generate_seed_with_commitment<R: RngCore + CryptoRng>(
        rng: &mut R,
    ) -> (Seed, HashOutput, Vec<u8>) {
        let seed: Seed = random_bytes(rng);
        let (commitment, salt) = commits::commit(rng, &seed);
        (seed, commitment, salt)
    }

    pub fn verify_seed(seed: &Seed, commitment: &HashOutput, salt: &[u8]) -> bool {
        commits::verify_commitment(seed, commitment, salt)
    }

    /// Combines both contributions, lowest index first, so that the two
    /// parties end up with the same seed.
    pub fn generate_seed_pair(
        my_index: PartyIndex,
        their_index: PartyIndex,
        my_seed: &Seed,
        their_seed: &Seed,
    ) -> SeedPair {
        let lowest_index = my_index < their_index;
        let (low, high) = if lowest_index {
            (my_seed, their_seed)
        } else {
            (their_seed, my_seed)
        };

        let mut material = [low.as_slice(), high.as_slice()].concat();
        let seed = hash(&material, b"Zero shares seed");
        material.zeroize();

        SeedPair {
            lowest_index,
            index_counterparty: their_index,
            seed,
        }
    }

    pub fn initialize(pairs: Vec<SeedPair>) -> ZeroShare {
        let seeds = pairs
            .into_iter()
            .map(|pair| (pair.index_counterparty, pair))
            .collect();
        ZeroShare { seeds }
    }

    /// Our share of zero for the signing set made of us and `counterparties`.
    pub fn compute(&self, counterparties: &[PartyIndex], session_id: &[u8]) -> Result<Scalar> {
        let mut ordered = counterparties.to_vec();
        ordered.sort_unstable();

        let mut share = Scalar::ZERO;
        for index in ordered {
            let pair = self
                .seeds
                .get(&index)
                .ok_or(Error::InvalidPartyIndex(index))?;

            let value = hash_as_scalar(&pair.seed, session_id);
            if pair.lowest_index {
                share += value;
            } else {
                share -= value;
            }
        }
        Ok(share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    /// Runs the seed agreement for parties `1..=n` and returns their states.
    fn setup(n: PartyIndex) -> BTreeMap<PartyIndex, ZeroShare> {
        let mut contributions = BTreeMap::new();
        for i in 1..=n {
            for j in 1..=n {
                if i != j {
                    let (seed, commitment, salt) =
                        ZeroShare::generate_seed_with_commitment(&mut OsRng);
                    assert!(ZeroShare::verify_seed(&seed, &commitment, &salt));
                    contributions.insert((i, j), seed);
                }
            }
        }

        (1..=n)
            .map(|i| {
                let pairs = (1..=n)
                    .filter(|&j| j != i)
                    .map(|j| {
                        ZeroShare::generate_seed_pair(
                            i,
                            j,
                            &contributions[&(i, j)],
                            &contributions[&(j, i)],
                        )
                    })
                    .collect();
                (i, ZeroShare::initialize(pairs))
            })
            .collect()
    }

    #[test]
    fn both_sides_agree_on_the_seed() {
        let (a, b) = ([1u8; 32], [2u8; 32]);
        let left = ZeroShare::generate_seed_pair(1, 2, &a, &b);
        let right = ZeroShare::generate_seed_pair(2, 1, &b, &a);

        assert_eq!(left.seed, right.seed);
        assert!(left.lowest_index);
        assert!(!right.lowest_index);
    }

    #[test]
    fn shares_of_every_subset_sum_to_zero() {
        let states = setup(5);

        for set in [vec![1u8, 2], vec![1, 3, 5], vec![2, 3, 4, 5], vec![1, 2, 3, 4, 5]] {
            let mut sum = Scalar::ZERO;
            for &i in &set {
                let counterparties: Vec<_> = set.iter().copied().filter(|&j| j != i).collect();
                sum += states[&i].compute(&counterparties, b"sign id").unwrap();
            }
            assert_eq!(sum, Scalar::ZERO, "set {set:?}");
        }
    }

    #[test]
    fn missing_party_leaves_a_non_zero_sum() {
        let states = setup(4);

        // Parties 1 to 3 include party 4 in their sets, but party 4 never
        // contributes its share.
        let sum: Scalar = (1..=3u8)
            .map(|i| {
                let counterparties: Vec<_> = (1..=4).filter(|&j| j != i).collect();
                states[&i].compute(&counterparties, b"sign id").unwrap()
            })
            .sum();
        let missing = states[&4].compute(&[1, 2, 3], b"sign id").unwrap();

        assert_ne!(sum, Scalar::ZERO);
        assert_eq!(sum, -missing);
    }

    #[test]
    fn shares_change_with_the_session() {
        let states = setup(2);
        let a = states[&1].compute(&[2], b"first").unwrap();
        let b = states[&1].compute(&[2], b"second").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_counterparty_is_rejected() {
        let states = setup(2);
        assert!(matches!(
            states[&1].compute(&[3], b"sid"),
            Err(Error::InvalidPartyIndex(3))
        ));
    }

    #[test]
    fn tampered_seed_fails_commitment() {
        let (mut seed, commitment, salt) = ZeroShare::generate_seed_with_commitment(&mut OsRng);
        seed[31] ^= 0x80;
        assert!(!ZeroShare::verify_seed(&seed, &commitment, &salt));
    }
}
