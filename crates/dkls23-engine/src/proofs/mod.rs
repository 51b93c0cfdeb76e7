//! Commitments and zero-knowledge proofs

pub mod chaum_pedersen;
pub mod commits;
pub mod dlog;

pub use chaum_pedersen::{CPProof, EncProof, RandomCommitments};
pub use commits::{commit, commit_point, commit_with_salt, verify_commitment, verify_commitment_point};
pub use dlog::{DLogProof, InteractiveDLogProof};

use crate::primitives::HashOutput;
use crate::PartyIndex;
use serde::{Deserialize, Serialize};

/// A DLog proof together with the commitment broadcast ahead of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofCommitment {
    pub index: PartyIndex,
    pub proof: DLogProof,
    pub commitment: HashOutput,
}
