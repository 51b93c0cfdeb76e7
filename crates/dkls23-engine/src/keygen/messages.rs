//! DKG message types

use crate::oblivious::{MulSenderInit, OTSender, OTSenderMessage};
use crate::primitives::HashOutput;
use crate::proofs::{DLogProof, EncProof, ProofCommitment};
use crate::types::ChainCode;
use crate::zero_shares::Seed;
use crate::{PartiesMessage, PartyIndex};
use k256::Scalar;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Phase 1 → 2: our evaluation of the sender's polynomial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmitPhase1to2 {
    pub parties: PartiesMessage,
    pub fragment: Scalar,
}

/// Phase 2 → 3: what we keep for every counterparty
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeepPhase2to3 {
    pub zero_seed: Seed,
    pub zero_salt: Vec<u8>,
}

/// Phase 2 → 3: what we keep for everybody
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct UniqueKeepPhase2to3 {
    pub poly_point: Scalar,
    #[zeroize(skip)]
    pub proof_commitment: ProofCommitment,
    pub aux_chain_code: ChainCode,
    pub cc_salt: Vec<u8>,
}

/// Phase 2 → 4: commitment to our zero-share seed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmitPhase2to4 {
    pub parties: PartiesMessage,
    pub zero_commitment: HashOutput,
}

/// Phase 2 → 4: commitments to our DLog proof and auxiliary chain code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastPhase2to4 {
    pub sender: PartyIndex,
    pub proof_commitment: HashOutput,
    pub cc_commitment: HashOutput,
}

/// Phase 3 → 4: base-OT state for every counterparty
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeepPhase3to4 {
    pub zero_seed: Seed,
    pub ot_sender: OTSender,
    pub mul_sender_init: MulSenderInit,
}

/// Phase 3 → 4: our point `p(i)`
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct UniqueKeepPhase3to4 {
    pub poly_point: Scalar,
}

/// Phase 3 → 4: zero-share reveal and both base-OT setups for one
/// counterparty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmitPhase3to4 {
    pub parties: PartiesMessage,
    pub zero_seed: Seed,
    pub zero_salt: Vec<u8>,
    /// We are the OT sender for the multiplications where we receive.
    pub ot_sender_message: OTSenderMessage,
    /// We are the OT receiver for the multiplications where we send.
    pub ot_seed: HashOutput,
    pub enc_proofs: Vec<EncProof>,
}

/// Phase 3 → 4: the proof and chain code behind the phase 2 commitments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastPhase3to4 {
    pub sender: PartyIndex,
    pub proof: DLogProof,
    pub aux_chain_code: ChainCode,
    pub cc_salt: Vec<u8>,
}
