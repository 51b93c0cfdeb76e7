//! DSG message types
//!
//! Keeps are local state between two phases. None of them is `Clone`: a
//! phase consumes them and they are wiped when dropped.

use crate::oblivious::{MulDataToKeepReceiver, MulDataToReceiver, OTEDataToSender};
use crate::primitives::HashOutput;
use crate::{PartiesMessage, PartyIndex};
use k256::{AffinePoint, Scalar};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Phase 1 → 2: our nonce share, inversion mask and run nonce
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct UniqueKeepPhase1to2 {
    pub instance_key: Scalar,
    #[zeroize(skip)]
    pub instance_point: AffinePoint,
    pub inversion_mask: Scalar,
    pub run_nonce: HashOutput,
}

/// Phase 1 → 2: what we keep for every counterparty
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeepPhase1to2 {
    pub salt: Vec<u8>,
    pub chi: Scalar,
    pub mul_keep: MulDataToKeepReceiver,
}

/// Phase 1 → 2: commitment to our instance point and the first
/// multiplication message, where we receive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmitPhase1to2 {
    pub parties: PartiesMessage,
    /// Fresh for every signing run; the same value goes to every signer.
    pub run_nonce: HashOutput,
    pub commitment: HashOutput,
    pub mul_transmit: OTEDataToSender,
}

/// Phase 2 → 3: our secrets for this signature
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct UniqueKeepPhase2to3 {
    pub instance_key: Scalar,
    #[zeroize(skip)]
    pub instance_point: AffinePoint,
    pub inversion_mask: Scalar,
    pub key_share: Scalar,
    #[zeroize(skip)]
    pub public_share: AffinePoint,
    pub run_nonce: HashOutput,
}

/// Phase 2 → 3: our multiplication shares and state for one counterparty
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeepPhase2to3 {
    pub c_u: Scalar,
    pub c_v: Scalar,
    pub commitment: HashOutput,
    pub mul_keep: MulDataToKeepReceiver,
    pub chi: Scalar,
}

/// Phase 2 → 3: the multiplication reply, the consistency values and the
/// decommitment of our instance point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmitPhase2to3 {
    pub parties: PartiesMessage,
    pub gamma_u: AffinePoint,
    pub gamma_v: AffinePoint,
    pub psi: Scalar,
    pub public_share: AffinePoint,
    pub instance_point: AffinePoint,
    pub salt: Vec<u8>,
    pub mul_transmit: MulDataToReceiver,
}

/// Phase 3 → 4: the public nonce `R` of the signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKeepPhase3to4 {
    pub instance_point: AffinePoint,
    /// x-coordinate of `R`, big-endian, not reduced
    pub x_coord: [u8; 32],
}

/// Phase 3 → 4: our additive shares of the numerator and the denominator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast3to4 {
    pub sender: PartyIndex,
    pub u: Scalar,
    pub w: Scalar,
}
