//! Oblivious transfer and two-party multiplication
//!
//! - [`base`]: endemic-style base OT, run during DKG
//! - [`extension`]: KOS OT extension, run for every signature
//! - [`field`]: GF(2^256) arithmetic for the extension check
//! - [`multiplication`]: the MtA conversion built on top of both

pub mod base;
pub mod extension;
pub mod field;
pub mod multiplication;

use crate::primitives::join_fields;
use crate::{PartyIndex, RAW_SECURITY, STAT_SECURITY};

/// Number of sender inputs multiplied at once.
pub const OT_WIDTH: usize = 2;

/// Length of the gadget vector, i.e. OTs per multiplication.
pub const BATCH_SIZE: usize = RAW_SECURITY + 2 * STAT_SECURITY;

pub use base::{OTReceiver, OTSender, OTSenderMessage};
pub use extension::{OTEDataToSender, OTEReceiver, OTESender, EXTENDED_BATCH_SIZE};
pub use field::FieldElement;
pub use multiplication::{
    MulDataToKeepReceiver, MulDataToReceiver, MulReceiver, MulSender, MulSenderInit,
};

/// Session id of the base OTs set up during DKG for the multiplications
/// between `receiver` and `sender`.
pub fn setup_session_id(receiver: PartyIndex, sender: PartyIndex, session_id: &[u8]) -> Vec<u8> {
    join_fields(&[
        b"Multiplication setup".as_slice(),
        &[receiver, sender],
        session_id,
    ])
}

/// Session id of one multiplication during signature `sign_id`.
///
/// `run_nonce` is sampled by the receiver for every signing run, so reusing
/// a sign id never replays an OT extension.
pub fn mul_session_id(
    receiver: PartyIndex,
    sender: PartyIndex,
    session_id: &[u8],
    sign_id: &[u8],
    run_nonce: &[u8],
) -> Vec<u8> {
    join_fields(&[
        b"Multiplication protocol".as_slice(),
        &[receiver, sender],
        session_id,
        sign_id,
        run_nonce,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_separate_fields_and_directions() {
        assert_ne!(setup_session_id(1, 2, b"sid"), setup_session_id(2, 1, b"sid"));
        assert_ne!(
            mul_session_id(1, 2, b"key", b"sign", b"nonce"),
            mul_session_id(1, 2, b"keys", b"ign", b"nonce")
        );
        assert_ne!(
            mul_session_id(1, 2, b"key", b"sign", b"first"),
            mul_session_id(1, 2, b"key", b"sign", b"second")
        );
    }
}
