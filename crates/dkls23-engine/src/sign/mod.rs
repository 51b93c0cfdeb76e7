//! Distributed Signature Generation (DSG) module
//!
//! Implements the signing protocol from DKLs23: three rounds of messages
//! between four local phases. [`SignSession`] holds the state of one
//! signature between the phases.

mod dsg;
mod messages;

pub use dsg::{phase1, phase2, phase3, phase4, run_dsg, verify_ecdsa_signature};
pub use messages::*;

use crate::{Error, KeyShare, PartyIndex, Result, SignData, Signature};
use rand_core::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use tracing::warn;

enum SignState {
    Init,
    Phase1 {
        unique_keep: UniqueKeepPhase1to2,
        keep: BTreeMap<PartyIndex, KeepPhase1to2>,
    },
    Phase2 {
        unique_keep: UniqueKeepPhase2to3,
        keep: BTreeMap<PartyIndex, KeepPhase2to3>,
    },
    Phase3 {
        unique_keep: UniqueKeepPhase3to4,
    },
    Done,
    Abandoned,
}

impl SignState {
    fn name(&self) -> &'static str {
        match self {
            SignState::Init => "Init",
            SignState::Phase1 { .. } => "Phase1",
            SignState::Phase2 { .. } => "Phase2",
            SignState::Phase3 { .. } => "Phase3",
            SignState::Done => "Done",
            SignState::Abandoned => "Abandoned",
        }
    }
}

/// Signing state machine for one signature
pub struct SignSession {
    key_share: KeyShare,
    sign_data: SignData,
    state: SignState,
}

impl SignSession {
    /// Checks the signing set against the key before anything is sampled.
    pub fn new(key_share: KeyShare, sign_data: SignData) -> Result<Self> {
        sign_data.validate(&key_share.parameters, key_share.party_index)?;
        Ok(Self {
            key_share,
            sign_data,
            state: SignState::Init,
        })
    }

    pub fn key_share(&self) -> &KeyShare {
        &self.key_share
    }

    pub fn sign_data(&self) -> &SignData {
        &self.sign_data
    }

    pub fn state(&self) -> &'static str {
        self.state.name()
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, SignState::Done)
    }

    /// Drops the nonce share and every other secret of this signature.
    pub fn abandon(&mut self) {
        if !matches!(self.state, SignState::Abandoned) {
            warn!(
                party = self.key_share.party_index,
                state = self.state.name(),
                "DSG abandoned"
            );
        }
        self.state = SignState::Abandoned;
    }

    pub fn phase1<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<BTreeMap<PartyIndex, TransmitPhase1to2>> {
        match self.take()? {
            SignState::Init => {
                let output =
                    phase1(&self.key_share, &self.sign_data, rng).map_err(|e| self.fail(e))?;
                self.state = SignState::Phase1 {
                    unique_keep: output.unique_keep,
                    keep: output.keep,
                };
                Ok(output.transmit)
            }
            other => Err(self.restore(other, "Init")),
        }
    }

    pub fn phase2<R: RngCore + CryptoRng>(
        &mut self,
        received: &BTreeMap<PartyIndex, TransmitPhase1to2>,
        rng: &mut R,
    ) -> Result<BTreeMap<PartyIndex, TransmitPhase2to3>> {
        match self.take()? {
            SignState::Phase1 { unique_keep, keep } => {
                let output = phase2(
                    &self.key_share,
                    &self.sign_data,
                    unique_keep,
                    keep,
                    received,
                    rng,
                )
                .map_err(|e| self.fail(e))?;
                self.state = SignState::Phase2 {
                    unique_keep: output.unique_keep,
                    keep: output.keep,
                };
                Ok(output.transmit)
            }
            other => Err(self.restore(other, "Phase1")),
        }
    }

    pub fn phase3(
        &mut self,
        received: &BTreeMap<PartyIndex, TransmitPhase2to3>,
    ) -> Result<Broadcast3to4> {
        match self.take()? {
            SignState::Phase2 { unique_keep, keep } => {
                let output = phase3(&self.key_share, &self.sign_data, unique_keep, keep, received)
                    .map_err(|e| self.fail(e))?;
                self.state = SignState::Phase3 {
                    unique_keep: output.unique_keep,
                };
                Ok(output.broadcast)
            }
            other => Err(self.restore(other, "Phase2")),
        }
    }

    /// Combines the broadcasts of every signer, ours included.
    pub fn phase4(
        &mut self,
        received: &BTreeMap<PartyIndex, Broadcast3to4>,
        normalize: bool,
    ) -> Result<Signature> {
        match self.take()? {
            SignState::Phase3 { unique_keep } => {
                let signature = phase4(
                    &self.key_share,
                    &self.sign_data,
                    &unique_keep,
                    received,
                    normalize,
                )
                .map_err(|e| self.fail(e))?;
                self.state = SignState::Done;
                Ok(signature)
            }
            other => Err(self.restore(other, "Phase3")),
        }
    }

    fn take(&mut self) -> Result<SignState> {
        match std::mem::replace(&mut self.state, SignState::Abandoned) {
            SignState::Abandoned => Err(Error::SessionAbandoned),
            state => Ok(state),
        }
    }

    fn restore(&mut self, state: SignState, expected: &'static str) -> Error {
        let actual = state.name();
        self.state = state;
        Error::InvalidPhase { expected, actual }
    }

    fn fail(&self, error: Error) -> Error {
        warn!(
            party = self.key_share.party_index,
            culprit = ?error.culprit(),
            %error,
            "DSG aborted"
        );
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::MemoryRelay;
    use crate::EngineConfig;
    use dsg::tests::keygen_shares;
    use rand::rngs::OsRng;

    #[test]
    fn invalid_signing_set_is_rejected_up_front() {
        let shares = keygen_shares(2, 3);
        let own_index = SignData::new(b"s", &[1], [0; 32]);
        assert!(matches!(
            SignSession::new(shares[0].clone(), own_index),
            Err(Error::InvalidPartyIndex(1))
        ));
        let out_of_range = SignData::new(b"s", &[4], [0; 32]);
        assert!(SignSession::new(shares[0].clone(), out_of_range).is_err());
    }

    #[test]
    fn abandoned_session_keeps_failing() {
        let shares = keygen_shares(2, 2);
        let mut session =
            SignSession::new(shares[0].clone(), SignData::new(b"s", &[2], [0; 32])).unwrap();
        session.phase1(&mut OsRng).unwrap();
        session.abandon();

        assert!(matches!(
            session.phase2(&BTreeMap::new(), &mut OsRng),
            Err(Error::SessionAbandoned)
        ));
        assert!(!session.is_complete());
    }

    #[test]
    fn out_of_order_phase_leaves_state_alone() {
        let shares = keygen_shares(2, 2);
        let mut session =
            SignSession::new(shares[1].clone(), SignData::new(b"s", &[1], [0; 32])).unwrap();

        assert!(matches!(
            session.phase3(&BTreeMap::new()),
            Err(Error::InvalidPhase { expected: "Phase2", actual: "Init" })
        ));
        assert_eq!(session.state(), "Init");
    }

    #[tokio::test]
    async fn drivers_sign_over_the_relay() {
        let shares = keygen_shares(2, 3);
        let relay = MemoryRelay::new();
        let config = EngineConfig::default();
        let hash = [0x11; 32];

        let one = SignData::new(b"relay", &[2], hash);
        let two = SignData::new(b"relay", &[1], hash);
        let (a, b) = tokio::join!(
            run_dsg(&shares[0], &one, &relay, &config),
            run_dsg(&shares[1], &two, &relay, &config),
        );

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert!(verify_ecdsa_signature(&hash, &shares[0].public_key, &a.r, &a.s));
    }
}
