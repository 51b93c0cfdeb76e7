//! Distributed Key Generation (DKG) module
//!
//! Implements the DKG protocol from DKLs23 for generating threshold ECDSA keys.
//! [`phase1`] to [`phase4`] are pure functions over the messages of the
//! previous phase; [`DkgSession`] holds the state between them.

mod dkg;
mod messages;
mod re_key;

pub use dkg::{dlog_session_id, phase1, phase2, phase3, phase4, run_dkg, step5};
pub use messages::*;
pub use re_key::re_key;

use crate::{Error, KeyShare, PartyIndex, Result, SessionData};
use k256::Scalar;
use rand_core::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use tracing::warn;
use zeroize::Zeroizing;

enum DkgState {
    Init,
    Phase1 {
        own_fragment: Zeroizing<Scalar>,
    },
    Phase2 {
        unique_keep: UniqueKeepPhase2to3,
        keep: BTreeMap<PartyIndex, KeepPhase2to3>,
    },
    Phase3 {
        unique_keep: UniqueKeepPhase3to4,
        keep: BTreeMap<PartyIndex, KeepPhase3to4>,
    },
    Done,
    Abandoned,
}

impl DkgState {
    fn name(&self) -> &'static str {
        match self {
            DkgState::Init => "Init",
            DkgState::Phase1 { .. } => "Phase1",
            DkgState::Phase2 { .. } => "Phase2",
            DkgState::Phase3 { .. } => "Phase3",
            DkgState::Done => "Done",
            DkgState::Abandoned => "Abandoned",
        }
    }
}

/// DKG state machine
///
/// Each phase method takes the state out of the session. On error the
/// session stays `Abandoned` and every secret it held is dropped.
pub struct DkgSession {
    data: SessionData,
    state: DkgState,
}

impl DkgSession {
    /// Create a new DKG session
    pub fn new(data: SessionData) -> Result<Self> {
        data.parameters.validate()?;
        Ok(Self {
            data,
            state: DkgState::Init,
        })
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    /// Name of the current state
    pub fn state(&self) -> &'static str {
        self.state.name()
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, DkgState::Done)
    }

    /// Drops all held secret material. Later calls fail with
    /// [`Error::SessionAbandoned`].
    pub fn abandon(&mut self) {
        if !matches!(self.state, DkgState::Abandoned) {
            warn!(party = self.data.party_index, state = self.state.name(), "DKG abandoned");
        }
        self.state = DkgState::Abandoned;
    }

    pub fn phase1<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<BTreeMap<PartyIndex, TransmitPhase1to2>> {
        match self.take()? {
            DkgState::Init => {
                let output = phase1(&self.data, rng);
                self.state = DkgState::Phase1 {
                    own_fragment: Zeroizing::new(output.unique_keep),
                };
                Ok(output.transmit)
            }
            other => Err(self.restore(other, "Init")),
        }
    }

    pub fn phase2<R: RngCore + CryptoRng>(
        &mut self,
        fragments: &BTreeMap<PartyIndex, TransmitPhase1to2>,
        rng: &mut R,
    ) -> Result<(BTreeMap<PartyIndex, TransmitPhase2to4>, BroadcastPhase2to4)> {
        match self.take()? {
            DkgState::Phase1 { own_fragment } => {
                let output = phase2(&self.data, &own_fragment, fragments, rng)
                    .map_err(|e| self.fail(e))?;
                self.state = DkgState::Phase2 {
                    unique_keep: output.unique_keep,
                    keep: output.keep,
                };
                Ok((output.transmit, output.broadcast))
            }
            other => Err(self.restore(other, "Phase1")),
        }
    }

    pub fn phase3<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<(BTreeMap<PartyIndex, TransmitPhase3to4>, BroadcastPhase3to4)> {
        match self.take()? {
            DkgState::Phase2 { unique_keep, keep } => {
                let output =
                    phase3(&self.data, &unique_keep, &keep, rng).map_err(|e| self.fail(e))?;
                self.state = DkgState::Phase3 {
                    unique_keep: output.unique_keep,
                    keep: output.keep,
                };
                Ok((output.transmit, output.broadcast))
            }
            other => Err(self.restore(other, "Phase2")),
        }
    }

    /// Verifies everything received since phase 2 and outputs the key share.
    pub fn phase4(
        &mut self,
        transmits2: &BTreeMap<PartyIndex, TransmitPhase2to4>,
        broadcasts2: &BTreeMap<PartyIndex, BroadcastPhase2to4>,
        transmits3: &BTreeMap<PartyIndex, TransmitPhase3to4>,
        broadcasts3: &BTreeMap<PartyIndex, BroadcastPhase3to4>,
    ) -> Result<KeyShare> {
        match self.take()? {
            DkgState::Phase3 { unique_keep, keep } => {
                let key_share = phase4(
                    &self.data,
                    &unique_keep,
                    &keep,
                    transmits2,
                    broadcasts2,
                    transmits3,
                    broadcasts3,
                )
                .map_err(|e| self.fail(e))?;
                self.state = DkgState::Done;
                Ok(key_share)
            }
            other => Err(self.restore(other, "Phase3")),
        }
    }

    fn take(&mut self) -> Result<DkgState> {
        match std::mem::replace(&mut self.state, DkgState::Abandoned) {
            DkgState::Abandoned => Err(Error::SessionAbandoned),
            state => Ok(state),
        }
    }

    fn restore(&mut self, state: DkgState, expected: &'static str) -> Error {
        let actual = state.name();
        self.state = state;
        Error::InvalidPhase { expected, actual }
    }

    fn fail(&self, error: Error) -> Error {
        warn!(
            party = self.data.party_index,
            culprit = ?error.culprit(),
            %error,
            "DKG aborted"
        );
        error
    }
}
