//! DKG protocol implementation
//!
//! Four phases in the style of DKLs23 Protocol 9.1. Feldman-style sharing
//! of a random polynomial, proofs of knowledge committed before they are
//! revealed, pairwise zero-share seeds and base OTs for the multiplications
//! used during signing.

use super::messages::*;
use super::DkgSession;
use crate::derivation::DerivData;
use crate::mpc::{index_by, send_all, with_timeout, Relay};
use crate::oblivious::{setup_session_id, MulReceiver, MulSender, OTSender};
use crate::primitives::{index_scalar, join_fields, lagrange_coefficient, random_bytes};
use crate::proofs::{commit, verify_commitment, DLogProof, ProofCommitment};
use crate::types::{compute_eth_address, message_from, ChainCode};
use crate::zero_shares::ZeroShare;
use crate::{
    EngineConfig, Error, KeyShare, Parameters, PartiesMessage, PartyIndex, PhaseOutput, Result,
    SessionData,
};
use k256::{elliptic_curve::Field, AffinePoint, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};
use zeroize::Zeroize;

/// Session id of the DLog proof of party `index`.
pub fn dlog_session_id(session_id: &[u8], index: PartyIndex) -> Vec<u8> {
    join_fields(&[session_id, b"DLogProof".as_slice(), &[index]])
}

/// Run the distributed key generation protocol
///
/// Drives a [`DkgSession`] through its four phases over `relay`, waiting at
/// most `config.round_timeout` for each round of messages.
///
/// # Arguments
/// * `data` - Parameters, our index and the session id
/// * `relay` - Message relay for communication
/// * `config` - Driver settings
///
/// # Returns
/// The party's key share after successful DKG
#[instrument(skip(relay, config), fields(party = data.party_index))]
pub async fn run_dkg<R: Relay>(
    data: &SessionData,
    relay: &R,
    config: &EngineConfig,
) -> Result<KeyShare> {
    info!(
        party = data.party_index,
        threshold = data.parameters.threshold,
        share_count = data.parameters.share_count,
        "Starting DKG"
    );

    let mut session = DkgSession::new(data.clone())?;
    let result = drive(&mut session, relay, config).await;
    if result.is_err() {
        session.abandon();
    }

    let key_share = result?;
    info!(
        party = data.party_index,
        public_key = %key_share.public_key_hex(),
        "DKG complete"
    );
    Ok(key_share)
}

async fn drive<R: Relay>(
    session: &mut DkgSession,
    relay: &R,
    config: &EngineConfig,
) -> Result<KeyShare> {
    let data = session.data().clone();
    let sid = data.session_id.as_slice();
    let me = data.party_index;
    let n = usize::from(data.parameters.share_count);
    let timeout = config.round_timeout;
    let mut rng = OsRng;

    let transmit = session.phase1(&mut rng)?;
    send_all(relay, sid, 1, &transmit).await?;
    let fragments: Vec<TransmitPhase1to2> = with_timeout(
        timeout,
        "DKG round 1",
        relay.collect_direct(sid, 1, me, n - 1),
    )
    .await?;
    let fragments = index_by(fragments, |m| m.parties.sender);

    let (transmit, broadcast) = session.phase2(&fragments, &mut rng)?;
    send_all(relay, sid, 2, &transmit).await?;
    relay.broadcast(sid, 2, &broadcast).await?;
    let transmits2: Vec<TransmitPhase2to4> = with_timeout(
        timeout,
        "DKG round 2",
        relay.collect_direct(sid, 2, me, n - 1),
    )
    .await?;
    let broadcasts2: Vec<BroadcastPhase2to4> = with_timeout(
        timeout,
        "DKG round 2 broadcasts",
        relay.collect_broadcasts(sid, 2, n),
    )
    .await?;

    let (transmit, broadcast) = session.phase3(&mut rng)?;
    send_all(relay, sid, 3, &transmit).await?;
    relay.broadcast(sid, 3, &broadcast).await?;
    let transmits3: Vec<TransmitPhase3to4> = with_timeout(
        timeout,
        "DKG round 3",
        relay.collect_direct(sid, 3, me, n - 1),
    )
    .await?;
    let broadcasts3: Vec<BroadcastPhase3to4> = with_timeout(
        timeout,
        "DKG round 3 broadcasts",
        relay.collect_broadcasts(sid, 3, n),
    )
    .await?;

    session.phase4(
        &index_by(transmits2, |m| m.parties.sender),
        &index_by(broadcasts2, |m| m.sender),
        &index_by(transmits3, |m| m.parties.sender),
        &index_by(broadcasts3, |m| m.sender),
    )
}

/// Phase 1: samples a polynomial of degree `t - 1` and evaluates it at every
/// party index. Our own evaluation is the unique keep.
#[instrument(skip_all, fields(party = data.party_index))]
pub fn phase1<R: RngCore + CryptoRng>(
    data: &SessionData,
    rng: &mut R,
) -> PhaseOutput<Scalar, (), TransmitPhase1to2, ()> {
    let me = data.party_index;
    let mut coefficients: Vec<Scalar> = (0..data.parameters.threshold)
        .map(|_| Scalar::random(&mut *rng))
        .collect();

    let mut own_fragment = Scalar::ZERO;
    let mut transmit = BTreeMap::new();
    for index in data.parameters.indices() {
        let fragment = evaluate_polynomial(&coefficients, index);
        if index == me {
            own_fragment = fragment;
        } else {
            transmit.insert(
                index,
                TransmitPhase1to2 {
                    parties: PartiesMessage {
                        sender: me,
                        receiver: index,
                    },
                    fragment,
                },
            );
        }
    }
    coefficients.zeroize();

    debug!(fragments = transmit.len(), "DKG phase 1 done");
    PhaseOutput {
        unique_keep: own_fragment,
        keep: BTreeMap::new(),
        transmit,
        broadcast: (),
    }
}

/// Phase 2: adds up the fragments into `p(i)`, commits to a proof of
/// knowledge of it, and commits to the zero-share seeds and the auxiliary
/// chain code.
#[instrument(skip_all, fields(party = data.party_index))]
pub fn phase2<R: RngCore + CryptoRng>(
    data: &SessionData,
    own_fragment: &Scalar,
    fragments: &BTreeMap<PartyIndex, TransmitPhase1to2>,
    rng: &mut R,
) -> Result<PhaseOutput<UniqueKeepPhase2to3, KeepPhase2to3, TransmitPhase2to4, BroadcastPhase2to4>>
{
    let me = data.party_index;

    let mut poly_point = *own_fragment;
    for index in data.counterparties() {
        let message = message_from(fragments, index)?;
        message.parties.check(index, me)?;
        poly_point += message.fragment;
    }

    Ok(phase2_with_point(data, poly_point, rng))
}

/// Phase 2 once `p(i)` is known.
pub(super) fn phase2_with_point<R: RngCore + CryptoRng>(
    data: &SessionData,
    poly_point: Scalar,
    rng: &mut R,
) -> PhaseOutput<UniqueKeepPhase2to3, KeepPhase2to3, TransmitPhase2to4, BroadcastPhase2to4> {
    let me = data.party_index;
    let dlog_sid = dlog_session_id(&data.session_id, me);
    let (proof, commitment) = DLogProof::prove_commit(&poly_point, &dlog_sid, rng);
    let proof_commitment = ProofCommitment {
        index: me,
        proof,
        commitment,
    };

    let mut keep = BTreeMap::new();
    let mut transmit = BTreeMap::new();
    for index in data.counterparties() {
        let (zero_seed, zero_commitment, zero_salt) = ZeroShare::generate_seed_with_commitment(rng);
        keep.insert(
            index,
            KeepPhase2to3 {
                zero_seed,
                zero_salt,
            },
        );
        transmit.insert(
            index,
            TransmitPhase2to4 {
                parties: PartiesMessage {
                    sender: me,
                    receiver: index,
                },
                zero_commitment,
            },
        );
    }

    let aux_chain_code: ChainCode = random_bytes(rng);
    let (cc_commitment, cc_salt) = commit(rng, &aux_chain_code);

    let broadcast = BroadcastPhase2to4 {
        sender: me,
        proof_commitment: proof_commitment.commitment,
        cc_commitment,
    };

    debug!("DKG phase 2 done");
    PhaseOutput {
        unique_keep: UniqueKeepPhase2to3 {
            poly_point,
            proof_commitment,
            aux_chain_code,
            cc_salt,
        },
        keep,
        transmit,
        broadcast,
    }
}

/// Phase 3: reveals the zero-share seeds, starts the base OTs in both roles
/// with every counterparty, and reveals the proof and chain code.
#[instrument(skip_all, fields(party = data.party_index))]
pub fn phase3<R: RngCore + CryptoRng>(
    data: &SessionData,
    unique_kept: &UniqueKeepPhase2to3,
    kept: &BTreeMap<PartyIndex, KeepPhase2to3>,
    rng: &mut R,
) -> Result<PhaseOutput<UniqueKeepPhase3to4, KeepPhase3to4, TransmitPhase3to4, BroadcastPhase3to4>>
{
    let me = data.party_index;

    let mut keep = BTreeMap::new();
    let mut transmit = BTreeMap::new();
    for index in data.counterparties() {
        let zero = message_from(kept, index)?;

        // We receive in the multiplications with `index` as sender, so we
        // are the base-OT sender there, and the other way round.
        let (ot_sender, ot_sender_message) =
            OTSender::init(&setup_session_id(me, index, &data.session_id), rng);
        let (mul_sender_init, ot_seed, enc_proofs) =
            MulSender::init_phase1(&setup_session_id(index, me, &data.session_id), rng);

        transmit.insert(
            index,
            TransmitPhase3to4 {
                parties: PartiesMessage {
                    sender: me,
                    receiver: index,
                },
                zero_seed: zero.zero_seed,
                zero_salt: zero.zero_salt.clone(),
                ot_sender_message,
                ot_seed,
                enc_proofs,
            },
        );
        keep.insert(
            index,
            KeepPhase3to4 {
                zero_seed: zero.zero_seed,
                ot_sender,
                mul_sender_init,
            },
        );
    }

    let broadcast = BroadcastPhase3to4 {
        sender: me,
        proof: unique_kept.proof_commitment.proof.clone(),
        aux_chain_code: unique_kept.aux_chain_code,
        cc_salt: unique_kept.cc_salt.clone(),
    };

    debug!("DKG phase 3 done");
    Ok(PhaseOutput {
        unique_keep: UniqueKeepPhase3to4 {
            poly_point: unique_kept.poly_point,
        },
        keep,
        transmit,
        broadcast,
    })
}

/// Phase 4: verifies everything revealed against its commitment and
/// assembles the key share.
///
/// Checks run party by party in ascending order, and in this order: proof
/// commitments, DLog proofs, the public key, zero-share seeds, base OTs and
/// chain codes. The first failure aborts with the index of the party at
/// fault.
#[instrument(skip_all, fields(party = data.party_index))]
pub fn phase4(
    data: &SessionData,
    unique_kept: &UniqueKeepPhase3to4,
    kept: &BTreeMap<PartyIndex, KeepPhase3to4>,
    transmits2: &BTreeMap<PartyIndex, TransmitPhase2to4>,
    broadcasts2: &BTreeMap<PartyIndex, BroadcastPhase2to4>,
    transmits3: &BTreeMap<PartyIndex, TransmitPhase3to4>,
    broadcasts3: &BTreeMap<PartyIndex, BroadcastPhase3to4>,
) -> Result<KeyShare> {
    let me = data.party_index;
    let sid = data.session_id.as_slice();

    let mut points = BTreeMap::new();
    for index in data.parameters.indices() {
        let committed = message_from(broadcasts2, index)?;
        let revealed = message_from(broadcasts3, index)?;
        if committed.sender != index || revealed.sender != index {
            return Err(Error::UnexpectedMessage {
                from: revealed.sender,
                to: me,
            });
        }

        let dlog_sid = dlog_session_id(sid, index);
        if !revealed.proof.opens(&committed.proof_commitment, &dlog_sid) {
            return Err(Error::CommitmentMismatch { party: index });
        }
        if !revealed.proof.verify(&dlog_sid) {
            return Err(Error::ProofVerificationFailed { party: index });
        }
        points.insert(index, revealed.proof.point);
    }

    let public_key = step5(&data.parameters, &points)?;
    let own_point = (ProjectivePoint::GENERATOR * unique_kept.poly_point).to_affine();
    if points.get(&me) != Some(&own_point) {
        return Err(Error::InconsistentPublicKey);
    }
    if public_key == AffinePoint::IDENTITY || public_key == AffinePoint::GENERATOR {
        return Err(Error::Crypto("Trivial public key".into()));
    }
    if unique_kept.poly_point == Scalar::ZERO || unique_kept.poly_point == Scalar::ONE {
        return Err(Error::Crypto("Trivial key share".into()));
    }

    let mut seed_pairs = Vec::new();
    for index in data.counterparties() {
        let commitment = message_from(transmits2, index)?;
        let reveal = message_from(transmits3, index)?;
        commitment.parties.check(index, me)?;
        reveal.parties.check(index, me)?;

        if !ZeroShare::verify_seed(&reveal.zero_seed, &commitment.zero_commitment, &reveal.zero_salt)
        {
            return Err(Error::CommitmentMismatch { party: index });
        }
        let own = message_from(kept, index)?;
        seed_pairs.push(ZeroShare::generate_seed_pair(
            me,
            index,
            &own.zero_seed,
            &reveal.zero_seed,
        ));
    }
    let zero_share = ZeroShare::initialize(seed_pairs);

    let mut mul_receivers = BTreeMap::new();
    let mut mul_senders = BTreeMap::new();
    for index in data.counterparties() {
        let reveal = message_from(transmits3, index)?;
        let own = message_from(kept, index)?;

        let receiver = MulReceiver::init_phase2(
            &own.ot_sender,
            &setup_session_id(me, index, sid),
            &reveal.ot_seed,
            &reveal.enc_proofs,
        )
        .ok_or(Error::ProofVerificationFailed { party: index })?;
        let sender = MulSender::init_phase2(
            &own.mul_sender_init,
            &setup_session_id(index, me, sid),
            &reveal.ot_sender_message,
        )
        .ok_or(Error::ProofVerificationFailed { party: index })?;

        mul_receivers.insert(index, receiver);
        mul_senders.insert(index, sender);
    }

    let mut chain_code: ChainCode = [0; 32];
    for index in data.parameters.indices() {
        let committed = message_from(broadcasts2, index)?;
        let revealed = message_from(broadcasts3, index)?;
        if !verify_commitment(&revealed.aux_chain_code, &committed.cc_commitment, &revealed.cc_salt)
        {
            return Err(Error::CommitmentMismatch { party: index });
        }
        for (byte, aux) in chain_code.iter_mut().zip(revealed.aux_chain_code.iter()) {
            *byte ^= aux;
        }
    }

    debug!("DKG phase 4 done");
    Ok(KeyShare {
        parameters: data.parameters,
        party_index: me,
        session_id: data.session_id.clone(),
        secret_share: unique_kept.poly_point,
        public_key,
        zero_share,
        mul_senders,
        mul_receivers,
        derivation: DerivData::master(chain_code),
        eth_address: compute_eth_address(&public_key),
    })
}

/// Interpolates the public key from the points `p(j)·G` of every window of
/// `t` consecutive indices and checks that all windows agree.
pub fn step5(
    parameters: &Parameters,
    points: &BTreeMap<PartyIndex, AffinePoint>,
) -> Result<AffinePoint> {
    let t = parameters.threshold;
    let mut public_key = None;

    for start in 1..=(parameters.share_count - t + 1) {
        let window: Vec<PartyIndex> = (start..=start + (t - 1)).collect();
        let mut candidate = ProjectivePoint::IDENTITY;
        for &index in &window {
            let point = points
                .get(&index)
                .ok_or(Error::MissingMessage { party: index })?;
            let lambda = lagrange_coefficient(index, &window)
                .ok_or(Error::InvalidPartyIndex(index))?;
            candidate += ProjectivePoint::from(*point) * lambda;
        }

        let candidate = candidate.to_affine();
        match public_key {
            None => public_key = Some(candidate),
            Some(key) if key != candidate => return Err(Error::InconsistentPublicKey),
            Some(_) => {}
        }
    }

    public_key.ok_or(Error::InconsistentPublicKey)
}

pub(super) fn evaluate_polynomial(coefficients: &[Scalar], index: PartyIndex) -> Scalar {
    let x = index_scalar(index);
    coefficients
        .iter()
        .rev()
        .fold(Scalar::ZERO, |acc, coefficient| acc * x + coefficient)
}
