//! DSG protocol implementation
//!
//! Protocol 3.6 of DKLs23. Every signer `i` holds a nonce share `k_i` and an
//! inversion mask `φ_i`. The pairwise multiplications give additive shares
//! of `k·φ` and `sk·φ`, and the signature is `s = (H(m)·φ + r·sk·φ) / (k·φ)`.

use k256::elliptic_curve::scalar::IsHigh;
use super::messages::*;
use super::SignSession;
use crate::mpc::{index_by, send_all, with_timeout, Relay};
use crate::oblivious::mul_session_id;
use crate::primitives::{
    join_fields, lagrange_coefficient, random_bytes, reduce_to_scalar, scalar_from_bytes,
    scalar_to_bytes, x_coordinate, HashOutput,
};
use crate::proofs::{commit_point, verify_commitment_point};
use crate::types::message_from;
use crate::{
    EngineConfig, Error, KeyShare, PartiesMessage, PartyIndex, PhaseOutput, Result, SignData,
    Signature,
};
use k256::{
    elliptic_curve::{point::AffineCoordinates, Field},
    AffinePoint, ProjectivePoint, Scalar,
};
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Relay session of one signature.
fn sign_session_id(key_share: &KeyShare, sign_id: &[u8]) -> Vec<u8> {
    join_fields(&[key_share.session_id.as_slice(), sign_id])
}

/// Session id of the zero shares of one signing run. Every signer's run
/// nonce is mixed in, in ascending party order.
fn zero_session_id(
    key_share: &KeyShare,
    sign_id: &[u8],
    run_nonces: &BTreeMap<PartyIndex, HashOutput>,
) -> Vec<u8> {
    let mut fields = vec![
        b"Zero shares".as_slice(),
        key_share.session_id.as_slice(),
        sign_id,
    ];
    fields.extend(run_nonces.values().map(|nonce| nonce.as_slice()));
    join_fields(&fields)
}

/// Run the distributed signature generation protocol
///
/// # Arguments
/// * `key_share` - This party's key share
/// * `sign_data` - Sign id, the other signers and the message hash
/// * `relay` - Message relay for communication
/// * `config` - Driver settings
///
/// # Returns
/// A signature that verifies under the group public key
#[instrument(skip(key_share, relay, config), fields(party = key_share.party_index))]
pub async fn run_dsg<R: Relay>(
    key_share: &KeyShare,
    sign_data: &SignData,
    relay: &R,
    config: &EngineConfig,
) -> Result<Signature> {
    info!(
        party = key_share.party_index,
        signers = ?sign_data.signers(key_share.party_index),
        "Starting DSG"
    );

    let mut session = SignSession::new(key_share.clone(), sign_data.clone())?;
    let result = drive(&mut session, relay, config).await;
    if result.is_err() {
        session.abandon();
    }

    let signature = result?;
    info!(
        party = key_share.party_index,
        r = %hex::encode(signature.r),
        "DSG complete"
    );
    Ok(signature)
}

async fn drive<R: Relay>(
    session: &mut SignSession,
    relay: &R,
    config: &EngineConfig,
) -> Result<Signature> {
    let me = session.key_share().party_index;
    let sid = sign_session_id(session.key_share(), &session.sign_data().sign_id);
    let peers = session.sign_data().counterparties.len();
    let timeout = config.round_timeout;
    let mut rng = OsRng;

    let transmit = session.phase1(&mut rng)?;
    send_all(relay, &sid, 1, &transmit).await?;
    let received: Vec<TransmitPhase1to2> =
        with_timeout(timeout, "DSG round 1", relay.collect_direct(&sid, 1, me, peers)).await?;

    let transmit = session.phase2(&index_by(received, |m| m.parties.sender), &mut rng)?;
    send_all(relay, &sid, 2, &transmit).await?;
    let received: Vec<TransmitPhase2to3> =
        with_timeout(timeout, "DSG round 2", relay.collect_direct(&sid, 2, me, peers)).await?;

    let broadcast = session.phase3(&index_by(received, |m| m.parties.sender))?;
    relay.broadcast(&sid, 3, &broadcast).await?;
    let received: Vec<Broadcast3to4> = with_timeout(
        timeout,
        "DSG round 3",
        relay.collect_broadcasts(&sid, 3, peers + 1),
    )
    .await?;

    session.phase4(&index_by(received, |m| m.sender), config.normalize_signatures)
}

/// Phase 1: samples the nonce share, the inversion mask and the run nonce,
/// commits to the instance point and starts the multiplications where we
/// receive.
#[instrument(skip_all, fields(party = key_share.party_index))]
pub fn phase1<R: RngCore + CryptoRng>(
    key_share: &KeyShare,
    sign_data: &SignData,
    rng: &mut R,
) -> Result<PhaseOutput<UniqueKeepPhase1to2, KeepPhase1to2, TransmitPhase1to2, ()>> {
    let me = key_share.party_index;
    sign_data.validate(&key_share.parameters, me)?;

    let instance_key = Scalar::random(&mut *rng);
    let inversion_mask = Scalar::random(&mut *rng);
    let instance_point = (ProjectivePoint::GENERATOR * instance_key).to_affine();
    let run_nonce: HashOutput = random_bytes(rng);

    let mut keep = BTreeMap::new();
    let mut transmit = BTreeMap::new();
    for &index in &sign_data.counterparties {
        let receiver = key_share
            .mul_receivers
            .get(&index)
            .ok_or(Error::InvalidPartyIndex(index))?;

        let (commitment, salt) = commit_point(rng, &instance_point);
        let mul_sid = mul_session_id(
            me,
            index,
            &key_share.session_id,
            &sign_data.sign_id,
            &run_nonce,
        );
        let (chi, mul_keep, mul_transmit) = receiver.run_phase1(&mul_sid, rng);

        keep.insert(
            index,
            KeepPhase1to2 {
                salt,
                chi,
                mul_keep,
            },
        );
        transmit.insert(
            index,
            TransmitPhase1to2 {
                parties: PartiesMessage {
                    sender: me,
                    receiver: index,
                },
                run_nonce,
                commitment,
                mul_transmit,
            },
        );
    }

    debug!("DSG phase 1 done");
    Ok(PhaseOutput {
        unique_keep: UniqueKeepPhase1to2 {
            instance_key,
            instance_point,
            inversion_mask,
            run_nonce,
        },
        keep,
        transmit,
        broadcast: (),
    })
}

/// Phase 2: computes our zero share from the run nonces of every signer and
/// our additive key share for this signing set, then runs the
/// multiplications where we send, on `[instance_key, key_share]`.
#[instrument(skip_all, fields(party = key_share.party_index))]
pub fn phase2<R: RngCore + CryptoRng>(
    key_share: &KeyShare,
    sign_data: &SignData,
    unique_kept: UniqueKeepPhase1to2,
    kept: BTreeMap<PartyIndex, KeepPhase1to2>,
    received: &BTreeMap<PartyIndex, TransmitPhase1to2>,
    rng: &mut R,
) -> Result<PhaseOutput<UniqueKeepPhase2to3, KeepPhase2to3, TransmitPhase2to3, ()>> {
    let me = key_share.party_index;

    let mut run_nonces = BTreeMap::from([(me, unique_kept.run_nonce)]);
    for &index in &sign_data.counterparties {
        let message = message_from(received, index)?;
        message.parties.check(index, me)?;
        run_nonces.insert(index, message.run_nonce);
    }
    let zeta = key_share.zero_share.compute(
        &sign_data.counterparties,
        &zero_session_id(key_share, &sign_data.sign_id, &run_nonces),
    )?;

    let signers = sign_data.signers(me);
    let lambda = lagrange_coefficient(me, &signers).ok_or(Error::InvalidPartyIndex(me))?;
    let key_share_value = lambda * key_share.secret_share + zeta;
    let public_share = (ProjectivePoint::GENERATOR * key_share_value).to_affine();
    let input = [unique_kept.instance_key, key_share_value];

    let mut keep = BTreeMap::new();
    let mut transmit = BTreeMap::new();
    for &index in &sign_data.counterparties {
        let message = message_from(received, index)?;
        let current = message_from(&kept, index)?;
        let sender = key_share
            .mul_senders
            .get(&index)
            .ok_or(Error::InvalidPartyIndex(index))?;

        let mul_sid = mul_session_id(
            index,
            me,
            &key_share.session_id,
            &sign_data.sign_id,
            &message.run_nonce,
        );
        let (c_values, mul_transmit) = sender
            .run(&mul_sid, &input, &message.mul_transmit, rng)
            .ok_or(Error::MtAConsistencyFailed {
                party_pair: (me, index),
            })?;
        let (c_u, c_v) = (c_values[0], c_values[1]);

        transmit.insert(
            index,
            TransmitPhase2to3 {
                parties: PartiesMessage {
                    sender: me,
                    receiver: index,
                },
                gamma_u: (ProjectivePoint::GENERATOR * c_u).to_affine(),
                gamma_v: (ProjectivePoint::GENERATOR * c_v).to_affine(),
                psi: unique_kept.inversion_mask - current.chi,
                public_share,
                instance_point: unique_kept.instance_point,
                salt: current.salt.clone(),
                mul_transmit,
            },
        );
        keep.insert(
            index,
            KeepPhase2to3 {
                c_u,
                c_v,
                commitment: message.commitment,
                mul_keep: current.mul_keep.clone(),
                chi: current.chi,
            },
        );
    }

    debug!("DSG phase 2 done");
    Ok(PhaseOutput {
        unique_keep: UniqueKeepPhase2to3 {
            instance_key: unique_kept.instance_key,
            instance_point: unique_kept.instance_point,
            inversion_mask: unique_kept.inversion_mask,
            key_share: key_share_value,
            public_share,
            run_nonce: unique_kept.run_nonce,
        },
        keep,
        transmit,
        broadcast: (),
    })
}

/// Phase 3: opens the instance points, finishes the multiplications where we
/// receive and checks them, then computes our shares `u` and `w`.
#[instrument(skip_all, fields(party = key_share.party_index))]
pub fn phase3(
    key_share: &KeyShare,
    sign_data: &SignData,
    unique_kept: UniqueKeepPhase2to3,
    kept: BTreeMap<PartyIndex, KeepPhase2to3>,
    received: &BTreeMap<PartyIndex, TransmitPhase2to3>,
) -> Result<PhaseOutput<UniqueKeepPhase3to4, (), (), Broadcast3to4>> {
    let me = key_share.party_index;

    let mut expected_public_key = ProjectivePoint::from(unique_kept.public_share);
    let mut total_instance_point = ProjectivePoint::from(unique_kept.instance_point);
    let mut first_sum = unique_kept.inversion_mask;
    let mut second_sum_u = Scalar::ZERO;
    let mut second_sum_v = Scalar::ZERO;

    for &index in &sign_data.counterparties {
        let message = message_from(received, index)?;
        message.parties.check(index, me)?;
        let current = message_from(&kept, index)?;

        if !verify_commitment_point(&message.instance_point, &current.commitment, &message.salt) {
            return Err(Error::CommitmentMismatch { party: index });
        }

        let inconsistent = Error::MtAConsistencyFailed {
            party_pair: (me, index),
        };
        let receiver = key_share
            .mul_receivers
            .get(&index)
            .ok_or(Error::InvalidPartyIndex(index))?;
        let mul_sid = mul_session_id(
            me,
            index,
            &key_share.session_id,
            &sign_data.sign_id,
            &unique_kept.run_nonce,
        );
        let d_values = receiver
            .run_phase2(&mul_sid, &current.mul_keep, &message.mul_transmit)
            .ok_or(Error::MtAConsistencyFailed {
                party_pair: (me, index),
            })?;
        let (d_u, d_v) = (d_values[0], d_values[1]);

        let generator = ProjectivePoint::GENERATOR;
        if ProjectivePoint::from(message.instance_point) * current.chi
            != ProjectivePoint::from(message.gamma_u) + generator * d_u
        {
            return Err(inconsistent);
        }
        if ProjectivePoint::from(message.public_share) * current.chi
            != ProjectivePoint::from(message.gamma_v) + generator * d_v
        {
            return Err(inconsistent);
        }

        expected_public_key += ProjectivePoint::from(message.public_share);
        total_instance_point += ProjectivePoint::from(message.instance_point);
        first_sum += message.psi;
        second_sum_u += current.c_u + d_u;
        second_sum_v += current.c_v + d_v;
    }

    if expected_public_key.to_affine() != key_share.public_key {
        return Err(Error::InconsistentPublicKey);
    }

    let instance_point = total_instance_point.to_affine();
    if instance_point == AffinePoint::IDENTITY {
        return Err(Error::Crypto("Instance point is the identity".into()));
    }
    let x_coord = x_coordinate(&instance_point);
    let r = reduce_to_scalar(&x_coord);

    let u = unique_kept.instance_key * first_sum + second_sum_u;
    let v = unique_kept.key_share * first_sum + second_sum_v;
    let w = reduce_to_scalar(&sign_data.message_hash) * unique_kept.inversion_mask + r * v;

    debug!("DSG phase 3 done");
    Ok(PhaseOutput {
        unique_keep: UniqueKeepPhase3to4 {
            instance_point,
            x_coord,
        },
        keep: BTreeMap::new(),
        transmit: BTreeMap::new(),
        broadcast: Broadcast3to4 { sender: me, u, w },
    })
}

/// Phase 4: combines the broadcasts of every signer, ourselves included, into
/// the signature and verifies it before releasing it.
#[instrument(skip_all, fields(party = key_share.party_index))]
pub fn phase4(
    key_share: &KeyShare,
    sign_data: &SignData,
    unique_kept: &UniqueKeepPhase3to4,
    received: &BTreeMap<PartyIndex, Broadcast3to4>,
    normalize: bool,
) -> Result<Signature> {
    let mut numerator = Scalar::ZERO;
    let mut denominator = Scalar::ZERO;
    for index in sign_data.signers(key_share.party_index) {
        let message = message_from(received, index)?;
        if message.sender != index {
            return Err(Error::UnexpectedMessage {
                from: message.sender,
                to: key_share.party_index,
            });
        }
        numerator += message.w;
        denominator += message.u;
    }

    let inverse = Option::<Scalar>::from(denominator.invert())
        .ok_or_else(|| Error::Crypto("Denominator is zero".into()))?;
    let mut s = numerator * inverse;

    let r = reduce_to_scalar(&unique_kept.x_coord);
    let r_bytes = scalar_to_bytes(&r);
    let mut recovery_id = u8::from(bool::from(unique_kept.instance_point.y_is_odd()));
    if r_bytes != unique_kept.x_coord {
        recovery_id |= 2;
    }
    if normalize && bool::from(s.is_high()) {
        s = -s;
        recovery_id ^= 1;
    }

    let s_bytes = scalar_to_bytes(&s);
    if !verify_ecdsa_signature(&sign_data.message_hash, &key_share.public_key, &r_bytes, &s_bytes)
    {
        return Err(Error::InvalidSignature);
    }

    debug!("DSG phase 4 done");
    Ok(Signature::new(r_bytes, s_bytes, recovery_id))
}

/// Plain ECDSA verification of `(r, s)` on a 32-byte message hash. Accepts
/// both low and high `s`.
pub fn verify_ecdsa_signature(
    message_hash: &[u8; 32],
    public_key: &AffinePoint,
    r: &[u8; 32],
    s: &[u8; 32],
) -> bool {
    let (r, s) = match (scalar_from_bytes(r), scalar_from_bytes(s)) {
        (Some(r), Some(s)) => (r, s),
        _ => return false,
    };
    if r == Scalar::ZERO || *public_key == AffinePoint::IDENTITY {
        return false;
    }
    let inverse_s = match Option::<Scalar>::from(s.invert()) {
        Some(inverse) => inverse,
        None => return false,
    };

    let first = reduce_to_scalar(message_hash) * inverse_s;
    let second = r * inverse_s;
    let point =
        (ProjectivePoint::GENERATOR * first + ProjectivePoint::from(*public_key) * second).to_affine();
    if point == AffinePoint::IDENTITY {
        return false;
    }

    reduce_to_scalar(&x_coordinate(&point)) == r
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::keygen;
    use k256::ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey};

    /// Runs the four signing phases for every signer locally. `tamper` may
    /// change the phase 1 messages before they are delivered.
    pub(crate) fn run_local_dsg(
        shares: &[KeyShare],
        signers: &[PartyIndex],
        sign_id: &[u8],
        message_hash: [u8; 32],
        tamper: impl Fn(&mut BTreeMap<PartyIndex, BTreeMap<PartyIndex, TransmitPhase1to2>>),
    ) -> BTreeMap<PartyIndex, Result<Signature>> {
        let mut rng = OsRng;
        let share = |i: PartyIndex| &shares[usize::from(i) - 1];
        let data: BTreeMap<PartyIndex, SignData> = signers
            .iter()
            .map(|&i| {
                let others: Vec<PartyIndex> = signers.iter().copied().filter(|&j| j != i).collect();
                (i, SignData::new(sign_id, &others, message_hash))
            })
            .collect();

        let mut keeps1 = BTreeMap::new();
        let mut transmits1 = BTreeMap::new();
        for &i in signers {
            let out = phase1(share(i), &data[&i], &mut rng).unwrap();
            keeps1.insert(i, (out.unique_keep, out.keep));
            transmits1.insert(i, out.transmit);
        }
        tamper(&mut transmits1);

        let mut results = BTreeMap::new();
        let mut keeps2 = BTreeMap::new();
        let mut transmits2 = BTreeMap::new();
        for &i in signers {
            let (unique, keep) = keeps1.remove(&i).unwrap();
            let inbox = deliver(&transmits1, i);
            match phase2(share(i), &data[&i], unique, keep, &inbox, &mut rng) {
                Ok(out) => {
                    keeps2.insert(i, (out.unique_keep, out.keep));
                    transmits2.insert(i, out.transmit);
                }
                Err(e) => {
                    results.insert(i, Err(e));
                }
            }
        }
        if !results.is_empty() {
            return results;
        }

        let mut keeps3 = BTreeMap::new();
        let mut broadcasts = BTreeMap::new();
        for &i in signers {
            let (unique, keep) = keeps2.remove(&i).unwrap();
            let inbox = deliver(&transmits2, i);
            match phase3(share(i), &data[&i], unique, keep, &inbox) {
                Ok(out) => {
                    keeps3.insert(i, out.unique_keep);
                    broadcasts.insert(i, out.broadcast);
                }
                Err(e) => {
                    results.insert(i, Err(e));
                }
            }
        }
        if !results.is_empty() {
            return results;
        }

        signers
            .iter()
            .map(|&i| (i, phase4(share(i), &data[&i], &keeps3[&i], &broadcasts, true)))
            .collect()
    }

    fn deliver<T: Clone>(
        transmits: &BTreeMap<PartyIndex, BTreeMap<PartyIndex, T>>,
        receiver: PartyIndex,
    ) -> BTreeMap<PartyIndex, T> {
        transmits
            .iter()
            .filter_map(|(&sender, t)| t.get(&receiver).map(|m| (sender, m.clone())))
            .collect()
    }

    fn no_tamper(_: &mut BTreeMap<PartyIndex, BTreeMap<PartyIndex, TransmitPhase1to2>>) {}

    #[test]
    fn signers_agree_on_a_valid_signature() {
        let shares = keygen_shares(2, 3);
        let hash = [0x42; 32];
        let results = run_local_dsg(&shares, &[1, 3], b"sign", hash, no_tamper);

        let signatures: Vec<Signature> = results.into_values().map(|r| r.unwrap()).collect();
        assert_eq!(signatures[0], signatures[1]);

        let signature = &signatures[0];
        assert!(verify_ecdsa_signature(&hash, &shares[0].public_key, &signature.r, &signature.s));

        let key = VerifyingKey::from_affine(shares[0].public_key).unwrap();
        let parsed = k256::ecdsa::Signature::from_scalars(signature.r, signature.s).unwrap();
        assert!(key.verify_prehash(&hash, &parsed).is_ok());

        let recovered = VerifyingKey::recover_from_prehash(
            &hash,
            &parsed,
            k256::ecdsa::RecoveryId::from_byte(signature.recovery_id).unwrap(),
        )
        .unwrap();
        assert_eq!(recovered, key);
    }

    #[test]
    fn nonces_are_fresh_per_signature() {
        let shares = keygen_shares(2, 2);
        let first = run_local_dsg(&shares, &[1, 2], b"one", [1; 32], no_tamper);
        let second = run_local_dsg(&shares, &[1, 2], b"two", [1; 32], no_tamper);

        let first = first[&1].as_ref().unwrap();
        let second = second[&1].as_ref().unwrap();
        assert_ne!(first.r, second.r);
    }

    #[test]
    fn tampered_commitment_names_the_sender() {
        let shares = keygen_shares(2, 2);
        let results = run_local_dsg(&shares, &[1, 2], b"tamper", [0; 32], |transmits| {
            transmits.get_mut(&2).unwrap().get_mut(&1).unwrap().commitment[0] ^= 1;
        });

        assert!(matches!(results[&1], Err(Error::CommitmentMismatch { party: 2 })));
    }

    #[test]
    fn tampered_extension_data_is_detected() {
        let shares = keygen_shares(2, 2);
        let results = run_local_dsg(&shares, &[1, 2], b"ote", [3; 32], |transmits| {
            let data = &mut transmits.get_mut(&1).unwrap().get_mut(&2).unwrap().mul_transmit;
            data.verify_t = data.verify_t ^ crate::oblivious::FieldElement::ONE;
        });

        assert!(matches!(
            results[&2],
            Err(Error::MtAConsistencyFailed { party_pair: (2, 1) })
        ));
    }

    type Transmits<T> = BTreeMap<PartyIndex, BTreeMap<PartyIndex, T>>;

    /// Signing sessions of parties 1 and 2 run through phase 2. `tamper`
    /// changes the round 2 message from party 2 to party 1.
    fn two_sessions_after_phase2(
        shares: &[KeyShare],
        tamper: impl FnOnce(&mut TransmitPhase2to3),
    ) -> (BTreeMap<PartyIndex, SignSession>, Transmits<TransmitPhase2to3>) {
        let mut sessions: BTreeMap<PartyIndex, SignSession> = [(1u8, 2u8), (2, 1)]
            .into_iter()
            .map(|(i, other)| {
                let data = SignData::new(b"consistency", &[other], [0x5a; 32]);
                let share = shares[usize::from(i) - 1].clone();
                (i, SignSession::new(share, data).unwrap())
            })
            .collect();

        let mut transmits1 = BTreeMap::new();
        for (&i, session) in sessions.iter_mut() {
            transmits1.insert(i, session.phase1(&mut OsRng).unwrap());
        }
        let mut transmits2 = BTreeMap::new();
        for (&i, session) in sessions.iter_mut() {
            let inbox = deliver(&transmits1, i);
            transmits2.insert(i, session.phase2(&inbox, &mut OsRng).unwrap());
        }

        tamper(transmits2.get_mut(&2).unwrap().get_mut(&1).unwrap());
        (sessions, transmits2)
    }

    fn shifted(point: AffinePoint) -> AffinePoint {
        (ProjectivePoint::from(point) + ProjectivePoint::GENERATOR).to_affine()
    }

    #[test]
    fn tampered_pairwise_values_fail_the_consistency_check() {
        let shares = keygen_shares(2, 2);
        let tampers: [(&str, fn(&mut TransmitPhase2to3)); 3] = [
            ("gamma_u", |m| m.gamma_u = shifted(m.gamma_u)),
            ("gamma_v", |m| m.gamma_v = shifted(m.gamma_v)),
            ("public_share", |m| m.public_share = shifted(m.public_share)),
        ];

        for (field, tamper) in tampers {
            let (mut sessions, transmits2) = two_sessions_after_phase2(&shares, tamper);
            let session = sessions.get_mut(&1).unwrap();
            let result = session.phase3(&deliver(&transmits2, 1));
            assert!(
                matches!(result, Err(Error::MtAConsistencyFailed { party_pair: (1, 2) })),
                "{field}: {result:?}"
            );
            assert_eq!(session.state(), "Abandoned");

            // The untouched direction still checks out.
            let other = sessions.get_mut(&2).unwrap();
            assert!(other.phase3(&deliver(&transmits2, 2)).is_ok());
        }
    }

    #[test]
    fn tampered_psi_is_caught_before_release() {
        let shares = keygen_shares(2, 2);
        let (mut sessions, transmits2) =
            two_sessions_after_phase2(&shares, |m| m.psi += Scalar::ONE);

        let mut broadcasts = BTreeMap::new();
        for (&i, session) in sessions.iter_mut() {
            broadcasts.insert(i, session.phase3(&deliver(&transmits2, i)).unwrap());
        }
        for session in sessions.values_mut() {
            assert!(matches!(
                session.phase4(&broadcasts, true),
                Err(Error::InvalidSignature)
            ));
            assert_eq!(session.state(), "Abandoned");
        }
    }

    #[test]
    fn corrupted_key_share_breaks_the_public_key_sum() {
        let mut shares = keygen_shares(2, 2);
        shares[1].secret_share += Scalar::ONE;
        let (mut sessions, transmits2) = two_sessions_after_phase2(&shares, |_| {});

        for (&i, session) in sessions.iter_mut() {
            assert!(matches!(
                session.phase3(&deliver(&transmits2, i)),
                Err(Error::InconsistentPublicKey)
            ));
            assert_eq!(session.state(), "Abandoned");
        }
    }

    #[test]
    fn repeated_sign_id_gets_fresh_session_ids() {
        let shares = keygen_shares(2, 2);
        let data = SignData::new(b"again", &[2], [4; 32]);
        let first = phase1(&shares[0], &data, &mut OsRng).unwrap();
        let second = phase1(&shares[0], &data, &mut OsRng).unwrap();
        assert_ne!(first.transmit[&2].run_nonce, second.transmit[&2].run_nonce);
        assert_ne!(first.transmit[&2].mul_transmit, second.transmit[&2].mul_transmit);

        let one = run_local_dsg(&shares, &[1, 2], b"again", [4; 32], no_tamper);
        let two = run_local_dsg(&shares, &[1, 2], b"again", [4; 32], no_tamper);
        let (one, two) = (one[&1].as_ref().unwrap(), two[&1].as_ref().unwrap());
        assert_ne!(one.r, two.r);
        let public_key = shares[0].public_key;
        for signature in [one, two] {
            assert!(verify_ecdsa_signature(&[4; 32], &public_key, &signature.r, &signature.s));
        }
    }

    #[test]
    fn too_few_signers_are_rejected() {
        let shares = keygen_shares(3, 3);
        let data = SignData::new(b"few", &[2], [0; 32]);
        assert!(matches!(
            phase1(&shares[0], &data, &mut OsRng),
            Err(Error::InsufficientCounterparties { required: 2, actual: 1 })
        ));
    }

    #[test]
    fn verification_is_deterministic_and_strict() {
        let shares = keygen_shares(1, 1);
        let hash = [7; 32];
        let results = run_local_dsg(&shares, &[1], b"single", hash, no_tamper);
        let signature = results[&1].as_ref().unwrap();
        let pk = shares[0].public_key;

        for _ in 0..3 {
            assert!(verify_ecdsa_signature(&hash, &pk, &signature.r, &signature.s));
        }

        let mut other = hash;
        other[0] ^= 1;
        assert!(!verify_ecdsa_signature(&other, &pk, &signature.r, &signature.s));
        assert!(!verify_ecdsa_signature(&hash, &pk, &[0; 32], &signature.s));
        assert!(!verify_ecdsa_signature(&hash, &pk, &signature.r, &[0xff; 32]));
    }

    pub(crate) fn keygen_shares(t: u8, n: u8) -> Vec<KeyShare> {
        let parameters = crate::Parameters::new(t, n).unwrap();
        let secret = Scalar::random(&mut OsRng);
        keygen::re_key(&parameters, b"dsg tests", &secret, None, &mut OsRng).unwrap()
    }
}
