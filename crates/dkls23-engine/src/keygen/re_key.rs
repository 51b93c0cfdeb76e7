//! Import of an existing secret key
//!
//! A trusted dealer splits a key it already has and runs the remaining
//! DKG phases for every party in one process, so that the shares come with
//! zero-share seeds and multiplication setups like any other key.

use super::dkg::{evaluate_polynomial, phase2_with_point, phase3, phase4};
use crate::derivation::DerivData;
use crate::types::ChainCode;
use crate::{Error, KeyShare, Parameters, PartyIndex, Result, SessionData};
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use tracing::{info, instrument};
use zeroize::Zeroize;

/// Splits `secret_key` into `share_count` key shares.
///
/// # Arguments
/// * `parameters` - Threshold and share count
/// * `session_id` - Session id recorded in the shares
/// * `secret_key` - The key to import
/// * `chain_code` - Chain code of the imported key, random if `None`
///
/// # Returns
/// One key share per party, ordered by index
#[instrument(skip(secret_key, chain_code, rng))]
pub fn re_key<R: RngCore + CryptoRng>(
    parameters: &Parameters,
    session_id: &[u8],
    secret_key: &Scalar,
    chain_code: Option<ChainCode>,
    rng: &mut R,
) -> Result<Vec<KeyShare>> {
    parameters.validate()?;
    if *secret_key == Scalar::ZERO {
        return Err(Error::Crypto("Secret key is zero".into()));
    }

    let mut coefficients = vec![*secret_key];
    coefficients.extend((1..parameters.threshold).map(|_| Scalar::random(&mut *rng)));

    let all: Vec<SessionData> = parameters
        .indices()
        .map(|index| SessionData::new(*parameters, index, session_id))
        .collect::<Result<_>>()?;

    let mut outputs2 = BTreeMap::new();
    for data in &all {
        let point = evaluate_polynomial(&coefficients, data.party_index);
        outputs2.insert(data.party_index, phase2_with_point(data, point, rng));
    }
    coefficients.zeroize();

    let mut outputs3 = BTreeMap::new();
    for data in &all {
        let output = &outputs2[&data.party_index];
        outputs3.insert(
            data.party_index,
            phase3(data, &output.unique_keep, &output.keep, rng)?,
        );
    }

    let broadcasts2 = outputs2
        .iter()
        .map(|(&index, output)| (index, output.broadcast.clone()))
        .collect();
    let broadcasts3 = outputs3
        .iter()
        .map(|(&index, output)| (index, output.broadcast.clone()))
        .collect();

    let chain_code = match chain_code {
        Some(chain_code) => chain_code,
        None => {
            let mut chain_code = [0u8; 32];
            rng.fill_bytes(&mut chain_code);
            chain_code
        }
    };
    let public_key = (ProjectivePoint::GENERATOR * secret_key).to_affine();

    let mut shares = Vec::with_capacity(all.len());
    for data in &all {
        let me = data.party_index;
        let transmits2 = inbox(&outputs2, me, |output| &output.transmit);
        let transmits3 = inbox(&outputs3, me, |output| &output.transmit);
        let output = &outputs3[&me];

        let mut share = phase4(
            data,
            &output.unique_keep,
            &output.keep,
            &transmits2,
            &broadcasts2,
            &transmits3,
            &broadcasts3,
        )?;
        if share.public_key != public_key {
            return Err(Error::InconsistentPublicKey);
        }
        share.derivation = DerivData::master(chain_code);
        shares.push(share);
    }

    info!(public_key = %shares[0].public_key_hex(), "Key imported");
    Ok(shares)
}

/// The pairwise messages addressed to `receiver`.
fn inbox<O, T: Clone>(
    outputs: &BTreeMap<PartyIndex, O>,
    receiver: PartyIndex,
    transmit: impl Fn(&O) -> &BTreeMap<PartyIndex, T>,
) -> BTreeMap<PartyIndex, T> {
    outputs
        .iter()
        .filter_map(|(&sender, output)| {
            transmit(output)
                .get(&receiver)
                .map(|message| (sender, message.clone()))
        })
        .collect()
}
