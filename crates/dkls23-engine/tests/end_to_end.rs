//! Full DKG and signing runs over the in-memory relay

use dkls23_engine::mpc::MemoryRelay;
use dkls23_engine::sign::{verify_ecdsa_signature, SignSession, TransmitPhase1to2};
use dkls23_engine::{
    keygen, sign, EngineConfig, Error, KeyShare, Parameters, PartyIndex, SessionData, SignData,
    Signature,
};
use futures_util::future::join_all;
use rand::rngs::OsRng;
use std::collections::BTreeMap;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn dkg(t: u8, n: u8, session_id: &[u8]) -> Vec<KeyShare> {
    let parameters = Parameters::new(t, n).unwrap();
    let relay = MemoryRelay::new();
    let config = EngineConfig::default();

    let data: Vec<SessionData> = (1..=n)
        .map(|i| SessionData::new(parameters, i, session_id).unwrap())
        .collect();
    let shares = join_all(data.iter().map(|d| keygen::run_dkg(d, &relay, &config)))
        .await
        .into_iter()
        .map(|result| result.unwrap())
        .collect();
    assert_eq!(relay.pending(), 0);
    shares
}

async fn dsg(
    shares: &[KeyShare],
    signers: &[PartyIndex],
    sign_id: &[u8],
    hash: [u8; 32],
) -> Vec<Signature> {
    let relay = MemoryRelay::new();
    let config = EngineConfig::default();

    let requests: Vec<(&KeyShare, SignData)> = signers
        .iter()
        .map(|&i| {
            let others: Vec<PartyIndex> = signers.iter().copied().filter(|&j| j != i).collect();
            (&shares[usize::from(i) - 1], SignData::new(sign_id, &others, hash))
        })
        .collect();
    let signatures = join_all(
        requests
            .iter()
            .map(|(share, data)| sign::run_dsg(share, data, &relay, &config)),
    )
    .await
    .into_iter()
    .map(|result| result.unwrap())
    .collect();
    assert_eq!(relay.pending(), 0);
    signatures
}

fn inbox<T: Clone>(
    transmits: &BTreeMap<PartyIndex, BTreeMap<PartyIndex, T>>,
    receiver: PartyIndex,
) -> BTreeMap<PartyIndex, T> {
    transmits
        .iter()
        .filter_map(|(&sender, t)| t.get(&receiver).map(|m| (sender, m.clone())))
        .collect()
}

#[tokio::test]
async fn two_of_two_sign_then_detect_tampering() {
    init_tracing();
    let shares = dkg(2, 2, b"end to end").await;
    assert_eq!(shares[0].public_key, shares[1].public_key);
    assert_eq!(shares[0].eth_address, shares[1].eth_address);

    let hash = [0u8; 32];
    let signatures = dsg(&shares, &[1, 2], b"first", hash).await;
    assert_eq!(signatures[0], signatures[1]);
    assert!(verify_ecdsa_signature(
        &hash,
        &shares[0].public_key,
        &signatures[0].r,
        &signatures[0].s
    ));
    assert!(signatures[0].to_der().is_ok());

    // Same signature again, with one bit of party 2's commitment flipped.
    let mut sessions: Vec<SignSession> = [(0usize, 2u8), (1, 1)]
        .iter()
        .map(|&(k, other)| {
            SignSession::new(shares[k].clone(), SignData::new(b"second", &[other], hash)).unwrap()
        })
        .collect();

    let mut transmits1: BTreeMap<PartyIndex, BTreeMap<PartyIndex, TransmitPhase1to2>> =
        BTreeMap::new();
    for (k, session) in sessions.iter_mut().enumerate() {
        transmits1.insert(k as PartyIndex + 1, session.phase1(&mut OsRng).unwrap());
    }
    transmits1.get_mut(&2).unwrap().get_mut(&1).unwrap().commitment[7] ^= 0x10;

    let mut transmits2 = BTreeMap::new();
    for (k, session) in sessions.iter_mut().enumerate() {
        let i = k as PartyIndex + 1;
        transmits2.insert(i, session.phase2(&inbox(&transmits1, i), &mut OsRng).unwrap());
    }

    let result = sessions[0].phase3(&inbox(&transmits2, 1));
    assert!(matches!(result, Err(Error::CommitmentMismatch { party: 2 })));
    assert_eq!(result.unwrap_err().culprit(), Some(2));
    assert_eq!(sessions[0].state(), "Abandoned");
    assert!(matches!(
        sessions[0].phase4(&BTreeMap::new(), true),
        Err(Error::SessionAbandoned)
    ));
}

#[tokio::test]
async fn several_thresholds() {
    for (t, n, signers) in [
        (1u8, 1u8, vec![1u8]),
        (2, 3, vec![2, 3]),
        (3, 4, vec![1, 2, 4]),
        (2, 4, vec![1, 2, 3, 4]),
    ] {
        let session_id = format!("dkg {t} of {n}");
        let shares = dkg(t, n, session_id.as_bytes()).await;
        let public_key = shares[0].public_key;
        assert!(shares.iter().all(|share| share.public_key == public_key));

        let hash = [t ^ n; 32];
        let signatures = dsg(&shares, &signers, b"sign", hash).await;
        for signature in &signatures {
            assert_eq!(signature, &signatures[0]);
            assert!(verify_ecdsa_signature(&hash, &public_key, &signature.r, &signature.s));
        }
    }
}

#[tokio::test]
async fn every_signing_set_works_with_the_same_key() {
    let shares = dkg(2, 3, b"subsets").await;
    let hash = [9u8; 32];

    for signers in [[1u8, 2], [1, 3], [2, 3]] {
        let sign_id = [b"subset".as_slice(), &signers].concat();
        let signatures = dsg(&shares, &signers, &sign_id, hash).await;
        assert!(verify_ecdsa_signature(
            &hash,
            &shares[0].public_key,
            &signatures[0].r,
            &signatures[0].s
        ));
    }
}

#[tokio::test]
async fn derived_shares_sign_for_the_child_key() {
    let shares = dkg(2, 2, b"derive").await;
    let children: Vec<KeyShare> = shares
        .iter()
        .map(|share| share.derive_from_path("m/0/7").unwrap())
        .collect();
    assert_eq!(children[0].public_key, children[1].public_key);
    assert_ne!(children[0].public_key, shares[0].public_key);

    let hash = [5u8; 32];
    let signatures = dsg(&children, &[1, 2], b"child", hash).await;
    assert!(verify_ecdsa_signature(
        &hash,
        &children[0].public_key,
        &signatures[0].r,
        &signatures[0].s
    ));
}

#[tokio::test]
async fn key_shares_survive_json() {
    let shares = dkg(2, 2, b"json").await;
    let restored: Vec<KeyShare> = shares
        .iter()
        .map(|share| KeyShare::from_json(&share.to_json().unwrap()).unwrap())
        .collect();

    let hash = [1u8; 32];
    let signatures = dsg(&restored, &[1, 2], b"restored", hash).await;
    assert!(verify_ecdsa_signature(
        &hash,
        &shares[0].public_key,
        &signatures[0].r,
        &signatures[0].s
    ));
}
