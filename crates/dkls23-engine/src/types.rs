//! Core types for the DKLs23 engine

use crate::derivation::DerivData;
use crate::oblivious::{MulReceiver, MulSender};
use crate::primitives::point_to_bytes;
use crate::zero_shares::ZeroShare;
use crate::{Error, PartyIndex, Result, DEFAULT_ROUND_TIMEOUT};
use k256::{
    ecdsa,
    elliptic_curve::sec1::ToEncodedPoint,
    AffinePoint, Scalar,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tiny_keccak::{Hasher, Keccak};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// BIP-32 chain code
pub type ChainCode = [u8; 32];

/// Threshold `t` and number of shares `n`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    pub threshold: u8,
    pub share_count: u8,
}

impl Parameters {
    /// Validated constructor: `1 <= threshold <= share_count`.
    pub fn new(threshold: u8, share_count: u8) -> Result<Self> {
        let parameters = Self {
            threshold,
            share_count,
        };
        parameters.validate()?;
        Ok(parameters)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 || self.threshold > self.share_count {
            return Err(Error::InvalidParameters {
                threshold: self.threshold,
                share_count: self.share_count,
            });
        }
        Ok(())
    }

    /// Whether `index` names a party of this key.
    pub fn contains(&self, index: PartyIndex) -> bool {
        (1..=self.share_count).contains(&index)
    }

    /// Every party index, ascending.
    pub fn indices(&self) -> impl Iterator<Item = PartyIndex> {
        1..=self.share_count
    }
}

/// Who runs a DKG and under which session id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub parameters: Parameters,
    pub party_index: PartyIndex,
    pub session_id: Vec<u8>,
}

impl SessionData {
    pub fn new(parameters: Parameters, party_index: PartyIndex, session_id: &[u8]) -> Result<Self> {
        parameters.validate()?;
        if !parameters.contains(party_index) {
            return Err(Error::InvalidPartyIndex(party_index));
        }

        Ok(Self {
            parameters,
            party_index,
            session_id: session_id.to_vec(),
        })
    }

    /// Every other party, ascending.
    pub fn counterparties(&self) -> Vec<PartyIndex> {
        self.parameters
            .indices()
            .filter(|&index| index != self.party_index)
            .collect()
    }
}

/// One signature request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignData {
    /// Names the signature on the relay. Each signing run also mixes fresh
    /// per-party nonces into its session ids, so a repeated sign id only
    /// shares mailboxes, never OT or zero-share randomness.
    pub sign_id: Vec<u8>,
    /// The other parties of the signing set.
    pub counterparties: Vec<PartyIndex>,
    pub message_hash: [u8; 32],
}

impl SignData {
    pub fn new(sign_id: &[u8], counterparties: &[PartyIndex], message_hash: [u8; 32]) -> Self {
        Self {
            sign_id: sign_id.to_vec(),
            counterparties: counterparties.to_vec(),
            message_hash,
        }
    }

    /// Checks the signing set against the key: at least `t - 1` distinct
    /// counterparties, all of them valid indices other than our own.
    pub fn validate(&self, parameters: &Parameters, party_index: PartyIndex) -> Result<()> {
        let required = usize::from(parameters.threshold) - 1;
        if self.counterparties.len() < required {
            return Err(Error::InsufficientCounterparties {
                required,
                actual: self.counterparties.len(),
            });
        }

        let mut seen = Vec::with_capacity(self.counterparties.len());
        for &index in &self.counterparties {
            if index == party_index || !parameters.contains(index) || seen.contains(&index) {
                return Err(Error::InvalidPartyIndex(index));
            }
            seen.push(index);
        }
        Ok(())
    }

    /// Us and the counterparties, ascending.
    pub fn signers(&self, party_index: PartyIndex) -> Vec<PartyIndex> {
        let mut signers = self.counterparties.clone();
        signers.push(party_index);
        signers.sort_unstable();
        signers
    }
}

/// Settings for the async drivers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long to wait for the messages of one round.
    pub round_timeout: Duration,
    /// Whether to replace `s` by `n - s` when `s` is in the upper half.
    pub normalize_signatures: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            round_timeout: DEFAULT_ROUND_TIMEOUT,
            normalize_signatures: true,
        }
    }
}

/// Sender and receiver of a pairwise message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartiesMessage {
    pub sender: PartyIndex,
    pub receiver: PartyIndex,
}

impl PartiesMessage {
    /// Checks that a message stored under `from` came from there and is
    /// addressed to `me`.
    pub fn check(&self, from: PartyIndex, me: PartyIndex) -> Result<()> {
        if self.sender != from || self.receiver != me {
            return Err(Error::UnexpectedMessage {
                from: self.sender,
                to: self.receiver,
            });
        }
        Ok(())
    }
}

/// The message `party` sent, out of a map of received messages.
pub fn message_from<T>(messages: &BTreeMap<PartyIndex, T>, party: PartyIndex) -> Result<&T> {
    messages.get(&party).ok_or(Error::MissingMessage { party })
}

/// What a phase hands back to its caller.
///
/// `unique_keep` and `keep` stay local, `transmit` goes to one counterparty
/// each and `broadcast` to everybody, ourselves included.
#[derive(Debug)]
pub struct PhaseOutput<U, K, T, B> {
    pub unique_keep: U,
    pub keep: BTreeMap<PartyIndex, K>,
    pub transmit: BTreeMap<PartyIndex, T>,
    pub broadcast: B,
}

/// ECDSA signature (r, s)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// R component
    pub r: [u8; 32],
    /// S component
    pub s: [u8; 32],
    /// Recovery ID: parity of R's y-coordinate, plus 2 if R's x-coordinate
    /// overflowed the group order
    pub recovery_id: u8,
}

impl Signature {
    /// Create a new signature
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> Self {
        Self { r, s, recovery_id }
    }

    /// Convert to DER format
    pub fn to_der(&self) -> Result<Vec<u8>> {
        let sig = ecdsa::Signature::from_scalars(self.r, self.s)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(sig.to_der().as_bytes().to_vec())
    }

    /// Convert to bytes (r || s)
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }
}

/// Key share held by a party after DKG
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyShare {
    #[zeroize(skip)]
    pub parameters: Parameters,
    pub party_index: PartyIndex,
    pub session_id: Vec<u8>,

    /// This party's point `p(i)` on the shared polynomial
    pub secret_share: Scalar,

    /// Group public key
    #[zeroize(skip)]
    pub public_key: AffinePoint,

    #[zeroize(skip)]
    pub zero_share: ZeroShare,

    /// Multiplication state per counterparty, one per role
    #[zeroize(skip)]
    pub mul_senders: BTreeMap<PartyIndex, MulSender>,
    #[zeroize(skip)]
    pub mul_receivers: BTreeMap<PartyIndex, MulReceiver>,

    #[zeroize(skip)]
    pub derivation: DerivData,

    #[zeroize(skip)]
    pub eth_address: String,
}

impl KeyShare {
    /// Compressed public key
    pub fn public_key_bytes(&self) -> [u8; 33] {
        point_to_bytes(&self.public_key)
    }

    /// Compressed public key, hex encoded
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    pub fn chain_code(&self) -> ChainCode {
        self.derivation.chain_code
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let share: KeyShare =
            serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))?;
        share.parameters.validate()?;
        Ok(share)
    }
}

impl std::fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyShare")
            .field("parameters", &self.parameters)
            .field("party_index", &self.party_index)
            .field("public_key", &self.public_key_hex())
            .field("eth_address", &self.eth_address)
            .finish_non_exhaustive()
    }
}

/// Ethereum address of a public key: the last 20 bytes of the Keccak-256 of
/// the uncompressed point, without its prefix byte.
pub fn compute_eth_address(public_key: &AffinePoint) -> String {
    let encoded = public_key.to_encoded_point(false);
    let bytes = encoded.as_bytes();

    let mut digest = [0u8; 32];
    let mut keccak = Keccak::v256();
    if bytes.len() > 1 {
        keccak.update(&bytes[1..]);
    }
    keccak.finalize(&mut digest);

    format!("0x{}", hex::encode(&digest[12..]))
}
