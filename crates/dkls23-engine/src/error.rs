//! Error types for DKLs23 operations

use crate::PartyIndex;
use thiserror::Error;

/// Result type alias for DKLs23 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during DKLs23 protocol execution
///
/// Verification failures always carry the index of the party that sent the
/// offending value so the caller can exclude it before restarting.
#[derive(Debug, Error)]
pub enum Error {
    /// Threshold and share count violate `1 <= t <= n`
    #[error("Invalid parameters: threshold {threshold}, share count {share_count}")]
    InvalidParameters { threshold: u8, share_count: u8 },

    /// A discrete-log, Chaum-Pedersen or encryption proof did not verify
    #[error("Proof verification failed for party {party}")]
    ProofVerificationFailed { party: PartyIndex },

    /// A revealed value does not open its earlier commitment
    #[error("Commitment mismatch for party {party}")]
    CommitmentMismatch { party: PartyIndex },

    /// The OT-extension or multiplication checks failed between two parties.
    /// The first index is the party that detected the failure.
    #[error("MtA consistency check failed between parties {} and {}", party_pair.0, party_pair.1)]
    MtAConsistencyFailed { party_pair: (PartyIndex, PartyIndex) },

    /// Fewer parties than the threshold take part
    #[error("Insufficient counterparties: required {required}, got {actual}")]
    InsufficientCounterparties { required: usize, actual: usize },

    /// The caller abandoned the session, or a previous phase aborted it
    #[error("Session abandoned")]
    SessionAbandoned,

    /// A required message from a counterparty is absent
    #[error("Missing message from party {party}")]
    MissingMessage { party: PartyIndex },

    /// A message is addressed to another party or comes from an unexpected one
    #[error("Unexpected message from party {from} to party {to}")]
    UnexpectedMessage { from: PartyIndex, to: PartyIndex },

    /// Invalid party index
    #[error("Invalid party index: {0}")]
    InvalidPartyIndex(PartyIndex),

    /// The committed points do not interpolate to a single public key, or the
    /// public shares of a signing session do not add up to it
    #[error("Inconsistent public key reconstruction")]
    InconsistentPublicKey,

    /// The aggregated signature does not verify under the group key
    #[error("Invalid signature")]
    InvalidSignature,

    /// A session method was called in the wrong state
    #[error("Invalid phase: expected {expected}, found {actual}")]
    InvalidPhase {
        expected: &'static str,
        actual: &'static str,
    },

    /// Timeout waiting for message
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Network/relay error
    #[error("Relay error: {0}")]
    Relay(String),

    /// Key derivation error
    #[error("Key derivation error: {0}")]
    Derivation(String),

    /// Cryptographic operation produced a degenerate value
    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

impl Error {
    /// The party identified as the source of the failure, if any.
    pub fn culprit(&self) -> Option<PartyIndex> {
        match self {
            Error::ProofVerificationFailed { party }
            | Error::CommitmentMismatch { party }
            | Error::MissingMessage { party } => Some(*party),
            Error::MtAConsistencyFailed { party_pair } => Some(party_pair.1),
            Error::UnexpectedMessage { from, .. } => Some(*from),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn culprit_points_at_the_offending_party() {
        assert_eq!(Error::CommitmentMismatch { party: 2 }.culprit(), Some(2));
        assert_eq!(Error::ProofVerificationFailed { party: 3 }.culprit(), Some(3));
        assert_eq!(
            Error::MtAConsistencyFailed { party_pair: (1, 4) }.culprit(),
            Some(4)
        );
        assert_eq!(Error::SessionAbandoned.culprit(), None);
        assert_eq!(Error::InvalidSignature.culprit(), None);
    }

    #[test]
    fn messages_name_the_party() {
        let msg = Error::CommitmentMismatch { party: 2 }.to_string();
        assert_eq!(msg, "Commitment mismatch for party 2");
    }
}
