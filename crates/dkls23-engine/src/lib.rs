//! # DKLs23 Engine
//!
//! Phase-driven threshold ECDSA over secp256k1, following DKLs23.
//!
//! This crate provides:
//! - Distributed Key Generation (DKG) in four phases
//! - Distributed Signature Generation (DSG) in four phases
//! - The building blocks: zero-sharing, base OT, OT extension, two-party
//!   multiplication, DLog / Chaum-Pedersen proofs and commitments
//! - Non-hardened BIP-32 derivation of key shares
//!
//! ## Protocol Overview
//!
//! Every party runs the same phase functions. A phase consumes the messages
//! produced by the previous one and returns a [`PhaseOutput`]: values to keep,
//! values to transmit to single counterparties and one value to broadcast.
//! Phase functions do no I/O. The async drivers [`keygen::run_dkg`] and
//! [`sign::run_dsg`] connect them to a [`mpc::Relay`].
//!
//! Every verification failure aborts the session and names the party
//! responsible, see [`Error::culprit`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use dkls23_engine::{keygen, sign, EngineConfig, Parameters, SessionData, SignData};
//!
//! // Run distributed key generation
//! let data = SessionData::new(Parameters::new(2, 3)?, 1, b"dkg session")?;
//! let key_share = keygen::run_dkg(&data, &relay, &EngineConfig::default()).await?;
//!
//! // Sign a message hash with party 3
//! let sign_data = SignData::new(b"sign session", &[3], message_hash);
//! let signature = sign::run_dsg(&key_share, &sign_data, &relay, &EngineConfig::default()).await?;
//! ```

pub mod derivation;
pub mod error;
pub mod keygen;
pub mod mpc;
pub mod oblivious;
pub mod primitives;
pub mod proofs;
pub mod sign;
pub mod types;
pub mod zero_shares;

use std::time::Duration;

pub use error::{Error, Result};
pub use types::{
    EngineConfig, KeyShare, Parameters, PartiesMessage, PhaseOutput, SessionData, SignData,
    Signature,
};

/// Index of a party, from 1 to the share count
pub type PartyIndex = u8;

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Computational security in bytes; size of hashes, seeds and salts
pub const SECURITY: usize = 32;

/// Computational security in bits; number of base OTs
pub const RAW_SECURITY: usize = 8 * SECURITY;

/// Statistical security in bits
pub const STAT_SECURITY: usize = 80;

/// Default time to wait for one round of messages
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(30);
