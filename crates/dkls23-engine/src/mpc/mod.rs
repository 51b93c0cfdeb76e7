//! MPC coordination utilities
//!
//! The phase functions never touch the network. The drivers move their
//! messages through a [`Relay`]: pairwise messages with `send_direct`, the
//! rest with `broadcast`. A broadcast reaches the sender too.

use crate::{Error, PartyIndex, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

pub use ::async_trait::async_trait;

/// Message relay trait for MPC communication
#[async_trait]
pub trait Relay: Send + Sync {
    /// Broadcast a message to all parties
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &[u8],
        round: u32,
        message: &T,
    ) -> Result<()>;

    /// Send a direct message to a specific party
    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &[u8],
        round: u32,
        to: PartyIndex,
        message: &T,
    ) -> Result<()>;

    /// Collect broadcast messages from all parties
    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &[u8],
        round: u32,
        count: usize,
    ) -> Result<Vec<T>>;

    /// Collect direct messages sent to this party
    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &[u8],
        round: u32,
        my_index: PartyIndex,
        count: usize,
    ) -> Result<Vec<T>>;
}

/// Sends every pairwise message of a phase to its receiver.
pub async fn send_all<R: Relay, T: Serialize + Send + Sync>(
    relay: &R,
    session_id: &[u8],
    round: u32,
    transmit: &BTreeMap<PartyIndex, T>,
) -> Result<()> {
    for (&to, message) in transmit {
        relay.send_direct(session_id, round, to, message).await?;
    }
    Ok(())
}

/// Awaits `future`, failing with [`Error::Timeout`] after `timeout`.
pub async fn with_timeout<T, F>(timeout: Duration, what: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| Error::Timeout(what.to_string()))?
}

/// Keys received messages by their sender. A later duplicate replaces an
/// earlier one.
pub fn index_by<T>(
    messages: Vec<T>,
    sender: impl Fn(&T) -> PartyIndex,
) -> BTreeMap<PartyIndex, T> {
    messages
        .into_iter()
        .map(|message| (sender(&message), message))
        .collect()
}

/// In-memory relay for testing
pub mod memory;

pub use memory::MemoryRelay;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_is_reported() {
        let pending = std::future::pending::<Result<()>>();
        let result = with_timeout(Duration::from_millis(10), "nothing", pending).await;
        assert!(matches!(result, Err(Error::Timeout(what)) if what == "nothing"));
    }

    #[test]
    fn messages_are_keyed_by_sender() {
        let map = index_by(vec![(3u8, "a"), (1, "b"), (3, "c")], |m| m.0);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1].1, "b");
        assert_eq!(map[&3].1, "c");
    }
}
