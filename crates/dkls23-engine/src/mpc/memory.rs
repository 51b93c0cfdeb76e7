//! In-memory relay for tests and single-process runs

use super::{async_trait, Relay};
use crate::{Error, PartyIndex, Result};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio::sync::Notify;

type BroadcastKey = (Vec<u8>, u32);
type DirectKey = (Vec<u8>, u32, PartyIndex);

/// One broadcast round and the number of parties that collected it.
#[derive(Default)]
struct BroadcastBox {
    messages: Vec<Vec<u8>>,
    collected: usize,
}

#[derive(Default)]
struct Mailboxes {
    broadcasts: DashMap<BroadcastKey, BroadcastBox>,
    directs: DashMap<DirectKey, Vec<Vec<u8>>>,
    arrived: Notify,
}

/// In-process message relay
///
/// Clones share the same mailboxes, so every party of a run gets its own
/// handle. Collecting direct messages removes them. A broadcast round is
/// read by every party and is dropped once `count` parties collected it,
/// where `count` is the number of messages each of them waited for.
/// [`MemoryRelay::close_session`] drops whatever an aborted run left behind.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    inner: Arc<Mailboxes>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every pending message of `session_id`.
    pub fn close_session(&self, session_id: &[u8]) {
        self.inner
            .broadcasts
            .retain(|(sid, _), _| sid.as_slice() != session_id);
        self.inner
            .directs
            .retain(|(sid, _, _), _| sid.as_slice() != session_id);
    }

    /// Number of messages still held, over all sessions.
    pub fn pending(&self) -> usize {
        let broadcasts: usize = self
            .inner
            .broadcasts
            .iter()
            .map(|mailbox| mailbox.messages.len())
            .sum();
        let directs: usize = self.inner.directs.iter().map(|mailbox| mailbox.len()).sum();
        broadcasts + directs
    }

    fn take_direct(&self, key: &DirectKey, count: usize) -> Option<Vec<Vec<u8>>> {
        let taken: Vec<Vec<u8>> = {
            let mut mailbox = self.inner.directs.get_mut(key)?;
            if mailbox.len() < count {
                return None;
            }
            mailbox.drain(..count).collect()
        };
        self.inner.directs.remove_if(key, |_, rest| rest.is_empty());
        Some(taken)
    }

    fn take_broadcasts(&self, key: &BroadcastKey, count: usize) -> Option<Vec<Vec<u8>>> {
        let (taken, everyone_collected) = {
            let mut mailbox = self.inner.broadcasts.get_mut(key)?;
            if mailbox.messages.len() < count {
                return None;
            }
            mailbox.collected += 1;
            (mailbox.messages[..count].to_vec(), mailbox.collected >= count)
        };
        if everyone_collected {
            self.inner.broadcasts.remove(key);
        }
        Some(taken)
    }

    /// Polls `take` after every arrival until it yields.
    async fn wait_for(&self, mut take: impl FnMut() -> Option<Vec<Vec<u8>>>) -> Vec<Vec<u8>> {
        loop {
            let arrived = self.inner.arrived.notified();
            if let Some(messages) = take() {
                return messages;
            }
            arrived.await;
        }
    }
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn deserialize_all<T: DeserializeOwned>(messages: Vec<Vec<u8>>) -> Result<Vec<T>> {
    messages
        .iter()
        .map(|bytes| {
            serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
        })
        .collect()
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &[u8],
        round: u32,
        message: &T,
    ) -> Result<()> {
        let bytes = serialize(message)?;
        self.inner
            .broadcasts
            .entry((session_id.to_vec(), round))
            .or_default()
            .messages
            .push(bytes);

        self.inner.arrived.notify_waiters();
        Ok(())
    }

    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &[u8],
        round: u32,
        to: PartyIndex,
        message: &T,
    ) -> Result<()> {
        let bytes = serialize(message)?;
        self.inner
            .directs
            .entry((session_id.to_vec(), round, to))
            .or_default()
            .push(bytes);

        self.inner.arrived.notify_waiters();
        Ok(())
    }

    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &[u8],
        round: u32,
        count: usize,
    ) -> Result<Vec<T>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let key = (session_id.to_vec(), round);
        let messages = self.wait_for(|| self.take_broadcasts(&key, count)).await;
        deserialize_all(messages)
    }

    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &[u8],
        round: u32,
        my_index: PartyIndex,
        count: usize,
    ) -> Result<Vec<T>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let key = (session_id.to_vec(), round, my_index);
        let messages = self.wait_for(|| self.take_direct(&key, count)).await;
        deserialize_all(messages)
    }
}
