//! In-process [`MessageStore`] used by tests and local tooling.

use super::{MessageStore, StoreError, StoreErrorKind};
use crate::channel::ChannelId;
use crate::message::Message;
use async_trait::async_trait;
use chrono::Utc;
use events::Id;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
struct ChannelLog {
    last_sequence: i64,
    messages: Vec<Message>,
}

pub struct MemoryStore {
    channels: Mutex<BTreeMap<ChannelId, ChannelLog>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates the backing store going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::new(StoreErrorKind::Unavailable))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append_message(
        &self,
        channel_id: &ChannelId,
        sender_user_id: Id,
        payload: &str,
    ) -> Result<Message, StoreError> {
        self.check_available()?;
        let mut channels = self.channels.lock().await;
        let log = channels
            .get_mut(channel_id)
            .ok_or_else(|| StoreError::new(StoreErrorKind::ChannelNotFound))?;

        log.last_sequence += 1;
        let message = Message {
            channel_id: channel_id.clone(),
            sequence: log.last_sequence,
            sender_user_id,
            payload: payload.to_string(),
            created_at: Utc::now(),
        };
        log.messages.push(message.clone());
        Ok(message)
    }

    async fn load_recent_messages(
        &self,
        channel_id: &ChannelId,
        before_seq: Option<i64>,
        limit: u64,
    ) -> Result<Vec<Message>, StoreError> {
        self.check_available()?;
        let channels = self.channels.lock().await;
        let log = channels
            .get(channel_id)
            .ok_or_else(|| StoreError::new(StoreErrorKind::ChannelNotFound))?;

        let mut page: Vec<Message> = log
            .messages
            .iter()
            .rev()
            .filter(|m| before_seq.map_or(true, |before| m.sequence < before))
            .take(limit as usize)
            .cloned()
            .collect();
        page.reverse();
        Ok(page)
    }

    async fn channel_exists(&self, channel_id: &ChannelId) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.channels.lock().await.contains_key(channel_id))
    }

    async fn create_channel(&self, channel_id: &ChannelId) -> Result<(), StoreError> {
        self.check_available()?;
        self.channels
            .lock()
            .await
            .entry(channel_id.clone())
            .or_default();
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &ChannelId) -> Result<(), StoreError> {
        self.check_available()?;
        match self.channels.lock().await.remove(channel_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::new(StoreErrorKind::ChannelNotFound)),
        }
    }

    async fn list_channels(&self) -> Result<Vec<ChannelId>, StoreError> {
        self.check_available()?;
        Ok(self.channels.lock().await.keys().cloned().collect())
    }
}
