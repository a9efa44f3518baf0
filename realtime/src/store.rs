//! The storage collaborator seam.
//!
//! The relay never owns durable state. Sequence numbers and the message log live
//! behind [`MessageStore`]; the relay only relies on `append_message` being a
//! transactional "assign the next sequence and persist" step.

use crate::channel::ChannelId;
use crate::message::Message;
use async_trait::async_trait;
use events::Id;
use std::error::Error as StdError;
use std::fmt;

pub mod memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    ChannelNotFound,
    /// The backing store could not be reached or the transaction failed.
    Unavailable,
    Other,
}

#[derive(Debug)]
pub struct StoreError {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: StoreErrorKind,
}

impl StoreError {
    pub fn new(error_kind: StoreErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }

    pub fn with_source(
        error_kind: StoreErrorKind,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            source: Some(source.into()),
            error_kind,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{:?}: {}", self.error_kind, source),
            None => write!(f, "{:?}", self.error_kind),
        }
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// Durable message log and per-channel sequence counters.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Assigns the next sequence number of `channel_id` and persists the message
    /// in one transaction. A sequence number handed out here is never reused.
    async fn append_message(
        &self,
        channel_id: &ChannelId,
        sender_user_id: Id,
        payload: &str,
    ) -> Result<Message, StoreError>;

    /// Loads at most `limit` messages with a sequence below `before_seq` (or the
    /// newest ones when `None`), returned in ascending sequence order. Passing the
    /// first returned sequence back as `before_seq` pages further into history.
    async fn load_recent_messages(
        &self,
        channel_id: &ChannelId,
        before_seq: Option<i64>,
        limit: u64,
    ) -> Result<Vec<Message>, StoreError>;

    async fn channel_exists(&self, channel_id: &ChannelId) -> Result<bool, StoreError>;

    /// Creates the channel if it does not exist yet. Never resets an existing counter.
    async fn create_channel(&self, channel_id: &ChannelId) -> Result<(), StoreError>;

    /// Removes the channel together with its message log. Fails with
    /// `ChannelNotFound` when there is nothing to delete. Creating the same id
    /// again starts a new channel whose sequence begins at 1.
    async fn delete_channel(&self, channel_id: &ChannelId) -> Result<(), StoreError>;

    async fn list_channels(&self) -> Result<Vec<ChannelId>, StoreError>;
}
