use crate::message::{Outbox, ServerEvent};
use crate::session::{Reaper, SessionId, UserId};
use crate::Error;
use dashmap::DashMap;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

const MAX_CHANNEL_ID_LEN: usize = 64;

/// Name of a channel, e.g. `general`. Lowercase ASCII letters, digits, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    pub fn parse(value: impl Into<String>) -> Result<Self, Error> {
        let value = value.into();
        let valid = !value.is_empty()
            && value.len() <= MAX_CHANNEL_ID_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(value))
        } else {
            Err(Error::InvalidChannelId(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChannelId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ChannelId::parse(value)
    }
}

impl From<ChannelId> for String {
    fn from(value: ChannelId) -> Self {
        value.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Presence snapshot entry returned to a session when it subscribes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelMember {
    pub session_id: SessionId,
    pub user_id: UserId,
}

struct Member {
    user_id: UserId,
    outbox: Outbox,
}

/// Membership of one channel. Only reachable through [`Channel::lock`], which is
/// the channel's serialization point for membership changes, sequence
/// assignment and fanout.
#[derive(Default)]
pub(crate) struct ChannelState {
    members: HashMap<SessionId, Member>,
    deleted: bool,
}

impl ChannelState {
    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) fn contains(&self, session_id: &SessionId) -> bool {
        self.members.contains_key(session_id)
    }

    pub(crate) fn user_of(&self, session_id: &SessionId) -> Option<UserId> {
        self.members.get(session_id).map(|m| m.user_id)
    }

    pub(crate) fn insert(&mut self, session_id: SessionId, user_id: UserId, outbox: Outbox) {
        self.members.insert(session_id, Member { user_id, outbox });
    }

    pub(crate) fn remove(&mut self, session_id: &SessionId) -> Option<UserId> {
        self.members.remove(session_id).map(|m| m.user_id)
    }

    pub(crate) fn snapshot(&self) -> Vec<ChannelMember> {
        self.members
            .iter()
            .map(|(session_id, member)| ChannelMember {
                session_id: session_id.clone(),
                user_id: member.user_id,
            })
            .collect()
    }

    /// Marks the channel deleted and hands back every member it had.
    pub(crate) fn close(&mut self) -> Vec<(SessionId, Outbox)> {
        self.deleted = true;
        self.members
            .drain()
            .map(|(session_id, member)| (session_id, member.outbox))
            .collect()
    }

    /// Enqueues `event` for every member except `skip`. Members whose queue is
    /// closed are dropped from the channel and returned so that the caller can
    /// schedule their termination.
    pub(crate) fn fanout(&mut self, event: &ServerEvent, skip: Option<&SessionId>) -> Vec<SessionId> {
        let mut unreachable = Vec::new();
        for (session_id, member) in self.members.iter() {
            if Some(session_id) == skip {
                continue;
            }
            if member.outbox.send(event.clone()).is_err() {
                warn!("Failed to deliver event to session {session_id}. Session will be cleaned up.");
                unreachable.push(session_id.clone());
            }
        }
        for session_id in &unreachable {
            self.members.remove(session_id);
        }
        unreachable
    }
}

#[derive(Default)]
pub(crate) struct Channel {
    state: Mutex<ChannelState>,
}

impl Channel {

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().await
    }
}

/// Live channels of this process. Channels are loaded lazily from the store and
/// stay here, even when empty, until they are explicitly deleted.
pub struct ChannelTable {
    channels: DashMap<ChannelId, Arc<Channel>>,
    reaper: Reaper,
}

impl ChannelTable {
    pub fn new(reaper: Reaper) -> Self {
        Self {
            channels: DashMap::new(),
            reaper,
        }
    }

    pub(crate) fn get(&self, channel_id: &ChannelId) -> Option<Arc<Channel>> {
        self.channels.get(channel_id).map(|c| c.value().clone())
    }

    pub(crate) fn get_or_insert(&self, channel_id: &ChannelId) -> Arc<Channel> {
        self.channels
            .entry(channel_id.clone())
            .or_insert_with(|| Arc::new(Channel::default()))
            .value()
            .clone()
    }

    pub(crate) fn remove(&self, channel_id: &ChannelId) -> Option<Arc<Channel>> {
        self.channels.remove(channel_id).map(|(_, channel)| channel)
    }

    pub(crate) fn reap(&self, unreachable: Vec<SessionId>) {
        for session_id in unreachable {
            self.reaper.reap(session_id);
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
