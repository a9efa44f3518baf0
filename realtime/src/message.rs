//! Wire-level event types.
//!
//! Both directions use a closed set of variants tagged as
//! `{"type": "...", "data": {...}}` so that every inbound event is handled by one
//! exhaustive match in [`crate::hub::Hub::dispatch`].

use crate::channel::{ChannelId, ChannelMember};
use crate::session::SessionId;
use crate::signaling::SignalKind;
use chrono::{DateTime, Utc};
use events::Id;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

/// Outbound queue of a single connection. The transport drains it on its own task.
pub type Outbox = UnboundedSender<ServerEvent>;

/// Trait for getting the wire event type name
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

/// A chat message as assigned by the storage collaborator. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub channel_id: ChannelId,
    pub sequence: i64,
    pub sender_user_id: Id,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Joined,
    Left,
    Offline,
}

/// Requests a connected client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Subscribe {
        channel_id: ChannelId,
    },
    Unsubscribe {
        channel_id: ChannelId,
    },
    Publish {
        channel_id: ChannelId,
        payload: String,
    },
    Signal {
        to: SessionId,
        kind: SignalKind,
        #[serde(default)]
        payload: Value,
    },
    History {
        channel_id: ChannelId,
        #[serde(default)]
        before_seq: Option<i64>,
        #[serde(default)]
        limit: Option<u64>,
    },
    Ping,
}

impl EventType for ClientEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::Subscribe { .. } => "subscribe",
            ClientEvent::Unsubscribe { .. } => "unsubscribe",
            ClientEvent::Publish { .. } => "publish",
            ClientEvent::Signal { .. } => "signal",
            ClientEvent::History { .. } => "history",
            ClientEvent::Ping => "ping",
        }
    }
}

/// Events pushed to a connected client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Ready {
        session_id: SessionId,
        user_id: Id,
    },
    Subscribed {
        channel_id: ChannelId,
        members: Vec<ChannelMember>,
    },
    Unsubscribed {
        channel_id: ChannelId,
    },
    Published {
        channel_id: ChannelId,
        sequence: i64,
    },
    Message(Message),
    /// Acknowledges a relayed signal to its sender.
    Signaled {
        to: SessionId,
        kind: SignalKind,
    },
    Signal {
        from: SessionId,
        kind: SignalKind,
        payload: Value,
    },
    Presence {
        channel_id: ChannelId,
        user_id: Id,
        session_id: SessionId,
        state: PresenceState,
    },
    History {
        channel_id: ChannelId,
        messages: Vec<Message>,
    },
    /// Sequences of a channel later created under the same id start over at 1.
    ChannelDeleted {
        channel_id: ChannelId,
    },
    ForceLogout {
        reason: String,
    },
    Pong,
    Error {
        code: String,
        message: String,
    },
}

impl EventType for ServerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::Ready { .. } => "ready",
            ServerEvent::Subscribed { .. } => "subscribed",
            ServerEvent::Unsubscribed { .. } => "unsubscribed",
            ServerEvent::Published { .. } => "published",
            ServerEvent::Message(_) => "message",
            ServerEvent::Signaled { .. } => "signaled",
            ServerEvent::Signal { .. } => "signal",
            ServerEvent::Presence { .. } => "presence",
            ServerEvent::History { .. } => "history",
            ServerEvent::ChannelDeleted { .. } => "channel_deleted",
            ServerEvent::ForceLogout { .. } => "force_logout",
            ServerEvent::Pong => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }
}

impl From<&crate::Error> for ServerEvent {
    fn from(err: &crate::Error) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
