//! Event system infrastructure for Switchboard.
//!
//! This crate provides the event system that decouples the session registry and
//! channel router from the components reacting to their lifecycle changes
//! (membership cleanup, call pairing, presence fanout).
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing all lifecycle events in the relay
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, avoiding circular
//! dependencies. Session and channel identifiers are carried as plain strings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A type alias that represents any Entity's internal id field data type.
/// This matches the definition in the entity crate to maintain compatibility.
pub type Id = Uuid;

/// Why a session went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The client closed its connection or the transport failed.
    Disconnected,
    /// No activity within the configured liveness window.
    IdleTimeout,
    /// The server forced the user out (logout from another surface).
    ForcedLogout,
    /// A fanout or signal delivery found the session's outbound queue closed.
    DeliveryFailed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Disconnected => write!(f, "disconnected"),
            TerminationReason::IdleTimeout => write!(f, "idle_timeout"),
            TerminationReason::ForcedLogout => write!(f, "forced_logout"),
            TerminationReason::DeliveryFailed => write!(f, "delivery_failed"),
        }
    }
}

/// Lifecycle events emitted by the relay core.
/// Handlers run in registration order and observe each event exactly once.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// Emitted once per session, by the first `terminate` call that removes it.
    SessionTerminated {
        session_id: String,
        user_id: Id,
        /// Channels the session was a member of at the moment of termination.
        channel_ids: Vec<String>,
        reason: TerminationReason,
    },
    /// Emitted after a session became a member of a channel.
    ChannelJoined {
        channel_id: String,
        session_id: String,
        user_id: Id,
    },
    /// Emitted after a session stopped being a member of a channel by its own request.
    ChannelLeft {
        channel_id: String,
        session_id: String,
        user_id: Id,
    },
}

/// Trait for handling domain events.
/// Implementations can perform side effects like membership cleanup,
/// presence notifications, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Clones taken before this call do not see the new handler.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers and wait for every one of them.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &DomainEvent) {
            let label = match event {
                DomainEvent::SessionTerminated { reason, .. } => format!("terminated:{reason}"),
                DomainEvent::ChannelJoined { channel_id, .. } => format!("joined:{channel_id}"),
                DomainEvent::ChannelLeft { channel_id, .. } => format!("left:{channel_id}"),
            };
            self.log.lock().await.push(format!("{}:{}", self.name, label));
        }
    }

    #[tokio::test]
    async fn publish_calls_handlers_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let publisher = EventPublisher::new()
            .with_handler(Arc::new(Recorder {
                name: "first",
                log: log.clone(),
            }))
            .with_handler(Arc::new(Recorder {
                name: "second",
                log: log.clone(),
            }));

        publisher
            .publish(DomainEvent::SessionTerminated {
                session_id: "s1".to_string(),
                user_id: Id::new_v4(),
                channel_ids: vec!["general".to_string()],
                reason: TerminationReason::IdleTimeout,
            })
            .await;

        assert_eq!(
            *log.lock().await,
            vec![
                "first:terminated:idle_timeout".to_string(),
                "second:terminated:idle_timeout".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn with_handler_does_not_affect_earlier_clones() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let empty = EventPublisher::new();
        let extended = empty.clone().with_handler(Arc::new(Recorder {
            name: "only",
            log: log.clone(),
        }));

        empty
            .publish(DomainEvent::ChannelJoined {
                channel_id: "general".to_string(),
                session_id: "s1".to_string(),
                user_id: Id::new_v4(),
            })
            .await;
        assert!(log.lock().await.is_empty());
        assert_eq!(extended.handler_count(), 1);
    }
}
