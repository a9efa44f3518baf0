//! Real-time relay for chat messages and call signaling.
//!
//! This crate owns every piece of in-memory state for live connections and is
//! transport agnostic: the web layer hands each connection an [`message::Outbox`]
//! and feeds decoded [`message::ClientEvent`]s into [`hub::Hub::dispatch`].
//!
//! # Architecture
//!
//! - **Session registry**: authenticated sessions indexed by session id and by
//!   user id, so one user can be connected from several devices at once.
//! - **Channel router**: per-channel membership and ordered fanout. Each channel
//!   has its own lock; publishes to one channel are serialized, publishes to
//!   different channels are not.
//! - **Signaling relay**: opaque point-to-point delivery of call setup envelopes
//!   plus a small pairing table so that a dropped party hangs up its peer.
//! - **Presence publisher**: `joined`, `left` and `offline` notices, sent out of
//!   band of the message sequence under the same channel lock that changed the
//!   membership.
//!
//! # Termination flow
//!
//! Every way a session can end (explicit disconnect, idle timeout, forced logout,
//! failed delivery) goes through [`session::SessionRegistry::terminate`], which
//! emits a single `SessionTerminated` event. Handlers run in registration order:
//!
//! 1. [`signaling::CallRegistry`] releases its call pairing and hangs up the peer
//! 2. [`presence::PresencePublisher`] drops the session from each channel it had
//!    joined and tells the remaining members it went offline
//!
//! Messages are durable through a [`store::MessageStore`]; sessions, memberships
//! and pairings are not and do not survive a restart.

pub mod auth;
pub mod channel;
pub mod error;
pub mod hub;
pub mod liveness;
pub mod message;
pub mod presence;
pub mod router;
pub mod session;
pub mod signaling;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

use std::time::Duration;

/// Tunables for the relay. The service layer builds one from its command line
/// configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Largest accepted message payload, in bytes.
    pub max_payload_bytes: usize,
    /// When set, a publisher does not receive its own message back.
    pub suppress_echo: bool,
    /// Subscribing to an unknown channel creates it instead of failing.
    pub auto_create_channels: bool,
    pub session_idle_timeout: Duration,
    pub liveness_sweep_interval: Duration,
    /// Upper bound (and default) for one history page.
    pub history_page_limit: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 4096,
            suppress_echo: true,
            auto_create_channels: true,
            session_idle_timeout: Duration::from_secs(90),
            liveness_sweep_interval: Duration::from_secs(15),
            history_page_limit: 100,
        }
    }
}
