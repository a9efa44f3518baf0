//! Error types for the relay core.
use std::error::Error as StdError;
use std::fmt;

use crate::store::StoreError;

pub type Result<T> = core::result::Result<T, Error>;

/// Every way a relay operation can be refused.
///
/// Validation and authorization failures are returned synchronously and never
/// retried. Per-member delivery failures during fanout never show up here; they
/// are reconciled by terminating the unreachable session instead.
#[derive(Debug)]
pub enum Error {
    /// The credential token was missing, malformed or expired.
    Unauthenticated,
    SessionNotFound(String),
    ChannelNotFound(String),
    /// Channel ids are short names: 1 to 64 of `[a-z0-9_-]`.
    InvalidChannelId(String),
    /// The sender is not subscribed to the channel it publishes to.
    NotAMember(String),
    PayloadTooLarge { size: usize, limit: usize },
    TargetNotFound(String),
    /// The target session exists but its connection can no longer accept events.
    TargetUnreachable(String),
    /// A signal addressed to its own sender.
    InvalidTarget,
    /// The storage collaborator failed; nothing was fanned out.
    Storage(StoreError),
}

impl Error {
    /// Stable machine readable code sent to clients in `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthenticated => "unauthenticated",
            Error::SessionNotFound(_) => "session_not_found",
            Error::ChannelNotFound(_) => "channel_not_found",
            Error::InvalidChannelId(_) => "invalid_channel_id",
            Error::NotAMember(_) => "not_a_member",
            Error::PayloadTooLarge { .. } => "payload_too_large",
            Error::TargetNotFound(_) => "target_not_found",
            Error::TargetUnreachable(_) => "target_unreachable",
            Error::InvalidTarget => "invalid_target",
            Error::Storage(_) => "storage_unavailable",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unauthenticated => write!(f, "Credential token rejected"),
            Error::SessionNotFound(id) => write!(f, "Session {id} not found"),
            Error::ChannelNotFound(id) => write!(f, "Channel {id} not found"),
            Error::InvalidChannelId(id) => write!(f, "Invalid channel id: {id:?}"),
            Error::NotAMember(id) => write!(f, "Not a member of channel {id}"),
            Error::PayloadTooLarge { size, limit } => {
                write!(f, "Payload of {size} bytes exceeds the {limit} byte limit")
            }
            Error::TargetNotFound(id) => write!(f, "Target session {id} not found"),
            Error::TargetUnreachable(id) => write!(f, "Target session {id} is unreachable"),
            Error::InvalidTarget => write!(f, "A session cannot signal itself"),
            Error::Storage(err) => write!(f, "Storage failure: {err}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Storage(err)
    }
}
