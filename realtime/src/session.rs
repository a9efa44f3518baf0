use crate::auth::Authenticator;
use crate::channel::ChannelId;
use crate::message::{Outbox, ServerEvent};
use crate::{Error, Result};
use dashmap::DashMap;
use events::{DomainEvent, EventPublisher, Id, TerminationReason};
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub type UserId = Id;

/// Unique identifier for a session (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One authenticated live connection of a user.
///
/// The registry hands out clones; the registry's own copy is the source of truth
/// for channel membership and activity.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub channels: HashSet<ChannelId>,
    pub alive: bool,
    pub last_activity: Instant,
    outbox: Outbox,
    cancel: CancellationToken,
}

impl Session {
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Cancelled when the session is terminated. The transport stops writing to
    /// the connection once this fires.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Hands sessions whose outbound queue turned out to be closed to the
/// registry's cleanup task, so fanout never waits on termination.
#[derive(Clone)]
pub struct Reaper(UnboundedSender<SessionId>);

impl Reaper {
    pub fn new(sender: UnboundedSender<SessionId>) -> Self {
        Self(sender)
    }

    pub fn reap(&self, session_id: SessionId) {
        debug!("Scheduling cleanup of unreachable session {session_id}");
        if self.0.send(session_id).is_err() {
            warn!("Session cleanup task is gone, unreachable session left for the liveness sweep");
        }
    }
}

/// Session registry with dual indices: by session id for lifecycle operations and
/// by user id for multi-device lookups.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Session>,
    user_index: DashMap<UserId, HashSet<SessionId>>,
    authenticator: Arc<dyn Authenticator>,
    events: EventPublisher,
}

impl SessionRegistry {
    pub fn new(authenticator: Arc<dyn Authenticator>, events: EventPublisher) -> Self {
        Self {
            sessions: DashMap::new(),
            user_index: DashMap::new(),
            authenticator,
            events,
        }
    }

    /// Verifies the credential token and binds a new session to `outbox`.
    /// Several sessions of one user may coexist.
    pub async fn register(&self, credential_token: &str, outbox: Outbox) -> Result<Session> {
        let user_id = self
            .authenticator
            .verify(credential_token)
            .await
            .map_err(|e| {
                debug!("Rejected credential token: {e}");
                Error::Unauthenticated
            })?;

        let session = Session {
            id: SessionId::new(),
            user_id,
            channels: HashSet::new(),
            alive: true,
            last_activity: Instant::now(),
            outbox,
            cancel: CancellationToken::new(),
        };

        self.sessions.insert(session.id.clone(), session.clone());
        self.user_index
            .entry(user_id)
            .or_default()
            .insert(session.id.clone());

        info!("Registered session {} for user {}", session.id, user_id);
        Ok(session)
    }

    pub fn lookup(&self, session_id: &SessionId) -> Result<Session> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    /// Records activity for liveness tracking.
    pub fn touch(&self, session_id: &SessionId) -> Result<()> {
        match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                session.last_activity = Instant::now();
                Ok(())
            }
            None => Err(Error::SessionNotFound(session_id.to_string())),
        }
    }

    /// Removes the session, cancels its connection and emits one `SessionTerminated`
    /// event whose handlers drop it from every channel before this returns.
    /// Returns `false` when the session was already gone.
    pub async fn terminate(&self, session_id: &SessionId, reason: TerminationReason) -> bool {
        let Some((_, mut session)) = self.sessions.remove(session_id) else {
            trace!("Session {session_id} already terminated");
            return false;
        };
        session.alive = false;

        if let Some(mut entry) = self.user_index.get_mut(&session.user_id) {
            entry.remove(session_id);
        }
        // Re-checked under the shard lock so a concurrent register is never lost
        self.user_index
            .remove_if(&session.user_id, |_, ids| ids.is_empty());

        session.cancel.cancel();
        info!(
            "Terminated session {} of user {} ({reason})",
            session.id, session.user_id
        );

        self.events
            .publish(DomainEvent::SessionTerminated {
                session_id: session.id.to_string(),
                user_id: session.user_id,
                channel_ids: session.channels.iter().map(|c| c.to_string()).collect(),
                reason,
            })
            .await;

        true
    }

    /// Forced logout of every live session of `user_id`. Each session is told why
    /// before its connection is cancelled. Returns how many sessions were ended.
    pub async fn terminate_user(&self, user_id: &UserId, reason: &str) -> usize {
        let mut terminated = 0;
        for session in self.sessions_for_user(user_id) {
            let _ = session.outbox.send(ServerEvent::ForceLogout {
                reason: reason.to_string(),
            });
            if self
                .terminate(&session.id, TerminationReason::ForcedLogout)
                .await
            {
                terminated += 1;
            }
        }
        terminated
    }

    pub fn sessions_for_user(&self, user_id: &UserId) -> Vec<Session> {
        let ids: Vec<SessionId> = match self.user_index.get(user_id) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return Vec::new(),
        };
        ids.iter().filter_map(|id| self.lookup(id).ok()).collect()
    }

    /// Sessions with no activity for longer than `idle_timeout`.
    pub fn expired(&self, idle_timeout: Duration) -> Vec<SessionId> {
        let now = Instant::now();
        self.sessions
            .iter()
            .filter(|entry| now.duration_since(entry.last_activity) > idle_timeout)
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Records `channel_id` on the session and returns what a channel needs to
    /// route to it. Called by the router while it holds the channel's lock.
    pub(crate) fn join_channel(
        &self,
        session_id: &SessionId,
        channel_id: &ChannelId,
    ) -> Result<(UserId, Outbox)> {
        match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                session.channels.insert(channel_id.clone());
                Ok((session.user_id, session.outbox.clone()))
            }
            None => Err(Error::SessionNotFound(session_id.to_string())),
        }
    }

    pub(crate) fn leave_channel(&self, session_id: &SessionId, channel_id: &ChannelId) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.channels.remove(channel_id);
        }
    }
}
