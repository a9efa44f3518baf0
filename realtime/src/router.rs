//! Channel routing: membership, sequenced publish and fanout.

use crate::channel::{Channel, ChannelId, ChannelMember, ChannelTable};
use crate::message::{Message, PresenceState, ServerEvent};
use crate::presence;
use crate::session::{SessionId, SessionRegistry};
use crate::store::{MessageStore, StoreErrorKind};
use crate::{Error, RelayConfig, Result};
use events::{DomainEvent, EventPublisher};
use log::*;
use std::sync::Arc;

pub struct ChannelRouter {
    registry: Arc<SessionRegistry>,
    table: Arc<ChannelTable>,
    store: Arc<dyn MessageStore>,
    events: EventPublisher,
    config: RelayConfig,
}

impl ChannelRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        table: Arc<ChannelTable>,
        store: Arc<dyn MessageStore>,
        events: EventPublisher,
        config: RelayConfig,
    ) -> Self {
        Self {
            registry,
            table,
            store,
            events,
            config,
        }
    }

    /// Finds the live channel, loading it from the store on first use. Unknown
    /// channels are created only when `create` is set.
    async fn resolve(&self, channel_id: &ChannelId, create: bool) -> Result<Arc<Channel>> {
        if let Some(channel) = self.table.get(channel_id) {
            return Ok(channel);
        }

        if self.store.channel_exists(channel_id).await? {
            return Ok(self.table.get_or_insert(channel_id));
        }

        if create {
            info!("Auto-creating channel {channel_id}");
            self.store.create_channel(channel_id).await?;
            return Ok(self.table.get_or_insert(channel_id));
        }

        Err(Error::ChannelNotFound(channel_id.to_string()))
    }

    /// Adds the session to the channel's routing set and returns the members
    /// present afterwards. Subscribing twice is a no-op.
    pub async fn subscribe(
        &self,
        session_id: &SessionId,
        channel_id: &ChannelId,
    ) -> Result<Vec<ChannelMember>> {
        self.registry.lookup(session_id)?;
        let channel = self
            .resolve(channel_id, self.config.auto_create_channels)
            .await?;

        let (members, joined_user, unreachable) = {
            let mut state = channel.lock().await;
            if state.is_deleted() {
                return Err(Error::ChannelNotFound(channel_id.to_string()));
            }
            if state.contains(session_id) {
                (state.snapshot(), None, Vec::new())
            } else {
                let (user_id, outbox) = self.registry.join_channel(session_id, channel_id)?;
                state.insert(session_id.clone(), user_id, outbox);
                let unreachable = presence::announce(
                    &mut state,
                    channel_id,
                    session_id,
                    user_id,
                    PresenceState::Joined,
                );
                (state.snapshot(), Some(user_id), unreachable)
            }
        };
        self.table.reap(unreachable);

        if let Some(user_id) = joined_user {
            debug!("Session {session_id} subscribed to {channel_id}");
            self.events
                .publish(DomainEvent::ChannelJoined {
                    channel_id: channel_id.to_string(),
                    session_id: session_id.to_string(),
                    user_id,
                })
                .await;
        }

        Ok(members)
    }

    /// Idempotent; leaving a channel the session is not in, or that does not
    /// exist, succeeds silently.
    pub async fn unsubscribe(&self, session_id: &SessionId, channel_id: &ChannelId) -> Result<()> {
        let Some(channel) = self.table.get(channel_id) else {
            return Ok(());
        };

        let (left_user, unreachable) = {
            let mut state = channel.lock().await;
            let removed = state.remove(session_id);
            self.registry.leave_channel(session_id, channel_id);
            let unreachable = match removed {
                Some(user_id) => presence::announce(
                    &mut state,
                    channel_id,
                    session_id,
                    user_id,
                    PresenceState::Left,
                ),
                None => Vec::new(),
            };
            (removed, unreachable)
        };
        self.table.reap(unreachable);

        if let Some(user_id) = left_user {
            debug!("Session {session_id} unsubscribed from {channel_id}");
            self.events
                .publish(DomainEvent::ChannelLeft {
                    channel_id: channel_id.to_string(),
                    session_id: session_id.to_string(),
                    user_id,
                })
                .await;
        }

        Ok(())
    }

    /// Appends the payload to the channel's log and fans it out to the current
    /// members, returning the assigned sequence number.
    ///
    /// Sequence assignment and fanout both happen under the channel lock, so every
    /// member observes sequences in publish order. Fanout only enqueues onto each
    /// member's outbox; socket writes happen on the connection's own task.
    pub async fn publish(
        &self,
        sender: &SessionId,
        channel_id: &ChannelId,
        payload: String,
    ) -> Result<i64> {
        self.registry.lookup(sender)?;
        let channel = self.resolve(channel_id, false).await?;

        let (message, unreachable) = {
            let mut state = channel.lock().await;
            let sender_user_id = state
                .user_of(sender)
                .ok_or_else(|| Error::NotAMember(channel_id.to_string()))?;

            if payload.len() > self.config.max_payload_bytes {
                return Err(Error::PayloadTooLarge {
                    size: payload.len(),
                    limit: self.config.max_payload_bytes,
                });
            }

            let message = self
                .store
                .append_message(channel_id, sender_user_id, &payload)
                .await
                .map_err(|e| {
                    error!("Failed to append message to {channel_id}: {e}");
                    Error::Storage(e)
                })?;

            let skip = self.config.suppress_echo.then_some(sender);
            let unreachable = state.fanout(&ServerEvent::Message(message.clone()), skip);
            (message, unreachable)
        };

        if !unreachable.is_empty() {
            debug!(
                "{} member(s) of {channel_id} were unreachable during fanout of #{}",
                unreachable.len(),
                message.sequence
            );
        }
        self.table.reap(unreachable);

        trace!("Published #{} to {channel_id}", message.sequence);
        Ok(message.sequence)
    }

    /// Creates the channel (idempotent) and makes it routable.
    pub async fn create_channel(&self, channel_id: &ChannelId) -> Result<()> {
        self.store.create_channel(channel_id).await?;
        self.table.get_or_insert(channel_id);
        info!("Created channel {channel_id}");
        Ok(())
    }

    /// Deletes the channel from the store, tells every member and drops them.
    pub async fn delete_channel(&self, channel_id: &ChannelId) -> Result<()> {
        self.store
            .delete_channel(channel_id)
            .await
            .map_err(|e| match e.error_kind {
                StoreErrorKind::ChannelNotFound => Error::ChannelNotFound(channel_id.to_string()),
                _ => Error::Storage(e),
            })?;

        if let Some(channel) = self.table.remove(channel_id) {
            let members = channel.lock().await.close();
            let notice = ServerEvent::ChannelDeleted {
                channel_id: channel_id.clone(),
            };
            for (session_id, outbox) in members {
                self.registry.leave_channel(&session_id, channel_id);
                if outbox.send(notice.clone()).is_err() {
                    debug!("Session {session_id} gone before channel deletion notice");
                }
            }
        }

        info!("Deleted channel {channel_id}");
        Ok(())
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelId>> {
        Ok(self.store.list_channels().await?)
    }

    /// Current members of a live channel.
    pub async fn members(&self, channel_id: &ChannelId) -> Result<Vec<ChannelMember>> {
        let channel = self.resolve(channel_id, false).await?;
        let members = channel.lock().await.snapshot();
        Ok(members)
    }

    /// Cursor-based history page, at most `history_page_limit` messages.
    pub async fn history(
        &self,
        channel_id: &ChannelId,
        before_seq: Option<i64>,
        limit: Option<u64>,
    ) -> Result<Vec<Message>> {
        let limit = limit
            .unwrap_or(self.config.history_page_limit)
            .clamp(1, self.config.history_page_limit);

        self.store
            .load_recent_messages(channel_id, before_seq, limit)
            .await
            .map_err(|e| match e.error_kind {
                StoreErrorKind::ChannelNotFound => Error::ChannelNotFound(channel_id.to_string()),
                _ => Error::Storage(e),
            })
    }
}
