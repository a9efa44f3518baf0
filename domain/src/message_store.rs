//! [`MessageStore`] backed by Postgres through `entity_api`.

use crate::messages;
use async_trait::async_trait;
use chrono::Utc;
use entity_api::error::{EntityApiErrorKind, Error as EntityApiError};
use log::*;
use realtime::channel::ChannelId;
use realtime::message::Message;
use realtime::store::{MessageStore, StoreError, StoreErrorKind};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::Id;

pub struct DbMessageStore {
    db: Arc<DatabaseConnection>,
}

impl DbMessageStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn store_error(err: EntityApiError) -> StoreError {
    let kind = match err.error_kind {
        EntityApiErrorKind::RecordNotFound => StoreErrorKind::ChannelNotFound,
        EntityApiErrorKind::SystemError => StoreErrorKind::Unavailable,
        _ => StoreErrorKind::Other,
    };
    StoreError::with_source(kind, err)
}

fn to_message(model: messages::Model) -> Result<Message, StoreError> {
    let channel_id = ChannelId::parse(model.channel_id).map_err(|e| {
        error!("Stored message {} has an invalid channel id", model.id);
        StoreError::with_source(StoreErrorKind::Other, e)
    })?;

    Ok(Message {
        channel_id,
        sequence: model.sequence,
        sender_user_id: model.sender_user_id,
        payload: model.payload,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

#[async_trait]
impl MessageStore for DbMessageStore {
    async fn append_message(
        &self,
        channel_id: &ChannelId,
        sender_user_id: Id,
        payload: &str,
    ) -> Result<Message, StoreError> {
        let model = entity_api::message::append(
            self.db.as_ref(),
            channel_id.as_str(),
            sender_user_id,
            payload,
        )
        .await
        .map_err(store_error)?;

        to_message(model)
    }

    async fn load_recent_messages(
        &self,
        channel_id: &ChannelId,
        before_seq: Option<i64>,
        limit: u64,
    ) -> Result<Vec<Message>, StoreError> {
        if !self.channel_exists(channel_id).await? {
            return Err(StoreError::new(StoreErrorKind::ChannelNotFound));
        }

        entity_api::message::load_recent(self.db.as_ref(), channel_id.as_str(), before_seq, limit)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(to_message)
            .collect()
    }

    async fn channel_exists(&self, channel_id: &ChannelId) -> Result<bool, StoreError> {
        let channel = entity_api::channel::find_by_id(self.db.as_ref(), channel_id.as_str())
            .await
            .map_err(store_error)?;
        Ok(channel.is_some())
    }

    async fn create_channel(&self, channel_id: &ChannelId) -> Result<(), StoreError> {
        entity_api::channel::create(self.db.as_ref(), channel_id.as_str())
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &ChannelId) -> Result<(), StoreError> {
        entity_api::channel::delete(self.db.as_ref(), channel_id.as_str())
            .await
            .map_err(store_error)
    }

    async fn list_channels(&self) -> Result<Vec<ChannelId>, StoreError> {
        let channels = entity_api::channel::find_all(self.db.as_ref())
            .await
            .map_err(store_error)?;

        // Rows that fail validation cannot be routed; skip rather than fail the listing
        Ok(channels
            .into_iter()
            .filter_map(|channel| ChannelId::parse(channel.id).ok())
            .collect())
    }
}
