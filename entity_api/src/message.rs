use super::error::Error;
use chrono::Utc;
use entity::messages::{ActiveModel, Column, Entity, Model};
use entity::{channels, Id};
use log::*;
use sea_orm::{
    entity::prelude::*, ConnectionTrait, QueryOrder, QuerySelect, Set, TransactionTrait,
};

/// Appends a message to the channel's log with the next sequence number.
///
/// The channel row is locked (`SELECT ... FOR UPDATE`) for the duration of the
/// transaction, so two writers can never be handed the same sequence.
pub async fn append(
    db: &impl TransactionTrait,
    channel_id: &str,
    sender_user_id: Id,
    payload: &str,
) -> Result<Model, Error> {
    let txn = db.begin().await?;

    let channel = channels::Entity::find_by_id(channel_id.to_owned())
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(Error::not_found)?;

    let now = Utc::now();
    let sequence = channel.last_sequence + 1;

    let mut channel: channels::ActiveModel = channel.into();
    channel.last_sequence = Set(sequence);
    channel.updated_at = Set(now.into());
    channel.update(&txn).await?;

    let message = ActiveModel {
        channel_id: Set(channel_id.to_owned()),
        sequence: Set(sequence),
        sender_user_id: Set(sender_user_id),
        payload: Set(payload.to_owned()),
        created_at: Set(now.into()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    trace!("Appended message #{sequence} to {channel_id}");
    Ok(message)
}

/// Up to `limit` of the newest messages with a sequence below `before_sequence`
/// (or the newest overall), in ascending sequence order.
pub async fn load_recent(
    db: &impl ConnectionTrait,
    channel_id: &str,
    before_sequence: Option<i64>,
    limit: u64,
) -> Result<Vec<Model>, Error> {
    let mut query = Entity::find().filter(Column::ChannelId.eq(channel_id));
    if let Some(before) = before_sequence {
        query = query.filter(Column::Sequence.lt(before));
    }

    let mut messages = query
        .order_by_desc(Column::Sequence)
        .limit(limit)
        .all(db)
        .await?;
    messages.reverse();

    Ok(messages)
}

#[cfg(test)]
// We need to gate seaORM's mock feature behind conditional compilation because
// the feature removes the Clone trait implementation from seaORM's DatabaseConnection.
// see https://github.com/SeaQL/sea-orm/issues/830
#[cfg(feature = "mock")]
mod tests {
    use super::*;
    use crate::error::EntityApiErrorKind;
    use sea_orm::{DatabaseBackend, MockDatabase, Transaction};

    fn message_model(sequence: i64) -> Model {
        Model {
            id: Id::new_v4(),
            channel_id: "general".to_owned(),
            sequence,
            sender_user_id: Id::new_v4(),
            payload: format!("m{sequence}"),
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn append_assigns_the_next_sequence() -> Result<(), Error> {
        let now = Utc::now();
        let channel = channels::Model {
            id: "general".to_owned(),
            last_sequence: 2,
            created_at: now.into(),
            updated_at: now.into(),
        };
        let updated_channel = channels::Model {
            last_sequence: 3,
            ..channel.clone()
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[channel]])
            .append_query_results([[updated_channel]])
            .append_query_results([[message_model(3)]])
            .into_connection();

        let message = append(&db, "general", Id::new_v4(), "m3").await?;

        assert_eq!(message.sequence, 3);

        Ok(())
    }

    #[tokio::test]
    async fn append_to_unknown_channel_is_not_found() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<channels::Model>::new()])
            .into_connection();

        let result = append(&db, "nowhere", Id::new_v4(), "hi").await;

        assert_eq!(result.unwrap_err().error_kind, EntityApiErrorKind::RecordNotFound);

        Ok(())
    }

    #[tokio::test]
    async fn load_recent_returns_ascending_sequences() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[message_model(5), message_model(4)]])
            .into_connection();

        let messages = load_recent(&db, "general", Some(6), 2).await?;

        let sequences: Vec<i64> = messages.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![4, 5]);

        Ok(())
    }

    #[tokio::test]
    async fn load_recent_queries_before_the_cursor() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let _ = load_recent(&db, "general", Some(10), 50).await;

        assert_eq!(
            db.into_transaction_log(),
            [Transaction::from_sql_and_values(
                DatabaseBackend::Postgres,
                r#"SELECT "messages"."id", "messages"."channel_id", "messages"."sequence", "messages"."sender_user_id", "messages"."payload", "messages"."created_at" FROM "switchboard"."messages" WHERE "messages"."channel_id" = $1 AND "messages"."sequence" < $2 ORDER BY "messages"."sequence" DESC LIMIT $3"#,
                [
                    "general".into(),
                    10i64.into(),
                    sea_orm::Value::BigUnsigned(Some(50))
                ]
            )]
        );

        Ok(())
    }
}
