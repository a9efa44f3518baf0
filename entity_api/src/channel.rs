use super::error::Error;
use chrono::Utc;
use entity::channels::{ActiveModel, Column, Entity, Model};
use log::*;
use sea_orm::{entity::prelude::*, sea_query::OnConflict, ConnectionTrait, QueryOrder, Set};

/// Creates the channel unless it already exists. An existing channel keeps its
/// sequence counter.
pub async fn create(db: &impl ConnectionTrait, channel_id: &str) -> Result<Model, Error> {
    let now = Utc::now();
    let channel = ActiveModel {
        id: Set(channel_id.to_owned()),
        last_sequence: Set(0),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    let inserted = Entity::insert(channel)
        .on_conflict(OnConflict::column(Column::Id).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;
    if inserted > 0 {
        debug!("Inserted channel {channel_id}");
    }

    find_by_id(db, channel_id).await?.ok_or_else(Error::not_found)
}

pub async fn find_by_id(db: &impl ConnectionTrait, channel_id: &str) -> Result<Option<Model>, Error> {
    Ok(Entity::find_by_id(channel_id.to_owned()).one(db).await?)
}

pub async fn find_all(db: &impl ConnectionTrait) -> Result<Vec<Model>, Error> {
    Ok(Entity::find().order_by_asc(Column::Id).all(db).await?)
}

/// Deletes the channel and, by cascade, its message log. The id is free to be
/// reused afterwards: a re-created channel is a new one, with an empty log and a
/// sequence counter starting over.
pub async fn delete(db: &impl ConnectionTrait, channel_id: &str) -> Result<(), Error> {
    let result = Entity::delete_by_id(channel_id.to_owned()).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(Error::not_found());
    }
    Ok(())
}
