use chrono::Utc;
use password_auth::generate_hash;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

pub use entity::{channels, jwts, messages, users, Id};

pub mod channel;
pub mod error;
pub mod message;
pub mod user;

/// Seeds a development user and the `general` channel.
pub async fn seed_database(db: &DatabaseConnection) -> Result<(), error::Error> {
    let now = Utc::now();

    users::ActiveModel {
        email: Set("dev@switchboard.local".to_owned()),
        display_name: Set("Dev User".to_owned()),
        password: Set(generate_hash("password")),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    }
    .save(db)
    .await?;

    users::ActiveModel {
        email: Set("other_user@switchboard.local".to_owned()),
        display_name: Set("Other U.".to_owned()),
        password: Set(generate_hash("password")),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    }
    .save(db)
    .await?;

    channel::create(db, "general").await?;

    Ok(())
}
