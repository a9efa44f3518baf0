use crate::error::{EntityErrorKind, Error};
use crate::token::{Jwt, TokenAuthenticator};
use crate::{users, Id};
use chrono::Utc;
use email_address::EmailAddress;
use log::*;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use utoipa::ToSchema;

use entity_api::user::find_by_email;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, ToSchema, Deserialize)]
#[schema(as = domain::user::Credentials)] // OpenAPI schema
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, ToSchema, Deserialize)]
#[schema(as = domain::user::NewUser)] // OpenAPI schema
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub password: String,
}

/// Creates an account after checking the email, display name and password.
pub async fn signup(db: &DatabaseConnection, new_user: NewUser) -> Result<users::Model, Error> {
    let email = new_user.email.trim().to_lowercase();
    if !EmailAddress::is_valid(&email) {
        debug!("Signup rejected, invalid email address");
        return Err(Error::entity(EntityErrorKind::Invalid));
    }
    let display_name = new_user.display_name.trim().to_string();
    if display_name.is_empty() || new_user.password.chars().count() < MIN_PASSWORD_LEN {
        debug!("Signup rejected, missing display name or short password");
        return Err(Error::entity(EntityErrorKind::Invalid));
    }

    let now = Utc::now();
    let user = entity_api::user::create(
        db,
        users::Model {
            id: Id::new_v4(),
            email,
            display_name,
            password: new_user.password,
            created_at: now.into(),
            updated_at: now.into(),
        },
    )
    .await?;

    info!("Signed up user {}", user.id);
    Ok(user)
}

pub async fn find_by_id(db: &DatabaseConnection, user_id: Id) -> Result<users::Model, Error> {
    Ok(entity_api::user::find_by_id(db, user_id).await?)
}

/// Checks the credentials and issues a credential token for the user.
/// Unknown emails and wrong passwords are indistinguishable to the caller.
pub async fn login(
    db: &DatabaseConnection,
    tokens: &TokenAuthenticator,
    credentials: Credentials,
) -> Result<(users::Model, Jwt), Error> {
    let email = credentials.email.trim().to_lowercase();
    let user = find_by_email(db, &email)
        .await?
        .ok_or_else(|| Error::entity(EntityErrorKind::Unauthenticated))?;

    entity_api::user::verify_password(&credentials.password, &user.password).await?;

    let jwt = tokens.issue(user.id)?;
    info!("User {} logged in", user.id);
    Ok((user, jwt))
}
