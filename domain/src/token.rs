//! Credential tokens.
//!
//! A successful login yields a signed JWT whose subject is the user id. The same
//! token authenticates REST calls and the real-time connection; the relay reaches
//! this module only through the [`Authenticator`] seam.

use crate::error::{DomainErrorKind, EntityErrorKind, Error, InternalErrorKind};
use crate::Id;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::*;
use realtime::auth::{AuthError, Authenticator};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use service::config::Config;
use std::time::Duration;

// re-export the Jwt struct from the entity module
pub use entity::jwts::Jwt;

const ISSUER: &str = "switchboard";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) sub: String,
    pub(crate) iss: String,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
}

/// Issues and verifies HS256 credential tokens with the configured secret.
#[derive(Clone)]
pub struct TokenAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl TokenAuthenticator {
    pub fn new(secret: &SecretString, lifetime: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
            lifetime,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.jwt_signing_secret(), config.token_lifetime())
    }

    pub fn issue(&self, user_id: Id) -> Result<Jwt, Error> {
        let issued_at = Utc::now();
        let expires_at = issued_at
            + chrono::Duration::from_std(self.lifetime).map_err(|_| {
                warn!("Configured token lifetime is out of range");
                Error::entity(EntityErrorKind::Invalid)
            })?;

        let claims = Claims {
            sub: user_id.to_string(),
            iss: ISSUER.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(Jwt {
            token,
            sub: claims.sub,
            expires_at: truncate_to_seconds(expires_at),
        })
    }

    /// Returns the user a valid, unexpired token was issued for.
    pub fn decode(&self, token: &str) -> Result<Id, Error> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!("Rejected credential token: {e}");
            Error {
                source: Some(Box::new(e)),
                error_kind: DomainErrorKind::Internal(InternalErrorKind::Entity(
                    EntityErrorKind::Unauthenticated,
                )),
            }
        })?;

        Id::parse_str(&data.claims.sub).map_err(|_| Error::entity(EntityErrorKind::Unauthenticated))
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn verify(&self, credential_token: &str) -> Result<Id, AuthError> {
        self.decode(credential_token)
            .map_err(|_| AuthError::invalid("token failed verification"))
    }
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}
