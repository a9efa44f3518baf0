//! The authentication collaborator seam. The relay never signs or hashes anything
//! itself; it only asks whether a credential token names a user.

use async_trait::async_trait;
use events::Id;
use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct AuthError {
    pub reason: String,
}

impl AuthError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid credential: {}", self.reason)
    }
}

impl StdError for AuthError {}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolves a credential token to the user it was issued for.
    async fn verify(&self, credential_token: &str) -> Result<Id, AuthError>;
}
