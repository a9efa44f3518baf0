use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// A signed credential token handed to a client after login. It is presented
/// again when opening a real-time connection or calling a protected endpoint.
/// Note: This struct does not have a corresponding entity in the database.
///
/// - `token`: the encoded JWT
/// - `sub`: the user id the token was issued for, so clients don't need to decode it
/// - `expires_at`: when the relay stops accepting the token
#[derive(Serialize, Debug, Clone, ToSchema)]
#[schema(as = jwt::Jwt)] // OpenAPI schema
pub struct Jwt {
    pub token: String,
    pub sub: String,
    #[schema(value_type = String, format = DateTime)]
    pub expires_at: DateTime<Utc>,
}
