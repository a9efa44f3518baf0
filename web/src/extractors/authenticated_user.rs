use crate::extractors::{bearer_token, RejectionType};
use crate::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use domain::error::{DomainErrorKind, EntityErrorKind, InternalErrorKind};
use domain::token::TokenAuthenticator;
use domain::{user as UserApi, users};
use log::*;

pub(crate) struct AuthenticatedUser(pub users::Model);

fn unauthorized() -> RejectionType {
    (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = RejectionType;

    // Decodes the bearer credential token and loads the user it was issued for.
    // A token for a user that no longer exists is treated like a bad token.
    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(unauthorized)?;

        let user_id = TokenAuthenticator::from_config(&state.config)
            .decode(token)
            .map_err(|_| unauthorized())?;

        match UserApi::find_by_id(state.db_conn_ref(), user_id).await {
            Ok(user) => Ok(AuthenticatedUser(user)),
            Err(e)
                if e.error_kind
                    == DomainErrorKind::Internal(InternalErrorKind::Entity(
                        EntityErrorKind::NotFound,
                    )) =>
            {
                debug!("Token presented for unknown user {user_id}");
                Err(unauthorized())
            }
            Err(e) => {
                error!("Failed to load authenticated user {user_id}: {e:?}");
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL SERVER ERROR".to_string(),
                ))
            }
        }
    }
}
