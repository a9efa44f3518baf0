use crate::controller::ApiResponse;
use crate::extractors::compare_api_version::CompareApiVersion;
use crate::{AppState, Error};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use domain::user::{self as UserApi, NewUser};
use log::*;
use service::config::ApiVersion;

/// POST sign up a new user
#[utoipa::path(
    post,
    path = "/users",
    params(ApiVersion),
    request_body = domain::user::NewUser,
    responses(
        (status = 201, description = "Successfully signed up a new User", body = domain::users::Model),
        (status = 409, description = "Email address already signed up"),
        (status = 422, description = "Unprocessable Entity"),
        (status = 405, description = "Method not allowed"),
        (status = 503, description = "Service temporarily unavailable")
    )
)]
pub async fn create(
    CompareApiVersion(_v): CompareApiVersion,
    State(app_state): State<AppState>,
    Json(new_user): Json<NewUser>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST sign up a new User: {:?}", new_user.email);

    let user = UserApi::signup(app_state.db_conn_ref(), new_user).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(StatusCode::CREATED.into(), user)),
    ))
}
