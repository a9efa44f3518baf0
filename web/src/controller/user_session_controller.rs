use crate::controller::ApiResponse;
use crate::extractors::{authenticated_user::AuthenticatedUser, json_or_form::JsonOrForm};
use crate::{AppState, Error};
use axum::extract::State;
use axum::{http::StatusCode, response::IntoResponse, Json};
use domain::token::TokenAuthenticator;
use domain::user::{self as UserApi, Credentials};
use log::*;
use serde_json::json;

const LOGOUT_REASON: &str = "logged out";

/// Logs the user in and returns a signed credential token.
///
/// The token authenticates both the REST endpoints and the real-time connection:
/// curl -v --header "Authorization: Bearer <token>" --request GET http://localhost:4000/channels
/// websocat "ws://localhost:4000/ws?token=<token>"
#[utoipa::path(
    post,
    path = "/login",
    request_body(content = domain::user::Credentials, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Logs in and returns a credential token", body = domain::jwts::Jwt),
        (status = 401, description = "Unauthorized"),
        (status = 405, description = "Method not allowed"),
        (status = 503, description = "Service temporarily unavailable")
    )
)]
pub async fn login(
    State(app_state): State<AppState>,
    JsonOrForm(creds): JsonOrForm<Credentials>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST login for {:?}", creds.email);

    let tokens = TokenAuthenticator::from_config(&app_state.config);
    let (user, jwt) = UserApi::login(app_state.db_conn_ref(), &tokens, creds).await?;

    debug!("Issued credential token for user {}", user.id);

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), jwt)))
}

/// Logs the user out everywhere: every live real-time session of the user is
/// sent `force_logout` and closed.
/// Test this with curl: curl -v \
/// --header "Authorization: Bearer <token>" \
/// --request DELETE http://localhost:4000/logout
#[utoipa::path(
    delete,
    path = "/logout",
    responses(
        (status = 200, description = "Successfully logged out"),
        (status = 401, description = "Unauthorized"),
        (status = 405, description = "Method not allowed"),
        (status = 503, description = "Service temporarily unavailable")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete(
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    trace!("UserSessionController::delete()");

    let terminated = app_state
        .hub
        .registry()
        .terminate_user(&user.id, LOGOUT_REASON)
        .await;
    info!("User {} logged out, ended {terminated} live session(s)", user.id);

    Json(ApiResponse::new(
        StatusCode::OK.into(),
        json!({ "terminated_sessions": terminated }),
    ))
}

#[cfg(test)]
// We need to gate seaORM's mock feature behind conditional compilation because
// the feature removes the Clone trait implementation from seaORM's DatabaseConnection.
// see https://github.com/SeaQL/sea-orm/issues/830
#[cfg(feature = "mock")]
mod tests {
    use crate::router::{define_routes, tests::test_state};
    use axum::body::{to_bytes, Body};
    use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
    use chrono::Utc;
    use domain::{users, Id};
    use password_auth::generate_hash;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use tower::ServiceExt;

    fn test_user() -> users::Model {
        users::Model {
            id: Id::new_v4(),
            email: "dev@switchboard.local".to_string(),
            display_name: "Dev".to_string(),
            password: generate_hash("password"),
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn login_request(content_type: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn login_with_form_credentials_returns_a_credential_token() {
        let user = test_user();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[user.clone()]])
            .into_connection();
        let app = define_routes(test_state(db));

        let response = app
            .oneshot(login_request(
                "application/x-www-form-urlencoded",
                "email=dev@switchboard.local&password=password",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["data"]["token"].as_str().is_some());
        assert_eq!(json["data"]["sub"], user.id.to_string());
    }

    #[tokio::test]
    async fn login_with_wrong_json_password_is_unauthorized() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[test_user()]])
            .into_connection();
        let app = define_routes(test_state(db));

        let response = app
            .oneshot(login_request(
                "application/json",
                r#"{"email": "dev@switchboard.local", "password": "wrong"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_with_unknown_email_is_unauthorized() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<users::Model>::new()])
            .into_connection();
        let app = define_routes(test_state(db));

        let response = app
            .oneshot(login_request(
                "application/json",
                r#"{"email": "nobody@switchboard.local", "password": "password"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
