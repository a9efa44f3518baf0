use crate::controller::ApiResponse;
use crate::extractors::{
    authenticated_user::AuthenticatedUser, compare_api_version::CompareApiVersion,
};
use crate::params::channel::{CreateParams, HistoryParams};
use crate::{AppState, Error};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use realtime::channel::ChannelId;
use service::config::ApiVersion;

/// GET all channels
#[utoipa::path(
    get,
    path = "/channels",
    params(ApiVersion),
    responses(
        (status = 200, description = "Successfully retrieved all Channel ids", body = [String]),
        (status = 401, description = "Unauthorized"),
        (status = 405, description = "Method not allowed"),
        (status = 503, description = "Service temporarily unavailable")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn index(
    CompareApiVersion(_v): CompareApiVersion,
    AuthenticatedUser(_user): AuthenticatedUser,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    debug!("GET all Channels");

    let channels = app_state.hub.router().list_channels().await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), channels)))
}

/// POST create a new Channel. Creating a channel that already exists succeeds.
#[utoipa::path(
    post,
    path = "/channels",
    params(ApiVersion),
    request_body = CreateParams,
    responses(
        (status = 201, description = "Successfully created a new Channel", body = String),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Invalid channel id"),
        (status = 405, description = "Method not allowed"),
        (status = 503, description = "Service temporarily unavailable")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create(
    CompareApiVersion(_v): CompareApiVersion,
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Json(params): Json<CreateParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST create Channel {:?} by user {}", params.id, user.id);

    let channel_id = ChannelId::parse(params.id)?;
    app_state.hub.router().create_channel(&channel_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(StatusCode::CREATED.into(), channel_id)),
    ))
}

/// DELETE a Channel, its messages and its live memberships
#[utoipa::path(
    delete,
    path = "/channels/{id}",
    params(
        ApiVersion,
        ("id" = String, Path, description = "Channel id to delete")
    ),
    responses(
        (status = 204, description = "Successfully deleted the Channel"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Channel not found"),
        (status = 405, description = "Method not allowed"),
        (status = 503, description = "Service temporarily unavailable")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete(
    CompareApiVersion(_v): CompareApiVersion,
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    debug!("DELETE Channel {id:?} by user {}", user.id);

    let channel_id = ChannelId::parse(id)?;
    app_state.hub.router().delete_channel(&channel_id).await?;

    Ok(Json(ApiResponse::<()>::no_content(
        StatusCode::NO_CONTENT.into(),
    )))
}

/// GET the live members of a Channel
#[utoipa::path(
    get,
    path = "/channels/{id}/members",
    params(
        ApiVersion,
        ("id" = String, Path, description = "Channel id")
    ),
    responses(
        (status = 200, description = "Sessions currently subscribed to the Channel"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Channel not found"),
        (status = 405, description = "Method not allowed"),
        (status = 503, description = "Service temporarily unavailable")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn members(
    CompareApiVersion(_v): CompareApiVersion,
    AuthenticatedUser(_user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let channel_id = ChannelId::parse(id)?;
    let members = app_state.hub.router().members(&channel_id).await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), members)))
}

/// GET a page of a Channel's message history, oldest first.
///
/// Without `before` the newest page is returned; pass the lowest sequence seen
/// so far as `before` to page further back.
#[utoipa::path(
    get,
    path = "/channels/{id}/messages",
    params(
        ApiVersion,
        ("id" = String, Path, description = "Channel id"),
        HistoryParams
    ),
    responses(
        (status = 200, description = "Messages in ascending sequence order"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Channel not found"),
        (status = 405, description = "Method not allowed"),
        (status = 503, description = "Service temporarily unavailable")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn history(
    CompareApiVersion(_v): CompareApiVersion,
    AuthenticatedUser(_user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("GET history of Channel {id:?} with params: {params:?}");

    let channel_id = ChannelId::parse(id)?;
    let messages = app_state
        .hub
        .router()
        .history(&channel_id, params.before, params.limit)
        .await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), messages)))
}

#[cfg(test)]
// We need to gate seaORM's mock feature behind conditional compilation because
// the feature removes the Clone trait implementation from seaORM's DatabaseConnection.
// see https://github.com/SeaQL/sea-orm/issues/830
#[cfg(feature = "mock")]
mod tests {
    use crate::router::{
        define_routes,
        tests::{test_config, test_state},
    };
    use axum::body::{to_bytes, Body};
    use axum::http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Request, Response, StatusCode,
    };
    use chrono::Utc;
    use domain::token::TokenAuthenticator;
    use domain::{channels, messages, users, Id};
    use password_auth::generate_hash;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use service::config::ApiVersion;
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

    fn channel_model(id: &str) -> channels::Model {
        channels::Model {
            id: id.to_string(),
            last_sequence: 0,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn message_model(sequence: i64, sender: Id) -> messages::Model {
        messages::Model {
            id: Id::new_v4(),
            channel_id: "general".to_string(),
            sequence,
            sender_user_id: sender,
            payload: format!("message {sequence}"),
            created_at: Utc::now().into(),
        }
    }

    fn request(method: &str, uri: &str, user: &users::Model, body: Body) -> Request<Body> {
        let jwt = TokenAuthenticator::from_config(&test_config())
            .issue(user.id)
            .unwrap();
        Request::builder()
            .method(method)
            .uri(uri)
            .header(ApiVersion::field_name(), ApiVersion::default_version())
            .header(AUTHORIZATION, format!("Bearer {}", jwt.token))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap()
    }

    async fn json_body(response: Response<Body>) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn create_returns_created_with_the_channel_id() {
        let user = test_user();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[user.clone()]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .append_query_results([[channel_model("general")]])
            .into_connection();
        let app = define_routes(test_state(db));

        let response = app
            .oneshot(request(
                "POST",
                "/channels",
                &user,
                Body::from(r#"{"id": "general"}"#),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = json_body(response).await;
        assert_eq!(json["status_code"], 201);
        assert_eq!(json["data"], "general");
    }

    #[tokio::test]
    async fn create_with_a_malformed_id_is_unprocessable() {
        let user = test_user();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[user.clone()]])
            .into_connection();
        let app = define_routes(test_state(db));

        let response = app
            .oneshot(request(
                "POST",
                "/channels",
                &user,
                Body::from(r#"{"id": "Bad Id!"}"#),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn delete_of_an_unknown_channel_is_not_found() {
        let user = test_user();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[user.clone()]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let app = define_routes(test_state(db));

        let response = app
            .oneshot(request("DELETE", "/channels/nowhere", &user, Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn members_of_a_stored_channel_start_empty() {
        let user = test_user();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[user.clone()]])
            .append_query_results([[channel_model("general")]])
            .into_connection();
        let app = define_routes(test_state(db));

        let response = app
            .oneshot(request("GET", "/channels/general/members", &user, Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn history_page_before_a_cursor_is_oldest_first() {
        let user = test_user();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[user.clone()]])
            .append_query_results([[channel_model("general")]])
            .append_query_results([[message_model(9, user.id), message_model(8, user.id)]])
            .into_connection();
        let app = define_routes(test_state(db));

        let response = app
            .oneshot(request(
                "GET",
                "/channels/general/messages?before=10&limit=2",
                &user,
                Body::empty(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let sequences: Vec<i64> = json["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["sequence"].as_i64().unwrap())
            .collect();
        assert_eq!(sequences, vec![8, 9]);
    }

    #[tokio::test]
    async fn history_of_an_unknown_channel_is_not_found() {
        let user = test_user();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[user.clone()]])
            .append_query_results([Vec::<channels::Model>::new()])
            .into_connection();
        let app = define_routes(test_state(db));

        let response = app
            .oneshot(request("GET", "/channels/nowhere/messages", &user, Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_with_a_non_numeric_cursor_is_rejected() {
        let user = test_user();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[user.clone()]])
            .into_connection();
        let app = define_routes(test_state(db));

        let response = app
            .oneshot(request(
                "GET",
                "/channels/general/messages?before=latest",
                &user,
                Body::empty(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
