use crate::controller::{
    channel_controller, health_check_controller, user_controller, user_session_controller,
};
use crate::{params, ws, AppState};
use axum::{
    routing::{delete, get, post},
    Router,
};

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Switchboard API"
        ),
        paths(
            channel_controller::index,
            channel_controller::create,
            channel_controller::delete,
            channel_controller::members,
            channel_controller::history,
            health_check_controller::health_check,
            user_controller::create,
            user_session_controller::login,
            user_session_controller::delete,
        ),
        components(
            schemas(
                domain::jwts::Jwt,
                domain::users::Model,
                domain::user::Credentials,
                domain::user::NewUser,
                params::channel::CreateParams,
            )
        ),
        modifiers(&SecurityAddon),
        tags(
            (name = "switchboard", description = "Switchboard chat and call signaling API")
        )
    )]
struct ApiDoc;

struct SecurityAddon;

// Every protected endpoint expects the credential token returned by POST /login
// as an `Authorization: Bearer` header.
impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Credential token returned from a successful login"))
                        .build(),
                ),
            )
        }
    }
}

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(user_routes(app_state.clone()))
        .merge(user_session_routes(app_state.clone()))
        .merge(channel_routes(app_state.clone()))
        .merge(realtime_routes(app_state))
        // **** FIXME: protect the OpenAPI web UI
        .merge(RapiDoc::with_openapi("/api-docs/openapi2.json", ApiDoc::openapi()).path("/rapidoc"))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn user_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/users", post(user_controller::create))
        .with_state(app_state)
}

fn user_session_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/login", post(user_session_controller::login))
        .route("/logout", delete(user_session_controller::delete))
        .with_state(app_state)
}

fn channel_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/channels", get(channel_controller::index))
        .route("/channels", post(channel_controller::create))
        .route("/channels/:id", delete(channel_controller::delete))
        .route("/channels/:id/members", get(channel_controller::members))
        .route("/channels/:id/messages", get(channel_controller::history))
        .with_state(app_state)
}

fn realtime_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::handler::ws_handler))
        .with_state(app_state)
}
