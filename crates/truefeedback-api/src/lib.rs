pub mod accept;
pub mod auth;
pub mod error;
pub mod mailer;
pub mod messages;
pub mod middleware;
pub mod openapi;
pub mod suggest;
mod views;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tracing::error;

use truefeedback_db::Database;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::require_auth;

/// All HTTP routes plus the API docs at `/api-docs`. Transport layers
/// (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/sign-up", post(auth::sign_up))
        .route("/verify-code", post(auth::verify_code))
        .route("/sign-in", post(auth::sign_in))
        .route("/check-username-unique", get(auth::check_username_unique))
        .route("/send-message", post(messages::send_message))
        .route("/suggest-messages", post(suggest::suggest_messages))
        .route("/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/accept-messages", get(accept::get_accepting).post(accept::set_accepting))
        .route("/get-messages", get(messages::get_messages))
        .route("/delete-message/{message_id}", delete(messages::delete_message))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(openapi::swagger_ui())
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Utility",
    responses(
        (status = 200, description = "Service is up", body = String, content_type = "text/plain")
    )
)]
async fn health() -> &'static str {
    "ok"
}

/// Run a blocking DB call off the async runtime.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal()
        })?
        .map_err(ApiError::from)
}
