use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::{info, warn};

use truefeedback_types::api::{
    AcceptMessagesRequest, AcceptMessagesResponse, AcceptingStatusResponse, ApiResponse,
};

use crate::auth::AppState;
use crate::error::{ApiError, ValidatedJson};
use crate::middleware::Claims;
use crate::run_db;
use crate::views::user_view;

/// GET /accept-messages
#[utoipa::path(
    get,
    path = "/accept-messages",
    tag = "User",
    responses(
        (status = 200, description = "Current acceptance status", body = AcceptingStatusResponse),
        (status = 401, description = "Not authenticated", body = ApiResponse),
        (status = 404, description = "User not found", body = ApiResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_accepting(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let user = run_db(&state, move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "Authenticated user has no account");
            ApiError::NotFound("User not found".into())
        })?;

    Ok(Json(AcceptingStatusResponse {
        success: true,
        is_accepting_message: user.is_accepting_message,
    }))
}

/// POST /accept-messages: last writer wins.
#[utoipa::path(
    post,
    path = "/accept-messages",
    tag = "User",
    request_body = AcceptMessagesRequest,
    responses(
        (status = 200, description = "Acceptance status updated", body = AcceptMessagesResponse),
        (status = 401, description = "Not authenticated, or update failed", body = ApiResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn set_accepting(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidatedJson(req): ValidatedJson<AcceptMessagesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let accepting = req.accept_messages;
    let updated = run_db(&state, move |db| db.set_accepting(&user_id, accepting))
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "Acceptance update matched no account");
            ApiError::Unauthorized("Failed to update message acceptance status".into())
        })?;

    info!(user_id = %claims.sub, accepting, "Message acceptance updated");
    Ok(Json(AcceptMessagesResponse {
        success: true,
        message: "Message acceptance status updated successfully".into(),
        updated_user: user_view(updated),
    }))
}

#[cfg(test)]
mod tests {
    use crate::router;
    use crate::testing::{call, json_request, sign_up_and_verify, test_state};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn toggle_round_trip() {
        let state = test_state();
        let app = router(state.clone());
        let token = sign_up_and_verify(&app, &state, "alice", "a@x.com", "secret1").await;

        let (status, body) = call(
            &app,
            json_request(Method::GET, "/accept-messages", json!(null), Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isAcceptingMessage"], true);

        let (status, body) = call(
            &app,
            json_request(
                Method::POST,
                "/accept-messages",
                json!({"acceptMessages": false}),
                Some(&token),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updatedUser"]["isAcceptingMessage"], false);
        assert_eq!(body["updatedUser"]["username"], "alice");
        assert!(body["updatedUser"].get("password").is_none());
        assert!(body["updatedUser"].get("verifyCode").is_none());

        let (_, body) = call(
            &app,
            json_request(Method::GET, "/accept-messages", json!(null), Some(&token)),
        )
        .await;
        assert_eq!(body["isAcceptingMessage"], false);
    }

    #[tokio::test]
    async fn requires_a_session() {
        let app = router(test_state());

        let (status, body) =
            call(&app, json_request(Method::GET, "/accept-messages", json!(null), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Not authenticated");

        let (status, _) = call(
            &app,
            json_request(
                Method::POST,
                "/accept-messages",
                json!({"acceptMessages": true}),
                Some("not-a-jwt"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn vanished_account_is_reported() {
        let state = test_state();
        let app = router(state.clone());
        let token = crate::testing::token_for_missing_user(&state);

        let (status, _) =
            call(&app, json_request(Method::GET, "/accept-messages", json!(null), Some(&token)))
                .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app,
            json_request(
                Method::POST,
                "/accept-messages",
                json!({"acceptMessages": true}),
                Some(&token),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
