use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{error, info};

use truefeedback_db::{DeleteOutcome, IntakeOutcome};
use truefeedback_types::api::{ApiResponse, MessagesResponse, SendMessageRequest};

use crate::auth::AppState;
use crate::error::{ApiError, ValidatedJson};
use crate::middleware::Claims;
use crate::run_db;
use crate::views::message_view;

/// Senders see one answer for "no such user" and "inbox closed" so the
/// endpoint can't be used to discover which usernames exist. The log keeps the
/// real reason.
const RECIPIENT_UNAVAILABLE: &str = "User not found or not accepting messages";

/// POST /send-message: anonymous, no session required.
#[utoipa::path(
    post,
    path = "/send-message",
    tag = "Messages",
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Message delivered", body = ApiResponse),
        (status = 400, description = "Validation failed", body = ApiResponse),
        (status = 404, description = "User not found or not accepting messages", body = ApiResponse)
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.clone();
    let content = req.content.trim().to_string();

    let outcome = run_db(&state, move |db| db.deliver_message(&username, &content, Utc::now())).await?;

    match outcome {
        IntakeOutcome::Delivered(row) => {
            info!(message_id = %row.id, recipient = %row.user_id, "Message delivered");
            Ok(Json(ApiResponse::ok("Message sent successfully")))
        }
        IntakeOutcome::UnknownRecipient => {
            info!(recipient = %req.username, "Message rejected: unknown recipient");
            Err(ApiError::NotFound(RECIPIENT_UNAVAILABLE.into()))
        }
        IntakeOutcome::NotAccepting => {
            info!(recipient = %req.username, "Message rejected: recipient not accepting");
            Err(ApiError::NotFound(RECIPIENT_UNAVAILABLE.into()))
        }
    }
}

/// GET /get-messages: the caller's inbox, newest first.
#[utoipa::path(
    get,
    path = "/get-messages",
    tag = "Messages",
    responses(
        (status = 200, description = "Inbox, newest first", body = MessagesResponse),
        (status = 401, description = "Not authenticated", body = ApiResponse),
        (status = 404, description = "User not found", body = ApiResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let rows = run_db(&state, move |db| {
        if db.get_user_by_id(&user_id)?.is_none() {
            return Ok(None);
        }
        db.get_messages(&user_id).map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(MessagesResponse {
        success: true,
        messages: rows.into_iter().map(message_view).collect(),
    }))
}

/// DELETE /delete-message/{message_id}
#[utoipa::path(
    delete,
    path = "/delete-message/{message_id}",
    tag = "Messages",
    params(
        ("message_id" = String, Path, description = "Id of the message to delete")
    ),
    responses(
        (status = 200, description = "Message deleted", body = ApiResponse),
        (status = 401, description = "Not authenticated", body = ApiResponse),
        (status = 404, description = "User or message not found", body = ApiResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let mid = message_id.clone();
    let outcome = run_db(&state, move |db| db.delete_message(&user_id, &mid)).await?;

    match outcome {
        DeleteOutcome::Deleted => {
            info!(user_id = %claims.sub, %message_id, "Message deleted");
            Ok(Json(ApiResponse::ok("Message deleted successfully")))
        }
        DeleteOutcome::MessageMissing => Err(ApiError::NotFound(
            "Message not found or already deleted".into(),
        )),
        DeleteOutcome::UserMissing => {
            error!(user_id = %claims.sub, "Authenticated user has no account");
            Err(ApiError::NotFound("User not found".into()))
        }
    }
}
