use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{Message, User};

/// Longest message body accepted by intake, counted in characters after trimming.
pub const MAX_MESSAGE_CHARS: usize = 300;

// -- JWT Claims --

/// Session claims carried by the bearer token. `sub` is the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Envelope --

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

// -- Auth --

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignUpRequest {
    #[validate(
        length(min = 2, max = 20, message = "Username must be between 2 and 20 characters"),
        custom(function = "username_charset")
    )]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyCodeRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(custom(function = "six_digits"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignInRequest {
    #[validate(length(min = 1, message = "Email or username is required"))]
    pub identifier: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignInResponse {
    pub success: bool,
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UsernameQuery {
    #[serde(default)]
    #[validate(
        length(min = 2, max = 20, message = "Username must be between 2 and 20 characters"),
        custom(function = "username_charset")
    )]
    pub username: String,
}

// -- Acceptance --

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcceptMessagesRequest {
    pub accept_messages: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcceptingStatusResponse {
    pub success: bool,
    pub is_accepting_message: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcceptMessagesResponse {
    pub success: bool,
    pub message: String,
    pub updated_user: User,
}

// -- Messages --

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(custom(function = "message_content"))]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessagesResponse {
    pub success: bool,
    pub messages: Vec<Message>,
}

// -- Validators --

fn username_charset(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ValidationError::new("username_charset")
            .with_message("Username must not contain special characters".into()))
    }
}

fn six_digits(value: &str) -> Result<(), ValidationError> {
    if value.len() == 6 && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("six_digits")
            .with_message("Verification code must be 6 digits".into()))
    }
}

fn message_content(value: &str) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if len == 0 {
        return Err(ValidationError::new("message_content")
            .with_message("Content must not be empty".into()));
    }
    if len > MAX_MESSAGE_CHARS {
        return Err(ValidationError::new("message_content")
            .with_message(format!("Content must be no longer than {MAX_MESSAGE_CHARS} characters").into()));
    }
    Ok(())
}
