use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

pub use truefeedback_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Extract and validate the session JWT from the Authorization header. The
/// decoded claims are handed to handlers as an `Extension<Claims>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let unauthenticated = || ApiError::Unauthorized("Not authenticated".into());

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(unauthenticated)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| unauthenticated())?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}
