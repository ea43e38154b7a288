use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use truefeedback_db::models::UserRow;
use truefeedback_db::{Database, NewPendingUser, RegisterOutcome};
use truefeedback_types::api::{
    ApiResponse, SignInRequest, SignInResponse, SignUpRequest, UsernameQuery, VerifyCodeRequest,
};
use truefeedback_types::verification::{self, CodeCheck};

use crate::error::{ApiError, ValidatedJson};
use crate::mailer::Mailer;
use crate::middleware::Claims;
use crate::run_db;
use crate::suggest::SuggestionProvider;
use crate::views::user_view;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub session_days: i64,
    pub mailer: Mailer,
    pub suggestions: SuggestionProvider,
}

/// POST /sign-up: register, or retry an abandoned registration for the same
/// email, then mail a fresh verification code.
///
/// The account row is committed before the mail goes out. If delivery fails
/// the caller gets a 500 and recovers by signing up again with the same email.
#[utoipa::path(
    post,
    path = "/sign-up",
    tag = "Authentication",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account registered, verification code mailed", body = ApiResponse),
        (status = 400, description = "Validation failed, or username or email already taken", body = ApiResponse),
        (status = 500, description = "Storage or mail failure", body = ApiResponse)
    )
)]
pub async fn sign_up(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let issued = verification::issue(Utc::now());

    let pending = {
        let username = req.username.clone();
        let email = email.clone();
        let code = issued.code.clone();
        let expiry = issued.expires_at;
        let password = req.password;
        move |db: &Database| {
            let password_hash = hash_password(&password)?;
            db.upsert_pending_user(
                &NewPendingUser {
                    username,
                    email,
                    password_hash,
                    verify_code: code,
                    verify_code_expiry: expiry,
                },
                Utc::now(),
            )
        }
    };

    match run_db(&state, pending).await? {
        RegisterOutcome::UsernameTaken => {
            info!(username = %req.username, "Sign-up rejected: username taken");
            return Err(ApiError::BadRequest("Username already exists".into()));
        }
        RegisterOutcome::EmailTaken => {
            info!(username = %req.username, "Sign-up rejected: email in use");
            return Err(ApiError::BadRequest("User with this email already exists".into()));
        }
        RegisterOutcome::Created(id) => info!(user_id = %id, "Registered new account"),
        RegisterOutcome::Refreshed(id) => info!(user_id = %id, "Refreshed pending registration"),
    }

    state
        .mailer
        .send_verification(&email, &req.username, &issued.code)
        .await
        .map_err(|e| {
            error!("Failed to send verification email: {:#}", e);
            ApiError::Internal("Failed to send verification email".into())
        })?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "User registered successfully. Please check your email for the verification code.",
        )),
    ))
}

/// POST /verify-code
#[utoipa::path(
    post,
    path = "/verify-code",
    tag = "Authentication",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Account verified", body = ApiResponse),
        (status = 400, description = "Code expired or incorrect", body = ApiResponse),
        (status = 500, description = "User not found", body = ApiResponse)
    )
)]
pub async fn verify_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.clone();
    let candidates = run_db(&state, move |db| db.get_verification_candidates(&username)).await?;
    let user = pick_candidate(candidates, &req.code).ok_or_else(|| {
        warn!(username = %req.username, "Verification for unknown user");
        ApiError::Internal("User not found".into())
    })?;

    match verification::check_code(&user.verify_code, user.verify_code_expiry, &req.code, Utc::now()) {
        CodeCheck::Accepted => {
            let id = user.id.clone();
            if !run_db(&state, move |db| db.mark_verified(&id)).await? {
                warn!(user_id = %user.id, "Account vanished before verification");
                return Err(ApiError::Internal("User not found".into()));
            }
            info!(user_id = %user.id, "Account verified");
            Ok(Json(ApiResponse::ok("Account verified successfully")))
        }
        CodeCheck::Expired => {
            info!(user_id = %user.id, "Verification rejected: code expired");
            Err(ApiError::BadRequest(
                "Verification code has expired. Please sign up again to get a new code".into(),
            ))
        }
        CodeCheck::Mismatch => {
            info!(user_id = %user.id, "Verification rejected: wrong code");
            Err(ApiError::BadRequest("Incorrect Verification Code".into()))
        }
    }
}

/// POST /sign-in: credentials in, session token out.
#[utoipa::path(
    post,
    path = "/sign-in",
    tag = "Authentication",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Session token issued", body = SignInResponse),
        (status = 400, description = "Missing field", body = ApiResponse),
        (status = 401, description = "Unknown user, unverified account or wrong password", body = ApiResponse)
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identifier = req.identifier.trim().to_string();
    let user = run_db(&state, move |db| db.get_user_by_identifier(&identifier))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("No user found with this email or username".into()))?;

    if !user.is_verified {
        return Err(ApiError::Unauthorized("Please verify your account before login".into()));
    }

    let stored = user.password.clone();
    let password = req.password;
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal()
        })??;
    if !matches {
        info!(user_id = %user.id, "Sign-in rejected: wrong password");
        return Err(ApiError::Unauthorized("Incorrect password".into()));
    }

    let user = user_view(user);
    let token = create_token(&state.jwt_secret, user.id, &user.username, state.session_days)?;

    Ok(Json(SignInResponse {
        success: true,
        token,
        user,
    }))
}

/// GET /check-username-unique?username=
#[utoipa::path(
    get,
    path = "/check-username-unique",
    tag = "Utility",
    params(UsernameQuery),
    responses(
        (status = 200, description = "Username is free", body = ApiResponse),
        (status = 400, description = "Username is taken or invalid", body = ApiResponse)
    )
)]
pub async fn check_username_unique(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if let Err(errors) = query.validate() {
        let messages: Vec<String> = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .collect();
        let message = if messages.is_empty() {
            "Invalid query parameters".to_string()
        } else {
            messages.join(", ")
        };
        return Err(ApiError::BadRequest(message));
    }

    let username = query.username;
    let taken = run_db(&state, move |db| db.get_verified_user_by_username(&username))
        .await?
        .is_some();

    if taken {
        return Err(ApiError::BadRequest("Username is already taken".into()));
    }
    Ok(Json(ApiResponse::ok("Username is unique")))
}

/// Pending registrations can share a username, so the submitted code picks
/// its own record. Without a match the newest record answers.
fn pick_candidate(mut candidates: Vec<UserRow>, code: &str) -> Option<UserRow> {
    if candidates.is_empty() {
        return None;
    }
    let idx = candidates.iter().position(|u| u.verify_code == code).unwrap_or(0);
    Some(candidates.swap_remove(idx))
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed_hash =
        PasswordHash::new(stored).map_err(|e| anyhow::anyhow!("Corrupt password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str, days: i64) -> anyhow::Result<String> {
    let expires = chrono::Duration::try_days(days)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| anyhow::anyhow!("session lifetime of {} days is out of range", days))?;
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: expires.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{call, json_request, sign_up_and_verify, test_state};
    use crate::router;
    use axum::http::Method;
    use serde_json::json;

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("secret1").unwrap();
        assert_ne!(hash, "secret1");
        assert!(verify_password("secret1", &hash).unwrap());
        assert!(!verify_password("secret2", &hash).unwrap());
    }

    #[tokio::test]
    async fn sign_up_creates_unverified_account_with_code() {
        let state = test_state();
        let app = router(state.clone());

        let (status, body) = call(
            &app,
            json_request(
                Method::POST,
                "/sign-up",
                json!({"username": "alice", "email": "A@X.com", "password": "secret1"}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);

        let user = state.db.get_user_for_verification("alice").unwrap().unwrap();
        assert!(!user.is_verified);
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.verify_code.len(), 6);
        assert!(user.verify_code_expiry > Utc::now());
    }

    #[tokio::test]
    async fn sign_up_reports_field_errors() {
        let app = router(test_state());
        let (status, body) = call(
            &app,
            json_request(
                Method::POST,
                "/sign-up",
                json!({"username": "a", "email": "nope", "password": "1"}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        let fields: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"username"));
        assert!(fields.contains(&"email"));
        assert!(fields.contains(&"password"));
    }

    #[tokio::test]
    async fn verified_username_and_email_are_reserved() {
        let state = test_state();
        let app = router(state.clone());
        sign_up_and_verify(&app, &state, "alice", "a@x.com", "secret1").await;

        let (status, body) = call(
            &app,
            json_request(
                Method::POST,
                "/sign-up",
                json!({"username": "alice", "email": "b@x.com", "password": "secret1"}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Username already exists");

        let (status, body) = call(
            &app,
            json_request(
                Method::POST,
                "/sign-up",
                json!({"username": "alice2", "email": "a@x.com", "password": "secret1"}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "User with this email already exists");
    }

    #[tokio::test]
    async fn re_registration_issues_a_new_code() {
        let state = test_state();
        let app = router(state.clone());
        let body = json!({"username": "alice", "email": "a@x.com", "password": "secret1"});

        call(&app, json_request(Method::POST, "/sign-up", body.clone(), None)).await;
        let first = state.db.get_user_for_verification("alice").unwrap().unwrap();

        let renamed = json!({"username": "alicia", "email": "a@x.com", "password": "secret2"});
        let (status, _) = call(&app, json_request(Method::POST, "/sign-up", renamed, None)).await;
        assert_eq!(status, StatusCode::CREATED);

        let second = state.db.get_user_for_verification("alicia").unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_ne!(first.password, second.password);
        assert!(state.db.get_user_for_verification("alice").unwrap().is_none());
    }

    #[tokio::test]
    async fn mail_failure_is_reported_but_account_persists() {
        let state = crate::testing::state_with(Mailer::resend(
            "http://127.0.0.1:9/emails".into(),
            "key".into(),
            "noreply@example.com".into(),
        ));
        let app = router(state.clone());

        let (status, body) = call(
            &app,
            json_request(
                Method::POST,
                "/sign-up",
                json!({"username": "alice", "email": "a@x.com", "password": "secret1"}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(state.db.get_user_for_verification("alice").unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_code_is_reported_as_expired() {
        let state = test_state();
        let app = router(state.clone());
        call(
            &app,
            json_request(
                Method::POST,
                "/sign-up",
                json!({"username": "alice", "email": "a@x.com", "password": "secret1"}),
                None,
            ),
        )
        .await;
        let user = state.db.get_user_for_verification("alice").unwrap().unwrap();

        state
            .db
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE users SET verify_code_expiry = ?2 WHERE id = ?1",
                    (&user.id, Utc::now() - chrono::Duration::seconds(1)),
                )?;
                Ok(())
            })
            .unwrap();

        let (status, body) = call(
            &app,
            json_request(
                Method::POST,
                "/verify-code",
                json!({"username": "alice", "code": user.verify_code}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("expired"));
        assert!(!state.db.get_user_by_id(&user.id).unwrap().unwrap().is_verified);
    }

    #[tokio::test]
    async fn each_pending_registration_verifies_with_its_own_code() {
        let state = test_state();
        let app = router(state.clone());
        for email in ["a@x.com", "other@x.com"] {
            let (status, _) = call(
                &app,
                json_request(
                    Method::POST,
                    "/sign-up",
                    json!({"username": "alice", "email": email, "password": "secret1"}),
                    None,
                ),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let candidates = state.db.get_verification_candidates("alice").unwrap();
        assert_eq!(candidates.len(), 2);
        let first = candidates.iter().find(|u| u.email == "a@x.com").unwrap().clone();
        let second = candidates.iter().find(|u| u.email == "other@x.com").unwrap().clone();
        // Codes are random; a collision would make the test meaningless.
        if first.verify_code == second.verify_code {
            return;
        }

        let (status, body) = call(
            &app,
            json_request(
                Method::POST,
                "/verify-code",
                json!({"username": "alice", "code": first.verify_code}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(state.db.get_user_by_id(&first.id).unwrap().unwrap().is_verified);
        assert!(!state.db.get_user_by_id(&second.id).unwrap().unwrap().is_verified);
    }

    #[test]
    fn unmatched_code_is_judged_against_the_newest_record() {
        let now = Utc::now();
        let row = |id: &str, code: &str, minutes: i64| UserRow {
            id: id.into(),
            username: "alice".into(),
            email: format!("{id}@x.com"),
            password: "h".into(),
            is_verified: false,
            verify_code: code.into(),
            verify_code_expiry: now + chrono::Duration::minutes(minutes),
            is_accepting_message: true,
            created_at: now,
        };

        let picked = pick_candidate(vec![row("new", "222222", 50), row("old", "111111", 10)], "111111");
        assert_eq!(picked.unwrap().id, "old");

        let picked = pick_candidate(vec![row("new", "222222", 50), row("old", "111111", 10)], "999999");
        assert_eq!(picked.unwrap().id, "new");

        assert!(pick_candidate(Vec::new(), "111111").is_none());
    }

    #[tokio::test]
    async fn sign_in_accepts_email_in_any_case() {
        let state = test_state();
        let app = router(state.clone());
        sign_up_and_verify(&app, &state, "alice", "Alice@X.com", "secret1").await;

        for identifier in ["Alice@X.com", "alice@x.com", "ALICE@X.COM"] {
            let (status, body) = call(
                &app,
                json_request(
                    Method::POST,
                    "/sign-in",
                    json!({"identifier": identifier, "password": "secret1"}),
                    None,
                ),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{identifier}: {body}");
            assert_eq!(body["user"]["email"], "alice@x.com");
        }

        let (status, _) = call(
            &app,
            json_request(
                Method::POST,
                "/sign-in",
                json!({"identifier": "ALICE", "password": "secret1"}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn token_lifetime_out_of_range_is_an_error() {
        assert!(create_token("s", Uuid::new_v4(), "alice", 30).is_ok());
        assert!(create_token("s", Uuid::new_v4(), "alice", i64::MAX / 2).is_err());
    }

    #[tokio::test]
    async fn verify_unknown_user_is_server_error() {
        let app = router(test_state());
        let (status, body) = call(
            &app,
            json_request(
                Method::POST,
                "/verify-code",
                json!({"username": "ghost", "code": "123456"}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "User not found");
    }

    #[tokio::test]
    async fn sign_in_requires_verification_and_password() {
        let state = test_state();
        let app = router(state.clone());
        call(
            &app,
            json_request(
                Method::POST,
                "/sign-up",
                json!({"username": "bob", "email": "b@x.com", "password": "secret1"}),
                None,
            ),
        )
        .await;

        let (status, body) = call(
            &app,
            json_request(
                Method::POST,
                "/sign-in",
                json!({"identifier": "bob", "password": "secret1"}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Please verify your account before login");

        sign_up_and_verify(&app, &state, "alice", "a@x.com", "secret1").await;
        let (status, body) = call(
            &app,
            json_request(
                Method::POST,
                "/sign-in",
                json!({"identifier": "a@x.com", "password": "wrong!"}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Incorrect password");

        let (status, body) = call(
            &app,
            json_request(
                Method::POST,
                "/sign-in",
                json!({"identifier": "nobody", "password": "secret1"}),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "No user found with this email or username");
    }

    #[tokio::test]
    async fn username_uniqueness_check() {
        let state = test_state();
        let app = router(state.clone());
        sign_up_and_verify(&app, &state, "alice", "a@x.com", "secret1").await;

        let get = |uri: &'static str| {
            axum::http::Request::builder()
                .uri(uri)
                .body(axum::body::Body::empty())
                .unwrap()
        };

        let (status, body) = call(&app, get("/check-username-unique?username=alice")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Username is already taken");

        let (status, body) = call(&app, get("/check-username-unique?username=bob")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Username is unique");

        let (status, body) = call(&app, get("/check-username-unique?username=b%21")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Username must not contain special characters");
    }
}
