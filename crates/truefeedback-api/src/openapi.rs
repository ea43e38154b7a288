//! OpenAPI document for the HTTP surface, served with Swagger UI.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use truefeedback_types::api::{
    AcceptMessagesRequest, AcceptMessagesResponse, AcceptingStatusResponse, ApiResponse,
    MessagesResponse, SendMessageRequest, SignInRequest, SignInResponse, SignUpRequest,
    VerifyCodeRequest,
};
use truefeedback_types::models::{Message, User};

use crate::error::FieldError;
use crate::{accept, auth, messages, suggest};

pub const DOCS_PATH: &str = "/api-docs";
pub const SPEC_PATH: &str = "/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TrueFeedback API",
        description = "Anonymous feedback and messaging platform API"
    ),
    paths(
        auth::sign_up,
        auth::verify_code,
        auth::sign_in,
        auth::check_username_unique,
        accept::get_accepting,
        accept::set_accepting,
        messages::send_message,
        messages::get_messages,
        messages::delete_message,
        suggest::suggest_messages,
        crate::health,
    ),
    components(schemas(
        ApiResponse,
        FieldError,
        User,
        Message,
        SignUpRequest,
        VerifyCodeRequest,
        SignInRequest,
        SignInResponse,
        AcceptMessagesRequest,
        AcceptingStatusResponse,
        AcceptMessagesResponse,
        SendMessageRequest,
        MessagesResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "Authentication", description = "Registration, verification and sign-in"),
        (name = "Messages", description = "Anonymous intake and inbox management"),
        (name = "User", description = "Account settings"),
        (name = "Utility", description = "Health, username checks and suggestions")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme the protected routes refer to.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new(DOCS_PATH).url(SPEC_PATH, ApiDoc::openapi())
}
