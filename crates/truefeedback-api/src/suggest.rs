use anyhow::{Context, Result, anyhow};
use axum::{extract::State, http::header, response::IntoResponse};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use truefeedback_types::api::ApiResponse;
use truefeedback_types::suggestions::{self, PRESETS};

use crate::auth::AppState;
use crate::error::ApiError;

const PROMPT: &str = "Create a list of three open-ended and engaging questions formatted as a \
    single string. Each question should be separated by '||'. These questions are for an \
    anonymous social messaging platform and should be suitable for a diverse audience. Avoid \
    personal or sensitive topics, focusing instead on universal themes that encourage friendly \
    interaction. Reply with the string only.";

/// Source of message prompt suggestions.
#[derive(Clone)]
pub enum SuggestionProvider {
    /// Rotate through the built-in prompt sets.
    Presets,
    /// OpenAI-compatible chat completions endpoint.
    OpenAi {
        client: reqwest::Client,
        api_url: String,
        api_key: String,
        model: String,
    },
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

impl SuggestionProvider {
    pub fn open_ai(api_url: String, api_key: String, model: String) -> Self {
        SuggestionProvider::OpenAi {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            model,
        }
    }

    /// Exactly three prompts, or an error.
    pub async fn suggest(&self) -> Result<Vec<String>> {
        match self {
            SuggestionProvider::Presets => {
                let idx = rand::rng().random_range(0..PRESETS.len());
                Ok(PRESETS[idx].iter().map(|p| p.to_string()).collect())
            }
            SuggestionProvider::OpenAi {
                client,
                api_url,
                api_key,
                model,
            } => {
                let request = ChatRequest {
                    model,
                    messages: [ChatMessage {
                        role: "user",
                        content: PROMPT,
                    }],
                    max_tokens: 300,
                };

                let resp = client
                    .post(api_url.as_str())
                    .bearer_auth(api_key)
                    .json(&request)
                    .send()
                    .await?
                    .error_for_status()?;

                let body: ChatResponse = resp.json().await.context("decoding completion")?;
                let raw = body
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| anyhow!("completion had no choices"))?;
                debug!(%raw, "Suggestion provider replied");

                suggestions::parse(&raw)
                    .ok_or_else(|| anyhow!("provider reply is not three '||'-separated prompts"))
            }
        }
    }
}

/// POST /suggest-messages: three prompts as `text/plain`, joined by `||`.
#[utoipa::path(
    post,
    path = "/suggest-messages",
    tag = "Utility",
    responses(
        (status = 200, description = "Three prompts joined by `||`", body = String, content_type = "text/plain"),
        (status = 500, description = "Failed to generate suggestions", body = ApiResponse)
    )
)]
pub async fn suggest_messages(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let prompts = state.suggestions.suggest().await.map_err(|e| {
        error!("Suggestion provider failed: {:#}", e);
        ApiError::Internal("Failed to generate suggestions".into())
    })?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        suggestions::join(&prompts),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn presets_yield_three_prompts() {
        for _ in 0..20 {
            let prompts = SuggestionProvider::Presets.suggest().await.unwrap();
            assert_eq!(prompts.len(), 3);
            assert!(PRESETS.iter().any(|set| prompts == *set));
        }
    }

    #[tokio::test]
    async fn unreachable_provider_is_an_error() {
        let provider = SuggestionProvider::open_ai(
            "http://127.0.0.1:9/v1/chat/completions".into(),
            "key".into(),
            "model".into(),
        );
        assert!(provider.suggest().await.is_err());
    }
}
