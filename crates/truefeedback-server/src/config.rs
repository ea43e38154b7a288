use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Longest session token lifetime accepted at startup.
const MAX_SESSION_DAYS: i64 = 3650;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub session_days: i64,
    pub mail: MailConfig,
    pub suggestions: SuggestionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailConfig {
    Log,
    Resend {
        api_url: String,
        api_key: String,
        from: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionConfig {
    Presets,
    OpenAi {
        api_url: String,
        api_key: String,
        model: String,
    },
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key → value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = get("TRUEFEEDBACK_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("TRUEFEEDBACK_JWT_SECRET is unset or still a placeholder");
        }

        let port: u16 = get_or("TRUEFEEDBACK_PORT", "3000")
            .parse()
            .context("TRUEFEEDBACK_PORT must be a port number")?;
        let session_days: i64 = get_or("TRUEFEEDBACK_SESSION_DAYS", "30")
            .parse()
            .context("TRUEFEEDBACK_SESSION_DAYS must be an integer")?;
        if !(1..=MAX_SESSION_DAYS).contains(&session_days) {
            bail!("TRUEFEEDBACK_SESSION_DAYS must be between 1 and {}", MAX_SESSION_DAYS);
        }

        let mail = match get("RESEND_API_KEY") {
            Some(api_key) => MailConfig::Resend {
                api_url: get_or("RESEND_API_URL", "https://api.resend.com/emails"),
                api_key,
                from: get_or("TRUEFEEDBACK_MAIL_FROM", "TrueFeedback <onboarding@resend.dev>"),
            },
            None => MailConfig::Log,
        };

        let suggestions = match get("OPENAI_API_KEY") {
            Some(api_key) => SuggestionConfig::OpenAi {
                api_url: get_or("OPENAI_API_URL", "https://api.openai.com/v1/chat/completions"),
                api_key,
                model: get_or("OPENAI_MODEL", "gpt-4o-mini"),
            },
            None => SuggestionConfig::Presets,
        };

        Ok(Self {
            host: get_or("TRUEFEEDBACK_HOST", "0.0.0.0"),
            port,
            db_path: get_or("TRUEFEEDBACK_DB_PATH", "truefeedback.db").into(),
            jwt_secret,
            session_days,
            mail,
            suggestions,
        })
    }
}
