mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use truefeedback_api::auth::{AppState, AppStateInner};
use truefeedback_api::mailer::Mailer;
use truefeedback_api::suggest::SuggestionProvider;

use crate::config::{Config, MailConfig, SuggestionConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "truefeedback=debug,truefeedback_api=debug,truefeedback_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = truefeedback_db::Database::open(&config.db_path)?;

    let mailer = match config.mail {
        MailConfig::Resend { api_url, api_key, from } => {
            info!("Verification mail via Resend ({})", api_url);
            Mailer::resend(api_url, api_key, from)
        }
        MailConfig::Log => {
            warn!("RESEND_API_KEY not set, verification codes will only be logged");
            Mailer::Log
        }
    };

    let suggestions = match config.suggestions {
        SuggestionConfig::OpenAi { api_url, api_key, model } => {
            info!("Message suggestions via {} ({})", model, api_url);
            SuggestionProvider::open_ai(api_url, api_key, model)
        }
        SuggestionConfig::Presets => SuggestionProvider::Presets,
    };

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret,
        session_days: config.session_days,
        mailer,
        suggestions,
    });

    let app = truefeedback_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("TrueFeedback server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
