mod admin;
mod analytics;
mod chat;
mod config;
mod db;
mod email;
mod errors;
mod forms;
mod llm_client;
mod models;
mod roi;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::chat::responder::{ChatResponder, KeywordResponder, LlmResponder};
use crate::config::Config;
use crate::db::create_pool;
use crate::email::build_mailer;
use crate::forms::recaptcha::RecaptchaVerifier;
use crate::llm_client::LlmClient;
use crate::roi::verification::{MemoryCodeStore, RedisCodeStore, VerificationStore};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting site API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;

    let mailer = build_mailer(&config).await?;

    let captcha = RecaptchaVerifier::new(config.recaptcha_secret.clone(), config.recaptcha_min_score)
        .context("Failed to build reCAPTCHA client")?;
    if !captcha.is_enabled() {
        warn!("RECAPTCHA_SECRET not set; form submissions are not bot-checked");
    }

    // Chat answers come from the knowledge base; the LLM only phrases them.
    let responder: Arc<dyn ChatResponder> = match &config.anthropic_api_key {
        Some(key) => {
            let llm = LlmClient::new(key.clone(), config.llm_model.clone())
                .context("Failed to build LLM client")?;
            info!("LLM client initialized (model: {})", llm.model());
            Arc::new(LlmResponder::new(llm))
        }
        None => {
            info!("ANTHROPIC_API_KEY not set; chat uses knowledge-base replies only");
            Arc::new(KeywordResponder)
        }
    };
    info!("Chat responder: {}", responder.name());

    let codes: Arc<dyn VerificationStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisCodeStore::new(url).map_err(|e| anyhow::anyhow!("Invalid REDIS_URL: {e}"))?,
        ),
        None => Arc::new(MemoryCodeStore::default()),
    };
    info!("Verification codes stored in {}", codes.backend());

    admin::users::bootstrap_admin(&db, &config).await?;

    let cors = build_cors(config.site_origin.as_deref())?;

    // Build app state
    let state = AppState {
        db,
        config: config.clone(),
        mailer,
        captcha,
        responder,
        codes,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Credentialed CORS for the site origin; permissive for local development.
fn build_cors(site_origin: Option<&str>) -> Result<CorsLayer> {
    let Some(origin) = site_origin else {
        warn!("SITE_ORIGIN not set; CORS is permissive");
        return Ok(CorsLayer::permissive());
    };
    let origin: HeaderValue = origin
        .parse()
        .context("SITE_ORIGIN must be a valid origin, e.g. https://example.com")?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true))
}
