/*
newsdesk - single-binary main.rs
This binary loads configuration, prepares the item store and starts the Rocket HTTP server
that hosts the contributor chat, the feed and the JSON API.
*/

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use common::{init_db_pool, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use newsdesk::conversation::{Conversation, ConversationSettings};
use newsdesk::llm::remote::RemoteLlmProvider;
use newsdesk::llm::LlmProvider;
use newsdesk::ratelimit::RateLimiter;
use newsdesk::server::{launch_rocket, AppState};
use newsdesk::sessions::{SessionLimits, SessionStore};
use newsdesk::storage;

#[derive(Parser, Debug)]
#[command(name = "newsdesk", about = "Newsletter item collector: chat server + feed")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() {
            Some(p)
        } else {
            None
        }
    };

    let config = Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    .map_err(|e| {
        error!("failed to load configuration: {:#}", e);
        e
    })?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    // Resolve and log the absolute DB path before connecting
    let db_path_abs = match tokio::fs::canonicalize(&config.database.path).await {
        Ok(p) => p.to_string_lossy().to_string(),
        Err(_) => config.database.path.clone(),
    };
    info!(db_path = %db_path_abs, "resolved DB path");

    let db_pool = init_db_pool(&db_path_abs).await.map_err(|e| {
        error!(db_path = %db_path_abs, "failed to initialize database pool: {:#}", e);
        e
    })?;
    storage::ensure_schema(&db_pool)
        .await
        .context("failed to ensure database schema")?;

    let sessions = Arc::new(SessionStore::new(SessionLimits::from(&config.sessions)));

    let conversation = match create_llm_provider(&config) {
        Ok(provider) => {
            let remote = config.remote_llm().unwrap_or_default();
            let settings = ConversationSettings {
                newsletter: config.server.newsletter.clone(),
                max_history: config.sessions.max_history,
                max_tokens: remote.max_tokens,
                temperature: remote.temperature,
                timeout_seconds: remote.timeout_seconds,
                ..ConversationSettings::default()
            };
            Some(Arc::new(Conversation::new(
                sessions.clone(),
                provider,
                db_pool.clone(),
                settings,
            )))
        }
        Err(e) => {
            warn!("chat disabled, no LLM provider: {:#}", e);
            None
        }
    };

    let state = AppState {
        started_at: Utc::now(),
        db: db_pool,
        sessions,
        conversation,
        rate_limiter: Arc::new(RateLimiter::from(&config.rate_limit)),
    };

    info!("Launching Rocket HTTP server");
    launch_rocket(state, &config).await?;

    info!("Shutdown complete");
    Ok(())
}

/// Create the chat-completion provider selected by `[llm]`.
fn create_llm_provider(config: &Config) -> Result<Arc<dyn LlmProvider>> {
    let remote = config
        .remote_llm()
        .ok_or_else(|| anyhow::anyhow!("no remote [llm] adapter configured"))?;

    let api_key_env = remote.api_key_env();
    let api_key = std::env::var(api_key_env)
        .with_context(|| format!("LLM API key env var '{}' not set", api_key_env))?;

    let provider = RemoteLlmProvider::new(remote.api_url(), api_key, remote.model())
        .with_defaults(
            remote.timeout_seconds.unwrap_or(60),
            remote.max_tokens.unwrap_or(1024),
            remote.temperature.unwrap_or(0.7),
        )
        .with_app_title(config.server.title.clone());

    info!(model = %provider.model(), api_url = %remote.api_url(), "LLM provider initialized");
    Ok(Arc::new(provider))
}
