/*!
common/src/lib.rs

Shared configuration types and DB helper functions for newsdesk.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader that layers an optional override file over a default file
- A helper to initialize an SQLite connection pool
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/newsdesk.db")
    pub path: String,
}

/// HTTP server configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Display name shown in page headers
    #[serde(default = "default_title")]
    pub title: String,
    /// Directory holding the chat, feed and newsletter pages
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    /// How the assistant refers to the publication it collects items for
    #[serde(default = "default_newsletter")]
    pub newsletter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            title: default_title(),
            static_dir: default_static_dir(),
            newsletter: default_newsletter(),
        }
    }
}

/// Remote LLM config (used if `llm.adapter = "remote"`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

impl RemoteLlmConfig {
    pub fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .unwrap_or("https://openrouter.ai/api/v1/chat/completions")
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or("OPENROUTER_API_KEY")
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or("anthropic/claude-3-5-haiku-20241022")
    }
}

/// LLM top-level config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub adapter: Option<String>, // "remote", "none"
    pub remote: Option<RemoteLlmConfig>,
}

/// In-memory conversation session limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Turns kept per conversation before the middle is trimmed
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_idle_ttl_minutes")]
    pub idle_ttl_minutes: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            max_history: default_max_history(),
            idle_ttl_minutes: default_idle_ttl_minutes(),
        }
    }
}

/// Per-client request budget for the write endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
        }
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_title() -> String {
    "News Collector".to_string()
}

fn default_static_dir() -> String {
    "static".to_string()
}

fn default_newsletter() -> String {
    "the newsletter".to_string()
}

fn default_max_sessions() -> usize {
    500
}

fn default_max_history() -> usize {
    60
}

fn default_idle_ttl_minutes() -> u64 {
    12 * 60
}

fn default_max_requests() -> u32 {
    20
}

fn default_window_seconds() -> u64 {
    60
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for (path, label) in [(default_path, "default"), (override_path, "override")] {
            let Some(path) = path else { continue };
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {} config: {}", label, path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse {} configuration", label))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Remote LLM settings, if the remote adapter is selected (the default when `[llm]` is absent).
    pub fn remote_llm(&self) -> Option<RemoteLlmConfig> {
        let Some(llm) = self.llm.as_ref() else {
            return Some(RemoteLlmConfig::default());
        };
        match llm.adapter.as_deref().unwrap_or("remote") {
            "remote" => Some(llm.remote.clone().unwrap_or_default()),
            _ => None,
        }
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Initialize an SQLite connection pool.
///
/// This function will create the parent directory if necessary, ensure the DB file exists
/// (attempting to create it if missing), and return a configured `SqlitePool` in WAL mode
/// with at most 5 connections.
///
/// Example:
///   let pool = init_db_pool("data/newsdesk.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    // Surface filesystem permission or path problems here rather than via the first query.
    tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to create or open DB file: {}", path))?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}
