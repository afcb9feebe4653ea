use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::fs::FileServer;
use rocket::http::Status;
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::{catch, catchers, get, post, routes, Build, Request, Rocket, State};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use common::Config;

use crate::conversation::{prompt, Conversation};
use crate::error::Error;
use crate::feed;
use crate::ratelimit::RateLimiter;
use crate::sessions::SessionStore;
use crate::storage::{self, NewItem};

const RATE_LIMITED: &str = "Too many requests. Please slow down.";
const RETRY_REPLY: &str =
    "Sorry, I couldn't reach the assistant just now. Your message is kept, so please try sending it again.";
const SAVE_FAILED_REPLY: &str =
    "Sorry, something went wrong on our side. Nothing was saved, so please try again.";
const NOT_CONFIGURED_REPLY: &str =
    "The assistant isn't configured on this server yet, so chat is unavailable.";

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub db: SqlitePool,
    pub sessions: Arc<SessionStore>,
    /// None when no LLM provider could be configured; chat then answers 503.
    pub conversation: Option<Arc<Conversation>>,
    pub rate_limiter: Arc<RateLimiter>,
}

/// Response structure for `/api/status`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime_seconds: i64,
    item_count: i64,
    live_sessions: usize,
    assistant_configured: bool,
}

#[derive(Deserialize)]
struct ChatBody {
    session_id: String,
    /// Contributor's name; only the first non-empty value sticks
    #[serde(default)]
    name: Option<String>,
    message: String,
}

#[derive(Deserialize)]
struct ManualItemRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    entry: String,
    #[serde(default)]
    reason: String,
}

impl ManualItemRequest {
    /// Build the item, or a per-field map of what is missing
    fn into_item(self) -> Result<NewItem, BTreeMap<&'static str, &'static str>> {
        let mut errors = BTreeMap::new();
        let required = [
            ("name", &self.name, "Please enter your name."),
            ("url", &self.url, "Please enter a URL."),
            ("headline", &self.headline, "Please enter a headline."),
            ("entry", &self.entry, "Please enter the entry text."),
            ("reason", &self.reason, "Please enter a reason for adding this item."),
        ];
        for (field, value, message) in required {
            if value.trim().is_empty() {
                errors.insert(field, message);
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(NewItem {
            agreed_text: format!("**{}** {}", self.headline.trim(), self.entry.trim()),
            submitter_name: self.name,
            url: self.url,
            reason: self.reason,
        })
    }
}

fn client_key(ip: Option<IpAddr>) -> String {
    ip.map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Redirect root to the chat page
#[get("/")]
async fn index_redirect() -> Redirect {
    Redirect::to("/static/index.html")
}

#[get("/feed")]
async fn feed_page() -> Redirect {
    Redirect::to("/static/feed.html")
}

#[get("/newsletter")]
async fn newsletter_page() -> Redirect {
    Redirect::to("/static/newsletter.html")
}

#[get("/add-manual")]
async fn add_manual_page() -> Redirect {
    Redirect::to("/static/add_manual.html")
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

#[get("/api/status")]
async fn status(state: &State<AppState>) -> Result<Json<StatusResponse>, Status> {
    let item_count = storage::count_items(&state.db).await.map_err(|e| {
        tracing::error!("failed to count items: {}", e);
        Status::InternalServerError
    })?;

    Ok(Json(StatusResponse {
        status: "ok",
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        item_count,
        live_sessions: state.sessions.len().await,
        assistant_configured: state.conversation.is_some(),
    }))
}

/// Create a session and hand back the fixed opening greeting.
#[get("/api/new-session")]
async fn new_session(state: &State<AppState>) -> Json<Value> {
    let session = match &state.conversation {
        Some(conversation) => conversation.start_session().await,
        None => state.sessions.create(Some(prompt::GREETING)).await,
    };
    Json(json!({ "session_id": session.id, "greeting": prompt::GREETING }))
}

#[post("/api/chat", data = "<body>")]
async fn chat(
    state: &State<AppState>,
    client_ip: Option<IpAddr>,
    body: Json<ChatBody>,
) -> (Status, Json<Value>) {
    let client = client_key(client_ip);
    if !state.rate_limiter.check(&client).await {
        tracing::warn!(client = %client, "chat rate limit exceeded");
        return (Status::TooManyRequests, Json(json!({ "error": RATE_LIMITED })));
    }

    if body.session_id.trim().is_empty() {
        return (
            Status::BadRequest,
            Json(json!({ "error": "session_id cannot be empty." })),
        );
    }

    let Some(conversation) = &state.conversation else {
        return (
            Status::ServiceUnavailable,
            Json(json!({ "reply": NOT_CONFIGURED_REPLY, "finalized": false, "error": "no LLM provider" })),
        );
    };

    match conversation
        .handle_message(&body.session_id, body.name.as_deref(), &body.message)
        .await
    {
        Ok(reply) => (Status::Ok, Json(json!(reply))),
        Err(Error::Validation { field }) => (
            Status::BadRequest,
            Json(json!({ "error": format!("{} cannot be empty.", capitalize(field)) })),
        ),
        Err(e @ Error::ExternalService(_)) => (
            Status::BadGateway,
            Json(json!({ "reply": RETRY_REPLY, "finalized": false, "error": e.to_string() })),
        ),
        Err(e) => {
            tracing::error!(session_id = %body.session_id, "chat turn failed: {}", e);
            (
                Status::InternalServerError,
                Json(json!({ "reply": SAVE_FAILED_REPLY, "finalized": false, "error": e.to_string() })),
            )
        }
    }
}

/// Public projection as JSON: `{count, items}`; `reason` is never part of it.
#[get("/api/feed")]
async fn api_feed(state: &State<AppState>) -> Result<Json<Value>, Status> {
    let items = feed::render_feed(&state.db).await.map_err(|e| {
        tracing::error!("failed to load feed: {}", e);
        Status::InternalServerError
    })?;
    Ok(Json(json!({ "count": items.len(), "items": items })))
}

/// Save a hand-written item; the headline becomes the bold first sentence.
#[post("/api/add-manual", data = "<body>")]
async fn add_manual(
    state: &State<AppState>,
    client_ip: Option<IpAddr>,
    body: Json<ManualItemRequest>,
) -> (Status, Json<Value>) {
    if !state.rate_limiter.check(&client_key(client_ip)).await {
        return (Status::TooManyRequests, Json(json!({ "error": RATE_LIMITED })));
    }

    let item = match body.into_inner().into_item() {
        Ok(item) => item,
        Err(errors) => return (Status::UnprocessableEntity, Json(json!({ "detail": errors }))),
    };

    let saved = match storage::save_item(&state.db, item).await {
        Ok(item_id) => feed::entry(&state.db, item_id).await,
        Err(e) => Err(e),
    };

    match saved {
        Ok(entry) => (Status::Ok, Json(json!({ "ok": true, "saved_item": entry }))),
        Err(Error::Validation { field }) => (
            Status::UnprocessableEntity,
            Json(json!({ "detail": { field: format!("{} cannot be empty.", capitalize(field)) } })),
        ),
        Err(e) => {
            tracing::error!("manual item save failed: {}", e);
            (Status::InternalServerError, Json(json!({ "error": SAVE_FAILED_REPLY })))
        }
    }
}

#[catch(400)]
fn bad_request(_req: &Request) -> Json<Value> {
    Json(json!({ "error": "Malformed request." }))
}

/// Rocket answers 422 when a JSON body is missing fields or has the wrong types
#[catch(422)]
fn unprocessable(_req: &Request) -> Json<Value> {
    Json(json!({ "error": "Request body is missing required fields." }))
}

#[catch(500)]
fn internal_error(_req: &Request) -> Json<Value> {
    Json(json!({ "error": SAVE_FAILED_REPLY }))
}

fn capitalize(field: &str) -> String {
    let field = field.replace('_', " ");
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Assemble the Rocket instance with managed state and all routes mounted.
pub fn build_rocket(
    state: AppState,
    figment: rocket::figment::Figment,
    static_dir: Option<&str>,
) -> Rocket<Build> {
    let mut rocket = rocket::custom(figment)
        .manage(state)
        .register("/", catchers![bad_request, unprocessable, internal_error])
        .mount(
        "/",
        routes![
            index_redirect,
            feed_page,
            newsletter_page,
            add_manual_page,
            health,
            status,
            new_session,
            chat,
            api_feed,
            add_manual,
        ],
    );

    if let Some(dir) = static_dir {
        if Path::new(dir).is_dir() {
            rocket = rocket.mount("/static", FileServer::from(dir));
        } else {
            tracing::warn!(static_dir = %dir, "static directory not found; pages will 404");
        }
    }

    rocket
}

/// Build and launch the Rocket server, binding to `server.bind:server.port`.
///
/// Blocks until Rocket shuts down and returns an error if Rocket fails to start.
pub async fn launch_rocket(state: AppState, config: &Config) -> Result<()> {
    let figment = rocket::Config::figment()
        .merge(("address", config.server.bind.clone()))
        .merge(("port", config.server.port));

    let rocket = build_rocket(state, figment, Some(&config.server.static_dir));

    tracing::info!(
        bind = %config.server.bind,
        port = config.server.port,
        "Starting Rocket HTTP server"
    );
    rocket
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
