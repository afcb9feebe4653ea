mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{harness, save_block, Harness};
use newsdesk::ratelimit::RateLimiter;
use newsdesk::server::{build_rocket, AppState};
use newsdesk::storage;
use rocket::http::Status;
use rocket::local::asynchronous::Client;
use serde_json::{json, Value};

async fn client_for(h: &Harness, limiter: RateLimiter) -> Client {
    let state = AppState {
        started_at: Utc::now(),
        db: h.pool.clone(),
        sessions: h.sessions.clone(),
        conversation: Some(h.conversation.clone()),
        rate_limiter: Arc::new(limiter),
    };
    Client::tracked(build_rocket(state, rocket::Config::figment(), None))
        .await
        .expect("valid rocket instance")
}

fn generous() -> RateLimiter {
    RateLimiter::new(100, Duration::from_secs(60))
}

#[tokio::test]
async fn new_session_returns_id_and_greeting() {
    let h = harness().await;
    let client = client_for(&h, generous()).await;

    let response = client.get("/api/new-session").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("json body");

    let session_id = body["session_id"].as_str().expect("session id");
    assert!(body["greeting"].as_str().unwrap().starts_with("Welcome"));
    assert_eq!(h.sessions.get(session_id).await.unwrap().turns.len(), 1);
}

#[tokio::test]
async fn chat_turn_that_finalizes_shows_up_in_the_feed() {
    let h = harness().await;
    let client = client_for(&h, generous()).await;
    h.llm.reply(&format!(
        "Saved!\n{}",
        save_block("Alice", "https://example.com/story", "Private reason", "A short blurb.")
    ));

    let response = client
        .post("/api/chat")
        .json(&json!({ "session_id": "s-1", "name": "Alice", "message": "save it" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["finalized"], true);
    assert_eq!(body["reply"], "Saved!");
    assert_eq!(body["saved_item"]["submitter_name"], "Alice");
    assert!(body["saved_item"].get("reason").is_none());

    let feed: Value = client
        .get("/api/feed")
        .dispatch()
        .await
        .into_json()
        .await
        .unwrap();
    assert_eq!(feed["count"], 1);
    assert_eq!(feed["items"][0]["url"], "https://example.com/story");
    assert!(!feed.to_string().contains("Private reason"));
}

#[tokio::test]
async fn chat_reports_provider_failure_as_bad_gateway() {
    let h = harness().await;
    let client = client_for(&h, generous()).await;
    h.llm.fail("LLM API error 500");

    let response = client
        .post("/api/chat")
        .json(&json!({ "session_id": "s-2", "message": "hello" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadGateway);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["finalized"], false);
    assert!(!body["reply"].as_str().unwrap().is_empty());
    assert_eq!(storage::count_items(&h.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn chat_rejects_empty_message() {
    let h = harness().await;
    let client = client_for(&h, generous()).await;

    let response = client
        .post("/api/chat")
        .json(&json!({ "session_id": "s-3", "message": "  " }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["error"], "Message cannot be empty.");
}

#[tokio::test]
async fn malformed_chat_bodies_get_json_errors() {
    let h = harness().await;
    let client = client_for(&h, generous()).await;

    let missing = client
        .post("/api/chat")
        .json(&json!({ "session_id": "s-6" }))
        .dispatch()
        .await;
    assert_eq!(missing.status(), Status::UnprocessableEntity);
    let body: Value = missing.into_json().await.expect("json error body");
    assert!(body["error"].is_string());

    let garbage = client
        .post("/api/chat")
        .header(rocket::http::ContentType::JSON)
        .body("{not json")
        .dispatch()
        .await;
    assert!(garbage.status().code >= 400 && garbage.status().code < 500);
    let body: Value = garbage.into_json().await.expect("json error body");
    assert!(body["error"].is_string());
    assert!(h.llm.requests().is_empty());
}

#[tokio::test]
async fn chat_is_rate_limited_per_client() {
    let h = harness().await;
    let client = client_for(&h, RateLimiter::new(1, Duration::from_secs(60))).await;
    h.llm.reply("Hi! What's your name?");

    let first = client
        .post("/api/chat")
        .json(&json!({ "session_id": "s-4", "message": "hello" }))
        .dispatch()
        .await;
    assert_eq!(first.status(), Status::Ok);

    let second = client
        .post("/api/chat")
        .json(&json!({ "session_id": "s-4", "message": "hello again" }))
        .dispatch()
        .await;
    assert_eq!(second.status(), Status::TooManyRequests);
    assert_eq!(h.llm.requests().len(), 1);
}

#[tokio::test]
async fn chat_without_provider_is_unavailable() {
    let h = harness().await;
    let state = AppState {
        started_at: Utc::now(),
        db: h.pool.clone(),
        sessions: h.sessions.clone(),
        conversation: None,
        rate_limiter: Arc::new(generous()),
    };
    let client = Client::tracked(build_rocket(state, rocket::Config::figment(), None))
        .await
        .unwrap();

    let response = client
        .post("/api/chat")
        .json(&json!({ "session_id": "s-5", "message": "hello" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::ServiceUnavailable);
}

#[tokio::test]
async fn manual_add_reports_missing_fields() {
    let h = harness().await;
    let client = client_for(&h, generous()).await;

    let response = client
        .post("/api/add-manual")
        .json(&json!({ "name": "Alice", "url": "https://example.com", "headline": "" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::UnprocessableEntity);
    let body: Value = response.into_json().await.unwrap();
    let detail = body["detail"].as_object().unwrap();
    let mut fields: Vec<&str> = detail.keys().map(String::as_str).collect();
    fields.sort();
    assert_eq!(fields, ["entry", "headline", "reason"]);
    assert_eq!(storage::count_items(&h.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn manual_add_saves_headline_as_bold_lead() {
    let h = harness().await;
    let client = client_for(&h, generous()).await;

    let response = client
        .post("/api/add-manual")
        .json(&json!({
            "name": "Bob",
            "url": "https://example.com/trees",
            "headline": "Trees cool cities.",
            "entry": "A study of 40 streets found a 3C drop.",
            "reason": "Relevant to the urban team"
        }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(
        body["saved_item"]["agreed_text"],
        "**Trees cool cities.** A study of 40 streets found a 3C drop."
    );

    let items = storage::list_items(&h.pool).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].reason, "Relevant to the urban team");
}

#[tokio::test]
async fn status_and_pages() {
    let h = harness().await;
    let client = client_for(&h, generous()).await;

    let status: Value = client
        .get("/api/status")
        .dispatch()
        .await
        .into_json()
        .await
        .unwrap();
    assert_eq!(status["status"], "ok");
    assert_eq!(status["item_count"], 0);
    assert_eq!(status["assistant_configured"], true);

    assert_eq!(client.get("/health").dispatch().await.status(), Status::Ok);

    let root = client.get("/").dispatch().await;
    assert_eq!(root.status(), Status::SeeOther);
    assert_eq!(root.headers().get_one("Location"), Some("/static/index.html"));

    let feed = client.get("/feed").dispatch().await;
    assert_eq!(feed.headers().get_one("Location"), Some("/static/feed.html"));
}
