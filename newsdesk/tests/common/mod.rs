#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use newsdesk::conversation::{Conversation, ConversationSettings};
use newsdesk::llm::{LlmProvider, LlmRequest, LlmResponse, UsageMetadata};
use newsdesk::sessions::{SessionLimits, SessionStore};
use newsdesk::storage;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// In-memory store with the schema applied. One connection, so every query sees the same DB.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    storage::ensure_schema(&pool).await.expect("ensure schema");
    pool
}

/// Provider double that answers from a queue and remembers what it was asked.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn fail(&self, message: &str) {
        self.replies.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
        self.requests.lock().unwrap().push(request);
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted reply left".to_string()));

        match next {
            Ok(content) => Ok(LlmResponse {
                content,
                usage: UsageMetadata::default(),
                model: "scripted".to_string(),
            }),
            Err(message) => Err(anyhow::anyhow!(message)),
        }
    }
}

pub struct Harness {
    pub pool: SqlitePool,
    pub sessions: Arc<SessionStore>,
    pub llm: Arc<ScriptedLlm>,
    pub conversation: Arc<Conversation>,
}

pub async fn harness() -> Harness {
    let pool = memory_pool().await;
    let sessions = Arc::new(SessionStore::new(SessionLimits::default()));
    let llm = ScriptedLlm::new();
    let conversation = Arc::new(Conversation::new(
        sessions.clone(),
        llm.clone(),
        pool.clone(),
        ConversationSettings::default(),
    ));
    Harness {
        pool,
        sessions,
        llm,
        conversation,
    }
}

pub fn save_block(name: &str, url: &str, reason: &str, agreed_text: &str) -> String {
    format!(
        "<SAVE_ITEM>\n<name>{}</name>\n<url>{}</url>\n<reason>{}</reason>\n<agreed_text>{}</agreed_text>\n</SAVE_ITEM>",
        name, url, reason, agreed_text
    )
}
