//! Conversation controller: one contributor message in, one assistant reply out.
//!
//! Each turn appends the contributor's text to the session, sends the trimmed history to
//! the model, and looks for a finalize block in the answer. An item is written only when
//! that block carries url, reason and agreed text and a submitter name is known. Anything
//! less keeps the conversation going.

pub mod prompt;
pub mod signal;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::feed::{self, FeedEntry};
use crate::llm::{LlmProvider, LlmRequest, Turn};
use crate::sessions::{Draft, Session, SessionStore};
use crate::storage::{self, NewItem};

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'()\[\]]+"#).unwrap());

/// Shown when the model's whole reply was the finalize block
const SAVED_FALLBACK: &str = "Saved. Would you like to add another item?";

#[derive(Debug, Clone)]
pub struct ConversationSettings {
    /// How the assistant refers to the publication
    pub newsletter: String,
    pub max_history: usize,
    /// Recent entries attached when a contributor asks about the feed
    pub feed_context_limit: i64,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            newsletter: "the newsletter".to_string(),
            max_history: 60,
            feed_context_limit: 15,
            max_tokens: None,
            temperature: None,
            timeout_seconds: None,
        }
    }
}

/// What the contributor gets back for one message
#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub reply: String,
    /// An item was saved on this turn
    pub finalized: bool,
    pub saved_item: Option<FeedEntry>,
    pub draft: Draft,
}

pub struct Conversation {
    sessions: Arc<SessionStore>,
    llm: Arc<dyn LlmProvider>,
    pool: SqlitePool,
    system_prompt: String,
    settings: ConversationSettings,
}

impl Conversation {
    pub fn new(
        sessions: Arc<SessionStore>,
        llm: Arc<dyn LlmProvider>,
        pool: SqlitePool,
        settings: ConversationSettings,
    ) -> Self {
        Self {
            sessions,
            llm,
            pool,
            system_prompt: prompt::build_system_prompt(&settings.newsletter),
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// New session seeded with the fixed greeting
    pub async fn start_session(&self) -> Session {
        let session = self.sessions.create(Some(prompt::GREETING)).await;
        info!(session_id = %session.id, "conversation started");
        session
    }

    pub async fn handle_message(
        &self,
        session_id: &str,
        submitter_name: Option<&str>,
        user_text: &str,
    ) -> Result<AssistantReply> {
        let text = user_text.trim();
        if text.is_empty() {
            return Err(Error::Validation { field: "message" });
        }

        self.sessions.get_or_create(session_id).await;
        if let Some(name) = submitter_name {
            self.sessions.set_name(session_id, name).await;
        }
        self.sessions.append_turn(session_id, Turn::user(text)).await;

        let mut session = self.sessions.get_or_create(session_id).await;
        if session.draft.url.is_none() {
            if let Some(url) = first_url(text) {
                session.draft = self
                    .sessions
                    .update_draft(
                        session_id,
                        Draft {
                            url: Some(url),
                            ..Draft::default()
                        },
                    )
                    .await;
            }
        }

        let request = self.build_request(&session, text).await;

        info!(session_id = %session_id, turns = request.turns.len(), "calling assistant");
        let response = self.llm.complete(request).await.map_err(|e| {
            let message = format!("{:#}", e);
            warn!(session_id = %session_id, error = %message, "assistant call failed");
            Error::ExternalService(message)
        })?;

        if response.content.trim().is_empty() {
            warn!(session_id = %session_id, "assistant returned an empty reply");
            return Err(Error::ExternalService("the assistant returned an empty reply".into()));
        }

        let parsed = signal::parse_reply(&signal::strip_dashes(&response.content));

        let mut saved_item = None;
        if let Some(signal) = parsed.signal {
            saved_item = self.finalize(&session, signal).await?;
        }

        let finalized = saved_item.is_some();
        let reply = if parsed.text.is_empty() && finalized {
            SAVED_FALLBACK.to_string()
        } else {
            parsed.text
        };

        self.sessions
            .append_turn(session_id, Turn::assistant(reply.as_str()))
            .await;
        let draft = self.sessions.get_or_create(session_id).await.draft;

        info!(
            session_id = %session_id,
            finalized,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "assistant replied"
        );

        Ok(AssistantReply {
            reply,
            finalized,
            saved_item,
            draft,
        })
    }

    async fn build_request(&self, session: &Session, text: &str) -> LlmRequest {
        let mut turns = session.history_window(self.settings.max_history);

        if prompt::wants_feed(text) {
            match feed::recent_entries(&self.pool, self.settings.feed_context_limit).await {
                Ok(entries) => {
                    if let Some(last) = turns.last_mut() {
                        last.content.push_str("\n\n");
                        last.content.push_str(&prompt::feed_note(&entries));
                    }
                }
                Err(e) => warn!(error = %e, "could not load feed context"),
            }
        }

        let mut system = self.system_prompt.clone();
        if let Some(name) = &session.submitter_name {
            system.push_str("\n\n");
            system.push_str(&prompt::contributor_note(name));
        }

        LlmRequest {
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            timeout_seconds: self.settings.timeout_seconds,
            ..LlmRequest::new(system, turns)
        }
    }

    /// Persist the item a finalize block describes, or fold it into the draft when it
    /// is not complete. Never saves a partial item.
    async fn finalize(
        &self,
        session: &Session,
        signal: signal::SaveSignal,
    ) -> Result<Option<FeedEntry>> {
        let submitter = match (&session.submitter_name, &signal.name) {
            (Some(name), _) => Some(name.clone()),
            (None, Some(name)) => self.sessions.set_name(&session.id, name).await,
            (None, None) => None,
        };

        let submitter = match submitter {
            Some(name) if signal.is_complete() => name,
            _ => {
                debug!(session_id = %session.id, "incomplete finalize block, conversation continues");
                self.sessions.update_draft(&session.id, signal.as_draft()).await;
                return Ok(None);
            }
        };

        let draft = signal.as_draft();
        let item = NewItem {
            submitter_name: submitter,
            url: signal.url.unwrap_or_default(),
            reason: signal.reason.unwrap_or_default(),
            agreed_text: signal.agreed_text.unwrap_or_default(),
        };

        match storage::save_item(&self.pool, item).await {
            Ok(item_id) => {
                self.sessions.reset_draft(&session.id).await;
                feed::entry(&self.pool, item_id).await
            }
            Err(Error::Validation { field }) => {
                debug!(session_id = %session.id, field, "finalize block rejected by validation");
                self.sessions.update_draft(&session.id, draft).await;
                Ok(None)
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "failed to save news item");
                Err(e)
            }
        }
    }
}

/// First well-formed http(s) URL in a message, trailing punctuation removed
pub fn first_url(text: &str) -> Option<String> {
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(&['.', ',', ';', ':', '!', '?'][..]))
        .find(|candidate| {
            url::Url::parse(candidate)
                .map(|u| u.host_str().is_some())
                .unwrap_or(false)
        })
        .map(str::to_string)
}
