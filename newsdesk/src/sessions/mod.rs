//! In-memory conversation sessions.
//!
//! A session lives only as long as the process. It is never the source of truth for a
//! saved item: once the controller persists an item the draft is reset and the
//! conversation may carry on with a new one.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::llm::Turn;

/// Fields collected so far for the item under discussion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub url: Option<String>,
    pub reason: Option<String>,
    pub blurb: Option<String>,
}

impl Draft {
    /// Overwrite the fields that `update` carries, leave the rest alone.
    pub fn merge(&mut self, update: Draft) {
        if update.url.is_some() {
            self.url = update.url;
        }
        if update.reason.is_some() {
            self.reason = update.reason;
        }
        if update.blurb.is_some() {
            self.blurb = update.blurb;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.reason.is_none() && self.blurb.is_none()
    }
}

/// Session represents one contributor's conversation
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    /// Set once, never changed afterwards
    pub submitter_name: Option<String>,
    pub turns: Vec<Turn>,
    pub draft: Draft,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            submitter_name: None,
            turns: Vec::new(),
            draft: Draft::default(),
            created_at: now,
            last_seen: now,
        }
    }

    /// The turns to send to the model: the opening turn plus the most recent tail.
    pub fn history_window(&self, max_history: usize) -> Vec<Turn> {
        trim_history(&self.turns, max_history)
    }
}

/// Keep at most `max` turns, retaining the first one (usually the greeting) when there is
/// room for it next to the latest turn. `max == 0` means unlimited.
pub fn trim_history(turns: &[Turn], max: usize) -> Vec<Turn> {
    if max == 0 || turns.len() <= max {
        return turns.to_vec();
    }
    if max == 1 {
        return turns[turns.len() - 1..].to_vec();
    }
    let mut kept = Vec::with_capacity(max);
    kept.push(turns[0].clone());
    kept.extend_from_slice(&turns[turns.len() - (max - 1)..]);
    kept
}

#[derive(Debug, Clone)]
pub struct SessionLimits {
    pub max_sessions: usize,
    pub max_history: usize,
    pub idle_ttl: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions: 500,
            max_history: 60,
            idle_ttl: Duration::hours(12),
        }
    }
}

impl From<&common::SessionsConfig> for SessionLimits {
    fn from(cfg: &common::SessionsConfig) -> Self {
        Self {
            max_sessions: cfg.max_sessions.max(1),
            max_history: cfg.max_history,
            idle_ttl: i64::try_from(cfg.idle_ttl_minutes)
                .ok()
                .and_then(Duration::try_minutes)
                .unwrap_or_else(|| SessionLimits::default().idle_ttl),
        }
    }
}

/// Process-local session store keyed by an opaque token.
///
/// Unknown ids are never an error for the mutating operations: a lost session is
/// recreated empty and the contributor is simply greeted again.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    limits: SessionLimits,
}

impl SessionStore {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            limits,
        }
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    /// Create a session under a fresh random id, optionally seeded with an assistant greeting
    pub async fn create(&self, greeting: Option<&str>) -> Session {
        let id = uuid::Uuid::new_v4().to_string();
        let mut sessions = self.sessions.lock().await;
        let session = self.entry(&mut sessions, &id);
        if let Some(greeting) = greeting {
            session.turns.push(Turn::assistant(greeting));
        }
        session.clone()
    }

    /// Look a session up without creating it
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))
    }

    pub async fn get_or_create(&self, session_id: &str) -> Session {
        let mut sessions = self.sessions.lock().await;
        let session = self.entry(&mut sessions, session_id);
        session.last_seen = Utc::now();
        session.clone()
    }

    /// Record the contributor's name unless one is already set.
    /// Returns the name the session ends up with.
    pub async fn set_name(&self, session_id: &str, name: &str) -> Option<String> {
        let mut sessions = self.sessions.lock().await;
        let session = self.entry(&mut sessions, session_id);
        let name = name.trim();
        if session.submitter_name.is_none() && !name.is_empty() {
            debug!(session_id = %session_id, "contributor name recorded");
            session.submitter_name = Some(name.to_string());
        }
        session.submitter_name.clone()
    }

    pub async fn append_turn(&self, session_id: &str, turn: Turn) {
        let mut sessions = self.sessions.lock().await;
        let session = self.entry(&mut sessions, session_id);
        session.turns.push(turn);
        if self.limits.max_history > 0 && session.turns.len() > self.limits.max_history {
            session.turns = trim_history(&session.turns, self.limits.max_history);
        }
        session.last_seen = Utc::now();
    }

    /// Merge the given fields into the session's working draft
    pub async fn update_draft(&self, session_id: &str, fields: Draft) -> Draft {
        let mut sessions = self.sessions.lock().await;
        let session = self.entry(&mut sessions, session_id);
        session.draft.merge(fields);
        session.draft.clone()
    }

    /// Start a fresh draft while keeping the name and conversation
    pub async fn reset_draft(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.draft = Draft::default();
        }
    }

    /// Drop a session entirely. Returns whether it existed.
    pub async fn clear(&self, session_id: &str) -> bool {
        self.sessions.lock().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }


    /// Fetch or insert, applying the eviction policy before any insert.
    fn entry<'a>(
        &self,
        sessions: &'a mut HashMap<String, Session>,
        session_id: &str,
    ) -> &'a mut Session {
        if !sessions.contains_key(session_id) {
            evict_idle_at(sessions, Utc::now(), self.limits.idle_ttl);
            evict_to_capacity(sessions, self.limits.max_sessions);
            debug!(session_id = %session_id, "session created");
        }
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id.to_string()))
    }
}

fn evict_idle_at(sessions: &mut HashMap<String, Session>, now: DateTime<Utc>, ttl: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, s| now - s.last_seen <= ttl);
    let evicted = before - sessions.len();
    if evicted > 0 {
        info!(evicted, "evicted idle sessions");
    }
    evicted
}

/// Make room for one more session by dropping the least recently used tenth.
fn evict_to_capacity(sessions: &mut HashMap<String, Session>, max_sessions: usize) {
    if sessions.len() < max_sessions {
        return;
    }
    let mut by_age: Vec<(DateTime<Utc>, String)> = sessions
        .values()
        .map(|s| (s.last_seen, s.id.clone()))
        .collect();
    by_age.sort();

    let count = (max_sessions / 10).max(1).max(sessions.len() + 1 - max_sessions);
    for (_, id) in by_age.into_iter().take(count) {
        sessions.remove(&id);
    }
    info!(evicted = count, "session store at capacity, evicted oldest sessions");
}
