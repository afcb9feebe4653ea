//! Public projection of saved items.
//!
//! The private `reason` column is never selected here, so nothing built from a
//! [`FeedEntry`] can leak it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::storage::parse_timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    pub id: i64,
    pub submitter_name: String,
    pub url: String,
    pub agreed_text: String,
    pub created_at: DateTime<Utc>,
}

/// All public entries, oldest first
pub async fn render_feed(pool: &SqlitePool) -> Result<Vec<FeedEntry>> {
    let rows = sqlx::query_as::<_, FeedRow>(
        r#"
        SELECT id, submitter_name, url, agreed_text, created_at
        FROM news_items
        ORDER BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(FeedEntry::try_from).collect()
}

/// The `limit` most recent public entries, newest first
pub async fn recent_entries(pool: &SqlitePool, limit: i64) -> Result<Vec<FeedEntry>> {
    let rows = sqlx::query_as::<_, FeedRow>(
        r#"
        SELECT id, submitter_name, url, agreed_text, created_at
        FROM news_items
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(FeedEntry::try_from).collect()
}

/// A single public entry
pub async fn entry(pool: &SqlitePool, item_id: i64) -> Result<Option<FeedEntry>> {
    let row = sqlx::query_as::<_, FeedRow>(
        "SELECT id, submitter_name, url, agreed_text, created_at FROM news_items WHERE id = ?",
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await?;

    row.map(FeedEntry::try_from).transpose()
}

#[derive(sqlx::FromRow)]
struct FeedRow {
    id: i64,
    submitter_name: String,
    url: String,
    agreed_text: String,
    created_at: String,
}

impl TryFrom<FeedRow> for FeedEntry {
    type Error = crate::error::Error;

    fn try_from(row: FeedRow) -> Result<Self> {
        Ok(FeedEntry {
            id: row.id,
            submitter_name: row.submitter_name,
            url: row.url,
            agreed_text: row.agreed_text,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
