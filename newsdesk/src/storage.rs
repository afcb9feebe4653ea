//! Append-only store of finalised newsletter items.
//!
//! Items are written once and never updated or deleted. Every text field is validated
//! before the INSERT is attempted, and the schema repeats the check so no code path can
//! land an empty field.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{Error, Result};

/// A persisted newsletter entry, private `reason` included.
#[derive(Debug, Clone, Serialize)]
pub struct NewsItem {
    pub id: i64,
    pub submitter_name: String,
    pub url: String,
    pub reason: String,
    pub agreed_text: String,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create an item
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub submitter_name: String,
    pub url: String,
    pub reason: String,
    pub agreed_text: String,
}

impl NewItem {
    /// Trim every field and reject the item if any of them ends up empty.
    pub fn validated(self) -> Result<NewItem> {
        let item = NewItem {
            submitter_name: self.submitter_name.trim().to_string(),
            url: self.url.trim().to_string(),
            reason: self.reason.trim().to_string(),
            agreed_text: self.agreed_text.trim().to_string(),
        };
        for (field, value) in [
            ("submitter_name", &item.submitter_name),
            ("url", &item.url),
            ("reason", &item.reason),
            ("agreed_text", &item.agreed_text),
        ] {
            if value.is_empty() {
                return Err(Error::Validation { field });
            }
        }
        Ok(item)
    }
}

/// Ensure the required schema exists. Idempotent and safe to call at startup.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    tracing::info!("storage: ensuring DB schema (CREATE TABLE IF NOT EXISTS ...)");
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS news_items (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            submitter_name  TEXT NOT NULL CHECK (length(trim(submitter_name)) > 0),
            url             TEXT NOT NULL CHECK (length(trim(url)) > 0),
            reason          TEXT NOT NULL CHECK (length(trim(reason)) > 0),
            agreed_text     TEXT NOT NULL CHECK (length(trim(agreed_text)) > 0),
            created_at      TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert a new item and return its id. Nothing is written when validation fails.
pub async fn save_item(pool: &SqlitePool, item: NewItem) -> Result<i64> {
    let item = item.validated()?;
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    let result = sqlx::query(
        r#"
        INSERT INTO news_items (submitter_name, url, reason, agreed_text, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&item.submitter_name)
    .bind(&item.url)
    .bind(&item.reason)
    .bind(&item.agreed_text)
    .bind(&created_at)
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();
    info!(item_id = id, submitter = %item.submitter_name, url = %item.url, "news item saved");
    Ok(id)
}

/// Get a single item by id
pub async fn get_item(pool: &SqlitePool, item_id: i64) -> Result<NewsItem> {
    let row = sqlx::query_as::<_, NewsItemRow>(
        r#"
        SELECT id, submitter_name, url, reason, agreed_text, created_at
        FROM news_items
        WHERE id = ?
        "#,
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("news item {}", item_id)))?;

    row.try_into()
}

/// Every item in creation order (id ascending, which is stable under timestamp ties)
pub async fn list_items(pool: &SqlitePool) -> Result<Vec<NewsItem>> {
    let rows = sqlx::query_as::<_, NewsItemRow>(
        r#"
        SELECT id, submitter_name, url, reason, agreed_text, created_at
        FROM news_items
        ORDER BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(NewsItem::try_from).collect()
}

pub async fn count_items(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM news_items")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt(format!("created_at '{}': {}", raw, e)))
}

// Internal row type for SQLx mapping
#[derive(sqlx::FromRow)]
struct NewsItemRow {
    id: i64,
    submitter_name: String,
    url: String,
    reason: String,
    agreed_text: String,
    created_at: String,
}

impl TryFrom<NewsItemRow> for NewsItem {
    type Error = Error;

    fn try_from(row: NewsItemRow) -> Result<Self> {
        Ok(NewsItem {
            id: row.id,
            submitter_name: row.submitter_name,
            url: row.url,
            reason: row.reason,
            agreed_text: row.agreed_text,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
