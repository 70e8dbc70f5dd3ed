use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, SqlitePool};
use std::path::Path;

use super::clamp_page_size;

const SCHEMA: &str = include_str!("../../migrations/logs.sql");

/// Severity integers, compatible with structured-logging conventions:
/// debug=-4, info=0, warn=4, error=8.
pub const LEVEL_DEBUG: i64 = -4;
pub const LEVEL_INFO: i64 = 0;
pub const LEVEL_WARN: i64 = 4;
pub const LEVEL_ERROR: i64 = 8;

pub fn parse_log_level(name: &str) -> Option<i64> {
    match name {
        "debug" => Some(LEVEL_DEBUG),
        "info" => Some(LEVEL_INFO),
        "warn" => Some(LEVEL_WARN),
        "error" => Some(LEVEL_ERROR),
        _ => None,
    }
}

pub fn level_name(level: i64) -> &'static str {
    match level {
        i64::MIN..=-1 => "debug",
        0..=3 => "info",
        4..=7 => "warn",
        _ => "error",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LogEntry {
    pub id: i64,
    pub level: i64,
    pub project: Option<String>,
    pub delivery_id: Option<String>,
    pub pipe_id: Option<String>,
    pub message: String,
    /// Remaining structured fields as a JSON object.
    pub data: String,
    pub ts: i64,
}

/// Cursor query over `(ts, id)`; results are strictly after the cursor.
#[derive(Debug, Clone, Default)]
pub struct EntryQuery {
    pub cursor_ts: i64,
    pub cursor_id: i64,
    pub page_size: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct FilteredEntryQuery {
    pub base: EntryQuery,
    /// Empty means all four levels.
    pub levels: Vec<i64>,
    pub project: String,
    pub delivery_id: String,
    pub pipe_id: String,
    pub message: String,
}

/// JSON rendering of a log row: level as a name, parsed data, both the raw
/// cursor fields and an ISO-8601 time.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryView {
    pub id: i64,
    pub level: &'static str,
    pub project: Option<String>,
    pub delivery_id: Option<String>,
    pub pipe_id: Option<String>,
    pub message: String,
    pub data: serde_json::Value,
    pub ts: i64,
    pub time: String,
}

impl From<&LogEntry> for LogEntryView {
    fn from(entry: &LogEntry) -> Self {
        Self {
            id: entry.id,
            level: level_name(entry.level),
            project: entry.project.clone(),
            delivery_id: entry.delivery_id.clone(),
            pipe_id: entry.pipe_id.clone(),
            message: entry.message.clone(),
            data: serde_json::from_str(&entry.data).unwrap_or(serde_json::Value::Null),
            ts: entry.ts,
            time: super::pipelines::format_unix_ts(entry.ts),
        }
    }
}

#[derive(Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = super::open_file(path, SCHEMA).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_open(&self) -> bool {
        !self.pool.is_closed()
    }

    /// Append-only insert; `id` on the entry is ignored.
    pub async fn append(&self, entry: &LogEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO logs (level, project, delivery_id, pipe_id, message, data, ts) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.level)
        .bind(&entry.project)
        .bind(&entry.delivery_id)
        .bind(&entry.pipe_id)
        .bind(&entry.message)
        .bind(&entry.data)
        .bind(entry.ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_entries(&self, query: &EntryQuery) -> Result<Vec<LogEntry>, sqlx::Error> {
        let page_size = clamp_page_size(query.page_size);
        sqlx::query_as(
            "SELECT * FROM logs WHERE (ts, id) > (?, ?) ORDER BY ts, id LIMIT ? OFFSET ?",
        )
        .bind(query.cursor_ts)
        .bind(query.cursor_id)
        .bind(page_size)
        .bind(query.offset.max(0))
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_entries_filtered(
        &self,
        query: &FilteredEntryQuery,
    ) -> Result<Vec<LogEntry>, sqlx::Error> {
        let page_size = clamp_page_size(query.base.page_size);
        let levels: &[i64] = if query.levels.is_empty() {
            &[LEVEL_DEBUG, LEVEL_INFO, LEVEL_WARN, LEVEL_ERROR]
        } else {
            &query.levels
        };

        let mut qb: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT * FROM logs WHERE (ts, id) > (");
        qb.push_bind(query.base.cursor_ts);
        qb.push(", ");
        qb.push_bind(query.base.cursor_id);
        qb.push(")");

        qb.push(" AND level IN (");
        let mut separated = qb.separated(", ");
        for level in levels {
            separated.push_bind(*level);
        }
        qb.push(")");

        for (column, value) in [
            ("project", &query.project),
            ("delivery_id", &query.delivery_id),
            ("pipe_id", &query.pipe_id),
            ("message", &query.message),
        ] {
            if !value.is_empty() {
                qb.push(format!(" AND {column} LIKE "));
                qb.push_bind(format!("%{value}%"));
            }
        }

        qb.push(" ORDER BY ts, id LIMIT ");
        qb.push_bind(page_size);
        qb.push(" OFFSET ");
        qb.push_bind(query.base.offset.max(0));

        qb.build_query_as().fetch_all(&self.pool).await
    }

    #[cfg(test)]
    pub(crate) async fn open_memory() -> Self {
        Self {
            pool: super::open_memory(SCHEMA).await,
        }
    }
}
