//! Embedded SQLite stores for pipeline records and structured logs.
//!
//! Both stores share the open contract: WAL journal, foreign keys on, 5s
//! busy timeout, normal synchronous mode, and a one-shot schema migration
//! gated on `PRAGMA user_version`.

mod logs;
mod pipelines;

pub use logs::{
    level_name, parse_log_level, EntryQuery, FilteredEntryQuery, LogEntry, LogEntryView, LogStore,
    LEVEL_DEBUG, LEVEL_ERROR, LEVEL_INFO, LEVEL_WARN,
};
pub use pipelines::{
    ListPipelinesQuery, PipelineRecord, PipelineStatus, PipelineStore, PipelineStoreError,
    PipelineView,
};

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

const MAX_PAGE_SIZE: i64 = 200;
const DEFAULT_PAGE_SIZE: i64 = 20;

fn clamp_page_size(limit: i64) -> i64 {
    if limit < 1 || limit > MAX_PAGE_SIZE {
        DEFAULT_PAGE_SIZE
    } else {
        limit
    }
}

async fn open_pool(url: &str, schema: &str) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    migrate(&pool, schema).await?;
    Ok(pool)
}

async fn open_file(path: &Path, schema: &str) -> Result<SqlitePool> {
    let url = format!("sqlite:{}?mode=rwc", path.display());
    open_pool(&url, schema).await
}

/// Apply the embedded schema exactly once, in a single transaction.
async fn migrate(pool: &SqlitePool, schema: &str) -> Result<()> {
    let (user_version,): (i64,) = sqlx::query_as("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    if user_version != 0 {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for statement in schema.split(';') {
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(&mut *tx).await?;
        }
    }
    sqlx::query("PRAGMA user_version = 1").execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}

/// An in-memory pool for tests; a single connection so the database is
/// actually shared between queries.
#[cfg(test)]
async fn open_memory(schema: &str) -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite opens");
    migrate(&pool, schema).await.expect("schema applies");
    pool
}
