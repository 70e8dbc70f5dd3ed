use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, SqlitePool};
use std::path::Path;
use thiserror::Error;

use crate::config::Action;

use super::clamp_page_size;

const SCHEMA: &str = include_str!("../../migrations/pipelines.sql");

/// One row per pipeline: a single execution of a single action against a
/// single delivery. `ended_at IS NULL` means the pipeline is still pending.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PipelineRecord {
    pub id: i64,
    pub pipe_id: String,
    pub project: String,
    pub delivery_id: String,
    /// JSON snapshot of the action configuration at dispatch time.
    pub config: String,
    pub error: Option<String>,
    pub output: Option<String>,
    pub created_at: i64,
    pub ended_at: Option<i64>,
}

impl PipelineRecord {
    pub fn status(&self) -> PipelineStatus {
        match (&self.ended_at, self.error.as_deref()) {
            (None, _) => PipelineStatus::Pending,
            (Some(_), None) | (Some(_), Some("")) => PipelineStatus::Ok,
            (Some(_), Some(_)) => PipelineStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineStatus {
    #[default]
    Any,
    Ok,
    Error,
    Pending,
}

impl std::str::FromStr for PipelineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "any" => Ok(PipelineStatus::Any),
            "ok" => Ok(PipelineStatus::Ok),
            "error" => Ok(PipelineStatus::Error),
            "pending" => Ok(PipelineStatus::Pending),
            other => Err(format!("unknown pipeline status '{other}'")),
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Any => write!(f, "any"),
            PipelineStatus::Ok => write!(f, "ok"),
            PipelineStatus::Error => write!(f, "error"),
            PipelineStatus::Pending => write!(f, "pending"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListPipelinesQuery {
    pub offset: i64,
    pub limit: i64,
    pub project: String,
    pub delivery_id: String,
    pub status: PipelineStatus,
}

#[derive(Debug, Error)]
pub enum PipelineStoreError {
    #[error("unable to find a pending pipeline record to close: pipe_id = {0}")]
    NotFoundOrClosed(String),
    #[error("failed to serialize action config: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct PipelineStore {
    pool: SqlitePool,
}

impl PipelineStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = super::open_file(path, SCHEMA).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert the initial record for a freshly dispatched pipeline. Fails on
    /// a duplicate pipe id.
    pub async fn create_record(
        &self,
        pipe_id: &str,
        project: &str,
        delivery_id: &str,
        action: &Action,
    ) -> Result<(), PipelineStoreError> {
        let config = serde_json::to_string(action)?;
        sqlx::query(
            "INSERT INTO pipeline (pipe_id, project, delivery_id, config) VALUES (?, ?, ?, ?)",
        )
        .bind(pipe_id)
        .bind(project)
        .bind(delivery_id)
        .bind(config)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Close a pending record with the action's outcome. A record can be
    /// closed at most once; closing a missing or already-closed record is
    /// [`PipelineStoreError::NotFoundOrClosed`].
    pub async fn close_record(
        &self,
        pipe_id: &str,
        error: Option<&str>,
        output: &str,
    ) -> Result<(), PipelineStoreError> {
        let result = sqlx::query(
            "UPDATE pipeline SET error = ?, output = ?, ended_at = ? \
             WHERE pipe_id = ? AND ended_at IS NULL",
        )
        .bind(error)
        .bind(output)
        .bind(chrono::Utc::now().timestamp())
        .bind(pipe_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineStoreError::NotFoundOrClosed(pipe_id.to_string()));
        }
        Ok(())
    }

    /// Fetch one record by pipe id; an empty id returns the most recent
    /// record.
    pub async fn get_record(&self, pipe_id: &str) -> Result<Option<PipelineRecord>, sqlx::Error> {
        if pipe_id.is_empty() {
            sqlx::query_as("SELECT * FROM pipeline ORDER BY created_at DESC, id DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await
        } else {
            sqlx::query_as("SELECT * FROM pipeline WHERE pipe_id = ?")
                .bind(pipe_id)
                .fetch_optional(&self.pool)
                .await
        }
    }

    /// Filtered page of records. The page is selected newest-first, then
    /// reversed so the returned slice reads oldest-first.
    pub async fn list_records(
        &self,
        query: &ListPipelinesQuery,
    ) -> Result<Vec<PipelineRecord>, sqlx::Error> {
        let limit = clamp_page_size(query.limit);

        let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("SELECT * FROM pipeline");
        let mut sep = WhereSep::new();

        if !query.project.is_empty() {
            qb.push(sep.next());
            qb.push("project LIKE ");
            qb.push_bind(format!("%{}%", query.project));
        }
        if !query.delivery_id.is_empty() {
            qb.push(sep.next());
            qb.push("delivery_id LIKE ");
            qb.push_bind(format!("%{}%", query.delivery_id));
        }
        match query.status {
            PipelineStatus::Any => {}
            PipelineStatus::Ok => {
                qb.push(sep.next());
                qb.push("ended_at IS NOT NULL AND (error IS NULL OR error = '')");
            }
            PipelineStatus::Error => {
                qb.push(sep.next());
                qb.push("ended_at IS NOT NULL AND error IS NOT NULL AND error != ''");
            }
            PipelineStatus::Pending => {
                qb.push(sep.next());
                qb.push("ended_at IS NULL");
            }
        }

        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(query.offset.max(0));

        let mut rows: Vec<PipelineRecord> =
            qb.build_query_as().fetch_all(&self.pool).await?;
        rows.reverse();
        Ok(rows)
    }

    #[cfg(test)]
    pub(crate) async fn open_memory() -> Self {
        Self {
            pool: super::open_memory(SCHEMA).await,
        }
    }
}

/// JSON rendering of a record for the inspection API and CLI formats:
/// ISO-8601 timestamps, parsed config, null for unset optionals. The raw
/// output text is served by its own endpoint and only included on demand.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineView {
    pub pipe_id: String,
    pub project: String,
    pub delivery_id: String,
    pub config: serde_json::Value,
    pub status: String,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub created_at: String,
    pub ended_at: Option<String>,
}

impl PipelineView {
    pub fn from_record(record: &PipelineRecord, include_output: bool) -> Self {
        Self {
            pipe_id: record.pipe_id.clone(),
            project: record.project.clone(),
            delivery_id: record.delivery_id.clone(),
            config: serde_json::from_str(&record.config)
                .unwrap_or(serde_json::Value::Null),
            status: record.status().to_string(),
            error: record.error.clone(),
            output: include_output.then(|| record.output.clone().unwrap_or_default()),
            created_at: format_unix_ts(record.created_at),
            ended_at: record.ended_at.map(format_unix_ts),
        }
    }
}

/// Unix seconds → ISO-8601 (UTC).
pub(crate) fn format_unix_ts(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| secs.to_string())
}

/// Joins filter clauses: first one gets ` WHERE `, the rest ` AND `.
struct WhereSep {
    first: bool,
}

impl WhereSep {
    fn new() -> Self {
        Self { first: true }
    }

    fn next(&mut self) -> &'static str {
        if self.first {
            self.first = false;
            " WHERE "
        } else {
            " AND "
        }
    }
}
