//! Read-only inspection API over the two stores.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{
    parse_log_level, FilteredEntryQuery, ListPipelinesQuery, LogEntryView, PipelineView,
};
use crate::AppState;

use super::basic_auth;

pub(super) fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/pipelines", get(list_pipelines))
        .route("/pipelines/:pipe_id", get(get_pipeline))
        .route("/pipelines/:pipe_id/output", get(get_pipeline_output));

    if state.logs.is_some() {
        router = router.route("/logs", get(list_logs));
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            basic_auth::require_basic_auth,
        ))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ListPipelinesParams {
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: i64,
    #[serde(default)]
    project: String,
    #[serde(default, rename = "deliveryId")]
    delivery_id: String,
    #[serde(default)]
    status: String,
}

async fn list_pipelines(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListPipelinesParams>,
) -> Response {
    let status = match params.status.parse::<crate::db::PipelineStatus>() {
        Ok(status) => status,
        Err(err) => return (StatusCode::BAD_REQUEST, err).into_response(),
    };
    let query = ListPipelinesQuery {
        offset: params.offset,
        limit: params.limit,
        project: params.project,
        delivery_id: params.delivery_id,
        status,
    };
    match state.pipelines.list_records(&query).await {
        Ok(records) => {
            let views: Vec<PipelineView> = records
                .iter()
                .map(|record| PipelineView::from_record(record, false))
                .collect();
            Json(views).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "Error listing pipeline records");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_pipeline(
    State(state): State<Arc<AppState>>,
    Path(pipe_id): Path<String>,
) -> Response {
    match state.pipelines.get_record(&pipe_id).await {
        Ok(Some(record)) => Json(PipelineView::from_record(&record, true)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Error fetching a pipeline record");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_pipeline_output(
    State(state): State<Arc<AppState>>,
    Path(pipe_id): Path<String>,
) -> Response {
    match state.pipelines.get_record(&pipe_id).await {
        Ok(Some(record)) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            record.output.unwrap_or_default(),
        )
            .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Error fetching a pipeline record");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `level` may repeat, so the query string is taken as raw pairs.
async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let Some(logs) = state.logs.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut query = FilteredEntryQuery::default();
    for (key, value) in params {
        match key.as_str() {
            "offset" => query.base.offset = value.parse().unwrap_or(0),
            "limit" => query.base.page_size = value.parse().unwrap_or(0),
            "cursorId" => query.base.cursor_id = value.parse().unwrap_or(0),
            "cursorTs" => query.base.cursor_ts = value.parse().unwrap_or(0),
            "level" => {
                if let Some(level) = parse_log_level(&value) {
                    query.levels.push(level);
                }
            }
            "project" => query.project = value,
            "deliveryId" => query.delivery_id = value,
            "pipeId" => query.pipe_id = value,
            "message" => query.message = value,
            _ => {}
        }
    }

    match logs.get_entries_filtered(&query).await {
        Ok(entries) => {
            let views: Vec<LogEntryView> = entries.iter().map(LogEntryView::from).collect();
            Json(views).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "Error querying the log store");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
