//! The per-project webhook endpoint: decode, authenticate, match actions,
//! enqueue, answer.

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;
use ulid::Ulid;

use crate::config::{Config, Project};
use crate::receiver::{Receiver, ReceiverError, WebhookPostInfo, WebhookPostRequest};
use crate::runner::{ActionDescriptor, ActionIdentifier};
use crate::AppState;

/// Everything a single project's endpoint needs, captured at router build
/// time.
pub(super) struct ProjectContext {
    pub name: String,
    pub project: Project,
    pub receiver: Box<dyn Receiver>,
    pub state: Arc<AppState>,
}

#[derive(Debug, Serialize)]
pub struct ActionOutput {
    #[serde(flatten)]
    pub ident: ActionIdentifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

pub(super) async fn handle(ctx: Arc<ProjectContext>, headers: HeaderMap, body: Bytes) -> Response {
    let req = WebhookPostRequest {
        payload: body.to_vec(),
        headers,
    };

    let info = match ctx.receiver.webhook_info(&req) {
        Ok(info) => info,
        Err(err) => {
            tracing::error!(
                project = %ctx.name,
                error = %err,
                "Error while parsing the webhook request"
            );
            return error_status(&err).into_response();
        }
    };

    let span = tracing::info_span!(
        "delivery",
        project = %ctx.name,
        delivery_id = %info.delivery_id,
    );
    handle_delivery(ctx, req, info).instrument(span).await
}

async fn handle_delivery(
    ctx: Arc<ProjectContext>,
    req: WebhookPostRequest,
    info: WebhookPostInfo,
) -> Response {
    tracing::info!(
        branch = %info.branch,
        event = %info.event,
        hash = %info.hash,
        "Received a webhook post"
    );

    if let Some(auth) = ctx.project.authorization.as_deref().filter(|a| !a.is_empty()) {
        match ctx.receiver.authorize(&req, auth) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Request authentication failed");
                return StatusCode::UNAUTHORIZED.into_response();
            }
            Err(err) => {
                tracing::warn!(error = %err, "Request authentication failed");
                return StatusCode::UNAUTHORIZED.into_response();
            }
        }
    }

    if let Some(secret) = ctx.project.secret.as_deref().filter(|s| !s.is_empty()) {
        match ctx.receiver.verify_signature(&req, secret) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Request signature is not valid");
                return StatusCode::FORBIDDEN.into_response();
            }
            Err(err) => {
                tracing::warn!(error = %err, "Request signature is not valid");
                return StatusCode::FORBIDDEN.into_response();
            }
        }
    }

    // Ping precedes matching so ping payloads never fire actions.
    if ctx.receiver.is_ping(&req) {
        return StatusCode::OK.into_response();
    }

    let actions = matching_actions(&ctx.name, &ctx.project, &info);
    if actions.is_empty() {
        tracing::info!("No applicable actions found in webhook post");
        return StatusCode::OK.into_response();
    }

    for descriptor in &actions {
        // Intentionally blocking: a saturated runner pushes back on the
        // HTTP request instead of buffering.
        if ctx.state.actions_tx.send(descriptor.clone()).await.is_err() {
            tracing::error!("Action runner is unavailable, delivery dropped");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    tracing::info!(actions = actions.len(), "Launched actions");

    let outputs = to_outputs(&ctx.state.config, actions);
    (StatusCode::CREATED, Json(outputs)).into_response()
}

/// Status for errors out of `webhook_info`; authentication errors are
/// mapped separately at their own call sites.
fn error_status(err: &ReceiverError) -> StatusCode {
    match err {
        ReceiverError::IncorrectRepo { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ReceiverError::EmptyBody => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Actions matching the delivery's branch and event, in configuration
/// order, each with a freshly minted pipe id.
fn matching_actions(
    project_name: &str,
    project: &Project,
    info: &WebhookPostInfo,
) -> Vec<ActionDescriptor> {
    project
        .actions
        .iter()
        .enumerate()
        .filter(|(_, action)| {
            action.branch == info.branch && (action.on == "*" || action.on == info.event)
        })
        .map(|(index, action)| ActionDescriptor {
            ident: ActionIdentifier {
                index,
                pipe_id: Ulid::new().to_string(),
                project: project_name.to_string(),
                delivery_id: info.delivery_id.clone(),
            },
            action: action.clone(),
        })
        .collect()
}

fn to_outputs(config: &Config, actions: Vec<ActionDescriptor>) -> Vec<ActionOutput> {
    let base_url = public_base_url(config);
    actions
        .into_iter()
        .map(|descriptor| {
            let url = base_url
                .as_deref()
                .map(|base| format!("{base}{}", descriptor.ident.pipe_id));
            ActionOutput {
                ident: descriptor.ident,
                url,
            }
        })
        .collect()
}

/// Where a pipeline can be inspected, if the API is reachable.
fn public_base_url(config: &Config) -> Option<String> {
    if config.disable_api {
        return None;
    }
    if let Some(public_url) = config.public_url.as_deref().filter(|u| !u.is_empty()) {
        return Some(format!("{}/pipelines/", public_url.trim_end_matches('/')));
    }
    let scheme = if config.ssl.enabled() { "https" } else { "http" };
    Some(format!(
        "{scheme}://{}:{}/pipelines/",
        config.host, config.port
    ))
}
