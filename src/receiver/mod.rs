//! Provider abstraction for inbound webhook deliveries.
//!
//! Each hosted git provider speaks a slightly different dialect: different
//! headers, different authentication scheme, different payload shape. A
//! [`Receiver`] normalizes a delivery into [`WebhookPostInfo`] and exposes
//! its capability set so configuration can be validated before the server
//! accepts traffic.

mod gitea;
mod github;
mod gitlab;

pub use gitea::GiteaReceiver;
pub use github::GithubReceiver;
pub use gitlab::GitlabReceiver;

use axum::http::HeaderMap;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{GitProvider, Project};
use crate::crypto::{payload_signature, ConstantTimeComparer};

/// A webhook POST as received: raw payload plus headers. Immutable after
/// construction; authentication steps re-read the same payload bytes.
pub struct WebhookPostRequest {
    pub payload: Vec<u8>,
    pub headers: HeaderMap,
}

/// Normalized delivery data extracted from payload and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookPostInfo {
    pub delivery_id: String,
    pub branch: String,
    pub event: String,
    /// Commit hash after applying the event (`after` field of the payload).
    pub hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverCapabilities {
    pub can_authorize: bool,
    pub can_verify_signature: bool,
    pub has_ping: bool,
}

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("incorrect repo received in the webhook payload, expected '{expected}' but received '{actual}'")]
    IncorrectRepo { expected: String, actual: String },
    #[error("authorization header is not supported for this receiver, use secret signature instead")]
    AuthNotSupported,
    #[error("request signature is not supported for this receiver, use authorization header instead")]
    SignNotSupported,
    #[error("malformed GitHub signature: it must start with 'sha256=', got '{0}' instead")]
    MalformedSignature(String),
    #[error("malformed gitlab event, must end with ' Hook', got '{0}'")]
    MalformedEvent(String),
    #[error("empty body supplied in the webhook request")]
    EmptyBody,
    #[error("failed to decode webhook payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("failed to decode signature: {0}")]
    SignatureHex(#[from] hex::FromHexError),
}

pub trait Receiver: Send + Sync {
    fn capabilities(&self) -> ReceiverCapabilities;
    fn webhook_info(&self, req: &WebhookPostRequest) -> Result<WebhookPostInfo, ReceiverError>;
    fn authorize(&self, req: &WebhookPostRequest, auth: &str) -> Result<bool, ReceiverError>;
    fn verify_signature(
        &self,
        req: &WebhookPostRequest,
        secret: &str,
    ) -> Result<bool, ReceiverError>;
    fn is_ping(&self, req: &WebhookPostRequest) -> bool;
}

/// Build the receiver matching the project's configured provider.
pub fn for_project(project: &Project) -> Box<dyn Receiver> {
    match project.git_provider {
        GitProvider::Gitea => Box::new(GiteaReceiver::new(&project.repo)),
        GitProvider::Github => Box::new(GithubReceiver::new(&project.repo)),
        GitProvider::Gitlab => Box::new(GitlabReceiver::new(&project.repo)),
    }
}

/// Push-event payload shape shared by Gitea and GitHub.
#[derive(Debug, Deserialize)]
struct CommonPayload {
    #[serde(rename = "ref", default)]
    git_ref: String,
    #[serde(default)]
    after: String,
    #[serde(default)]
    repository: CommonRepo,
}

#[derive(Debug, Default, Deserialize)]
struct CommonRepo {
    #[serde(default)]
    full_name: String,
}

/// Decode the parts of the payload common to Gitea and GitHub; header-derived
/// fields are filled in by the caller.
pub(crate) fn common_payload_info(
    payload: &[u8],
    repo: &str,
) -> Result<WebhookPostInfo, ReceiverError> {
    if payload.is_empty() {
        return Err(ReceiverError::EmptyBody);
    }
    let parsed: CommonPayload = serde_json::from_slice(payload)?;
    if parsed.repository.full_name != repo {
        return Err(ReceiverError::IncorrectRepo {
            expected: repo.to_string(),
            actual: parsed.repository.full_name,
        });
    }
    Ok(WebhookPostInfo {
        delivery_id: String::new(),
        branch: branch_from_ref(&parsed.git_ref),
        event: String::new(),
        hash: parsed.after,
    })
}

/// `refs/heads/foo/bar` → `foo/bar`; refs with fewer than three segments are
/// returned verbatim.
pub(crate) fn branch_from_ref(git_ref: &str) -> String {
    let parts: Vec<&str> = git_ref.split('/').collect();
    if parts.len() < 3 {
        return git_ref.to_string();
    }
    parts[2..].join("/")
}

/// Verify a hex-encoded HMAC-SHA256 signature against the payload.
pub(crate) fn verify_payload_signature(
    payload: &[u8],
    signature: &str,
    secret: &str,
) -> Result<bool, ReceiverError> {
    let head_sig = hex::decode(signature)?;
    let expected = payload_signature(secret, payload);
    Ok(ConstantTimeComparer::from_bytes(&head_sig).eq_bytes(&expected))
}

/// Header value as a string; missing or non-UTF8 headers read as empty.
pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}
