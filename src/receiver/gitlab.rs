use serde::Deserialize;

use super::{
    branch_from_ref, header_str, Receiver, ReceiverCapabilities, ReceiverError, WebhookPostInfo,
    WebhookPostRequest,
};
use crate::crypto::ConstantTimeComparer;

const EVENT_SUFFIX: &str = " Hook";

pub struct GitlabReceiver {
    repo: String,
}

impl GitlabReceiver {
    pub fn new(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
        }
    }
}

/// GitLab payloads carry the repository path under `project`, not
/// `repository.full_name`.
#[derive(Debug, Deserialize)]
struct GitlabPayload {
    #[serde(rename = "ref", default)]
    git_ref: String,
    #[serde(default)]
    after: String,
    #[serde(default)]
    project: GitlabProject,
}

#[derive(Debug, Default, Deserialize)]
struct GitlabProject {
    #[serde(default)]
    path_with_namespace: String,
}

impl Receiver for GitlabReceiver {
    fn capabilities(&self) -> ReceiverCapabilities {
        ReceiverCapabilities {
            can_authorize: true,
            can_verify_signature: false,
            has_ping: false,
        }
    }

    fn webhook_info(&self, req: &WebhookPostRequest) -> Result<WebhookPostInfo, ReceiverError> {
        if req.payload.is_empty() {
            return Err(ReceiverError::EmptyBody);
        }
        let parsed: GitlabPayload = serde_json::from_slice(&req.payload)?;
        if parsed.project.path_with_namespace != self.repo {
            return Err(ReceiverError::IncorrectRepo {
                expected: self.repo.clone(),
                actual: parsed.project.path_with_namespace,
            });
        }

        let event_header = header_str(&req.headers, "X-Gitlab-Event");
        let Some(event) = event_header.strip_suffix(EVENT_SUFFIX) else {
            return Err(ReceiverError::MalformedEvent(event_header.to_string()));
        };

        Ok(WebhookPostInfo {
            delivery_id: header_str(&req.headers, "X-Gitlab-Event-UUID").to_string(),
            branch: branch_from_ref(&parsed.git_ref),
            event: event.to_lowercase(),
            hash: parsed.after,
        })
    }

    fn authorize(&self, req: &WebhookPostRequest, auth: &str) -> Result<bool, ReceiverError> {
        let header = header_str(&req.headers, "X-Gitlab-Token");
        Ok(ConstantTimeComparer::new(auth).eq(header))
    }

    // https://gitlab.com/gitlab-org/gitlab/-/issues/19367
    fn verify_signature(
        &self,
        _req: &WebhookPostRequest,
        _secret: &str,
    ) -> Result<bool, ReceiverError> {
        Err(ReceiverError::SignNotSupported)
    }

    fn is_ping(&self, _req: &WebhookPostRequest) -> bool {
        false
    }
}
