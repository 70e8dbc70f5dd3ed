use super::{
    common_payload_info, header_str, verify_payload_signature, Receiver, ReceiverCapabilities,
    ReceiverError, WebhookPostInfo, WebhookPostRequest,
};

const SIGNATURE_PREFIX: &str = "sha256=";

pub struct GithubReceiver {
    repo: String,
}

impl GithubReceiver {
    pub fn new(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
        }
    }
}

impl Receiver for GithubReceiver {
    fn capabilities(&self) -> ReceiverCapabilities {
        ReceiverCapabilities {
            can_authorize: false,
            can_verify_signature: true,
            has_ping: true,
        }
    }

    fn webhook_info(&self, req: &WebhookPostRequest) -> Result<WebhookPostInfo, ReceiverError> {
        let mut info = common_payload_info(&req.payload, &self.repo)?;
        info.event = header_str(&req.headers, "X-GitHub-Event").to_string();
        info.delivery_id = header_str(&req.headers, "X-GitHub-Delivery").to_string();
        Ok(info)
    }

    fn authorize(&self, _req: &WebhookPostRequest, _auth: &str) -> Result<bool, ReceiverError> {
        Err(ReceiverError::AuthNotSupported)
    }

    fn verify_signature(
        &self,
        req: &WebhookPostRequest,
        secret: &str,
    ) -> Result<bool, ReceiverError> {
        let signature = header_str(&req.headers, "X-Hub-Signature-256");
        if signature.is_empty() || signature == SIGNATURE_PREFIX {
            return Ok(false);
        }
        let Some(signature) = signature.strip_prefix(SIGNATURE_PREFIX) else {
            return Err(ReceiverError::MalformedSignature(signature.to_string()));
        };
        verify_payload_signature(&req.payload, signature, secret)
    }

    fn is_ping(&self, req: &WebhookPostRequest) -> bool {
        header_str(&req.headers, "X-GitHub-Event") == "ping"
    }
}
