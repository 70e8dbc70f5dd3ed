use super::{
    common_payload_info, header_str, verify_payload_signature, Receiver, ReceiverCapabilities,
    ReceiverError, WebhookPostInfo, WebhookPostRequest,
};
use crate::crypto::ConstantTimeComparer;

pub struct GiteaReceiver {
    repo: String,
}

impl GiteaReceiver {
    pub fn new(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
        }
    }
}

impl Receiver for GiteaReceiver {
    fn capabilities(&self) -> ReceiverCapabilities {
        ReceiverCapabilities {
            can_authorize: true,
            can_verify_signature: true,
            has_ping: false,
        }
    }

    fn webhook_info(&self, req: &WebhookPostRequest) -> Result<WebhookPostInfo, ReceiverError> {
        let mut info = common_payload_info(&req.payload, &self.repo)?;
        info.event = header_str(&req.headers, "X-Gitea-Event").to_string();
        info.delivery_id = header_str(&req.headers, "X-Gitea-Delivery").to_string();
        Ok(info)
    }

    fn authorize(&self, req: &WebhookPostRequest, auth: &str) -> Result<bool, ReceiverError> {
        let header = header_str(&req.headers, "Authorization");
        Ok(ConstantTimeComparer::new(auth).eq(header))
    }

    fn verify_signature(
        &self,
        req: &WebhookPostRequest,
        secret: &str,
    ) -> Result<bool, ReceiverError> {
        let signature = header_str(&req.headers, "X-Gitea-Signature");
        if signature.is_empty() {
            return Ok(false);
        }
        verify_payload_signature(&req.payload, signature, secret)
    }

    fn is_ping(&self, _req: &WebhookPostRequest) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::payload_signature;
    use axum::http::HeaderMap;

    const PAYLOAD: &[u8] =
        br#"{"ref":"refs/heads/master","after":"a1b2c3","repository":{"full_name":"me/repo"}}"#;

    fn request(signature: Option<&str>, auth: Option<&str>) -> WebhookPostRequest {
        let mut headers = HeaderMap::new();
        headers.insert("X-Gitea-Event", "push".parse().unwrap());
        headers.insert("X-Gitea-Delivery", "delivery-1".parse().unwrap());
        if let Some(sig) = signature {
            headers.insert("X-Gitea-Signature", sig.parse().unwrap());
        }
        if let Some(auth) = auth {
            headers.insert("Authorization", auth.parse().unwrap());
        }
        WebhookPostRequest {
            payload: PAYLOAD.to_vec(),
            headers,
        }
    }

    #[test]
    fn extracts_webhook_info() {
        let receiver = GiteaReceiver::new("me/repo");
        let info = receiver.webhook_info(&request(None, None)).expect("info");
        assert_eq!(info.event, "push");
        assert_eq!(info.delivery_id, "delivery-1");
        assert_eq!(info.branch, "master");
        assert_eq!(info.hash, "a1b2c3");
    }

    #[test]
    fn authorizes_matching_token() {
        let receiver = GiteaReceiver::new("me/repo");
        let req = request(None, Some("tok"));
        assert!(receiver.authorize(&req, "tok").expect("authorize"));
        assert!(!receiver.authorize(&req, "other").expect("authorize"));
    }

    #[test]
    fn missing_authorization_header_fails() {
        let receiver = GiteaReceiver::new("me/repo");
        let req = request(None, None);
        assert!(!receiver.authorize(&req, "tok").expect("authorize"));
    }

    #[test]
    fn verifies_valid_signature() {
        let receiver = GiteaReceiver::new("me/repo");
        let sig = hex::encode(payload_signature("s3cret", PAYLOAD));
        let req = request(Some(&sig), None);
        assert!(receiver.verify_signature(&req, "s3cret").expect("verify"));
        assert!(!receiver.verify_signature(&req, "wrong").expect("verify"));
    }

    #[test]
    fn missing_signature_header_is_a_mismatch() {
        let receiver = GiteaReceiver::new("me/repo");
        let req = request(None, None);
        assert!(!receiver.verify_signature(&req, "s3cret").expect("verify"));
    }

    #[test]
    fn garbage_signature_is_an_error() {
        let receiver = GiteaReceiver::new("me/repo");
        let req = request(Some("not-hex!"), None);
        assert!(receiver.verify_signature(&req, "s3cret").is_err());
    }

    #[test]
    fn never_a_ping() {
        let receiver = GiteaReceiver::new("me/repo");
        assert!(!receiver.is_ping(&request(None, None)));
    }
}
