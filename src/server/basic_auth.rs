//! Optional HTTP Basic Auth gate for the inspection API.
//!
//! Gating is active only when both credentials are configured; comparison
//! goes through the constant-time comparator like every other credential
//! check.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;

use crate::crypto::ConstantTimeComparer;
use crate::AppState;

const CHALLENGE: &str = "Basic realm=\"restricted\", charset=\"UTF-8\"";

pub(super) async fn require_basic_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let (expected_user, expected_password) = match (
        state.config.api_user.as_deref().filter(|u| !u.is_empty()),
        state.config.api_password.as_deref().filter(|p| !p.is_empty()),
    ) {
        (Some(user), Some(password)) => (user, password),
        // either credential missing disables the gate
        _ => return next.run(req).await,
    };

    if let Some((user, password)) = parse_basic_credentials(req.headers().get(header::AUTHORIZATION))
    {
        if ConstantTimeComparer::new(expected_user).eq(&user)
            && ConstantTimeComparer::new(expected_password).eq(&password)
        {
            return next.run(req).await;
        }
        tracing::info!(uri = %req.uri(), "Basic auth failed");
    } else {
        tracing::info!(uri = %req.uri(), "Basic auth required");
    }

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, CHALLENGE)],
        "Unauthorized",
    )
        .into_response()
}

fn parse_basic_credentials(
    header: Option<&axum::http::HeaderValue>,
) -> Option<(String, String)> {
    let value = header?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, password) = text.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::PipelineStore;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use axum::Router;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    async fn router_with_credentials(user: Option<&str>, password: Option<&str>) -> Router {
        let mut config: Config = serde_yaml::from_str("projects: {}").expect("yaml parses");
        config.api_user = user.map(String::from);
        config.api_password = password.map(String::from);

        let (tx, _rx) = mpsc::channel(1);
        let state = Arc::new(AppState {
            config,
            pipelines: PipelineStore::open_memory().await,
            logs: None,
            actions_tx: tx,
        });
        Router::new()
            .route("/protected", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                state,
                require_basic_auth,
            ))
    }

    fn with_auth(user: &str, password: &str) -> HttpRequest<Body> {
        let encoded = BASE64.encode(format!("{user}:{password}"));
        HttpRequest::get("/protected")
            .header(header::AUTHORIZATION, format!("Basic {encoded}"))
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn open_when_credentials_not_configured() {
        for (user, password) in [(None, None), (Some("admin"), None), (None, Some("pw"))] {
            let router = router_with_credentials(user, password).await;
            let response = router
                .oneshot(HttpRequest::get("/protected").body(Body::empty()).expect("request"))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn missing_credentials_get_challenged() {
        let router = router_with_credentials(Some("admin"), Some("pw")).await;
        let response = router
            .oneshot(HttpRequest::get("/protected").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get(header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok()),
            Some(CHALLENGE)
        );
    }

    #[tokio::test]
    async fn wrong_credentials_are_rejected() {
        let router = router_with_credentials(Some("admin"), Some("pw")).await;
        let response = router
            .oneshot(with_auth("admin", "wrong"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn correct_credentials_pass() {
        let router = router_with_credentials(Some("admin"), Some("pw")).await;
        let response = router.oneshot(with_auth("admin", "pw")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
