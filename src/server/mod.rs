//! HTTP server lifecycle: router assembly, plain/TLS accept loop, and the
//! two-phase shutdown (HTTP drains first so nothing new is enqueued, then
//! in-flight actions drain; a second interrupt cancels them).

mod basic_auth;
mod inspect;
mod webhook;

use anyhow::{anyhow, bail, Context};
use axum::body::Bytes;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::service::TowerToHyperService;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::{LogStore, PipelineStore};
use crate::receiver;
use crate::runner::ActionRunner;
use crate::AppState;

/// Graceful deadline for in-flight HTTP connections during phase 1.
pub const HTTP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long phase 2 stays quiet before telling the user actions are still
/// draining.
const DRAIN_NOTICE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ServerError {
    /// Misconfiguration detected while assembling the server; fatal before
    /// any traffic is accepted.
    #[error("error creating the server: {0:#}")]
    Setup(#[source] anyhow::Error),
    #[error("error running the server: {0:#}")]
    Run(#[source] anyhow::Error),
    #[error("error shutting down the server: {0:#}")]
    Shutdown(#[source] anyhow::Error),
}

/// Run the receiver until the first interrupt, then drain per the two-phase
/// shutdown protocol. Both stores are closed before returning.
pub async fn run(
    config: Config,
    pipelines: PipelineStore,
    logs: Option<LogStore>,
) -> Result<(), ServerError> {
    let runner = ActionRunner::new(pipelines.clone());
    let state = Arc::new(AppState {
        actions_tx: runner.sender(),
        pipelines: pipelines.clone(),
        logs: logs.clone(),
        config: config.clone(),
    });

    let router = build_router(state).map_err(ServerError::Setup)?;
    let mut signals = Signals::install().map_err(|e| ServerError::Run(e.into()))?;

    let http_result = run_http(&config, router, &mut signals).await;
    if http_result.is_ok() {
        tracing::info!("Server closed");
        drain_runner(&runner, &mut signals).await;
    }

    pipelines.close().await;
    if let Some(logs) = logs {
        logs.close().await;
    }

    http_result
}

/// Assemble the router: one webhook route per project plus the inspection
/// API. Capability mismatches between a project's credentials and its
/// provider are refused here, before the server accepts traffic.
pub fn build_router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let mut router = Router::new();

    for (name, project) in &state.config.projects {
        let receiver = receiver::for_project(project);
        let caps = receiver.capabilities();
        if project.authorization.as_deref().is_some_and(|a| !a.is_empty()) && !caps.can_authorize {
            bail!(
                "project '{name}': 'authorization' is configured but the {} receiver \
                 does not support authorization headers, use 'secret' instead",
                project.git_provider
            );
        }
        if project.secret.as_deref().is_some_and(|s| !s.is_empty()) && !caps.can_verify_signature {
            bail!(
                "project '{name}': 'secret' is configured but the {} receiver does not \
                 support signature verification, use 'authorization' instead",
                project.git_provider
            );
        }

        let ctx = Arc::new(webhook::ProjectContext {
            name: name.clone(),
            project: project.clone(),
            receiver,
            state: state.clone(),
        });
        router = router.route(
            &format!("/{name}"),
            post(move |headers: HeaderMap, body: Bytes| webhook::handle(ctx.clone(), headers, body)),
        );
        tracing::debug!(
            project = %name,
            provider = %project.git_provider,
            repo = %project.repo,
            "Registered project"
        );
    }

    if !state.config.disable_api {
        router = router.merge(inspect::router(state));
    }

    Ok(router.layer(TraceLayer::new_for_http()))
}

/// Phase 1: serve until the first signal, then drain connections under the
/// shutdown deadline.
async fn run_http(
    config: &Config,
    router: Router,
    signals: &mut Signals,
) -> Result<(), ServerError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))
        .map_err(ServerError::Run)?;

    let tls = match (&config.ssl.cert_file_path, &config.ssl.key_file_path) {
        (Some(cert), Some(key)) => {
            tracing::info!(
                addr = %addr,
                cert = %cert.display(),
                key = %key.display(),
                "Running the server with SSL"
            );
            Some(tls_acceptor(cert, key).map_err(ServerError::Setup)?)
        }
        _ => {
            tracing::info!(addr = %addr, "Running the server");
            None
        }
    };

    let connections = TaskTracker::new();
    loop {
        tokio::select! {
            _ = signals.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _remote)) => {
                    spawn_connection(&connections, stream, tls.clone(), router.clone());
                }
                Err(err) => {
                    tracing::error!(error = %err, "Error accepting connection");
                }
            }
        }
    }

    drop(listener);
    connections.close();
    tracing::info!("Shutting down the HTTP server");
    if tokio::time::timeout(HTTP_SHUTDOWN_TIMEOUT, connections.wait())
        .await
        .is_err()
    {
        return Err(ServerError::Shutdown(anyhow!(
            "open connections did not finish within {HTTP_SHUTDOWN_TIMEOUT:?}"
        )));
    }
    Ok(())
}

fn spawn_connection(
    tracker: &TaskTracker,
    stream: TcpStream,
    tls: Option<TlsAcceptor>,
    router: Router,
) {
    tracker.spawn(async move {
        let service = TowerToHyperService::new(router);
        let builder = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new());
        let result = match tls {
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(tls_stream) => builder.serve_connection(TokioIo::new(tls_stream), service).await,
                Err(err) => {
                    tracing::debug!(error = %err, "TLS handshake failed");
                    return;
                }
            },
            None => builder.serve_connection(TokioIo::new(stream), service).await,
        };
        if let Err(err) = result {
            tracing::debug!(error = %err, "Connection error");
        }
    });
}

/// Phase 2: wait for in-flight actions. After a short quiet window the user
/// is told how to force things; a second signal cancels the workers.
async fn drain_runner(runner: &ActionRunner, signals: &mut Signals) {
    let drained = runner.wait();
    tokio::pin!(drained);

    tokio::select! {
        _ = &mut drained => {
            tracing::info!("Actions completed");
            return;
        }
        _ = tokio::time::sleep(DRAIN_NOTICE_DELAY) => {
            tracing::info!("Waiting for actions to complete... Press ctrl+c again to forcefully close");
        }
    }

    tokio::select! {
        _ = &mut drained => {
            tracing::info!("Actions completed");
        }
        _ = signals.recv() => {
            runner.cancel();
            tracing::warn!("Actions interrupted");
            drained.await;
        }
    }
}

fn tls_acceptor(cert_path: &Path, key_path: &Path) -> anyhow::Result<TlsAcceptor> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("failed to create TLS server config")?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open certificate file {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse certificates")?;
    if certs.is_empty() {
        bail!("no certificates found in {}", path.display());
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> anyhow::Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open private key file {}", path.display()))?;
    let mut reader = BufReader::new(file);
    loop {
        match rustls_pemfile::read_one(&mut reader)? {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(PrivateKeyDer::Pkcs1(key)),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(PrivateKeyDer::Pkcs8(key)),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(PrivateKeyDer::Sec1(key)),
            Some(_) => continue,
            None => break,
        }
    }
    bail!("no private key found in {}", path.display())
}

/// SIGINT/SIGTERM as a stream; each `recv` consumes one signal, so the
/// first drives phase 1 and a second one acts as the phase-2 escape hatch.
struct Signals {
    rx: mpsc::Receiver<()>,
}

impl Signals {
    fn install() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(4);

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut interrupt = signal(SignalKind::interrupt())?;
            let mut terminate = signal(SignalKind::terminate())?;
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = interrupt.recv() => {}
                        _ = terminate.recv() => {}
                    }
                    if tx.send(()).await.is_err() {
                        break;
                    }
                }
            });
        }

        #[cfg(not(unix))]
        {
            tokio::spawn(async move {
                loop {
                    if tokio::signal::ctrl_c().await.is_err() {
                        break;
                    }
                    if tx.send(()).await.is_err() {
                        break;
                    }
                }
            });
        }

        Ok(Self { rx })
    }

    async fn recv(&mut self) {
        if self.rx.recv().await.is_none() {
            // signal task is gone; never resolve instead of busy-looping
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Action, GitProvider, Project};
    use std::collections::BTreeMap;

    fn base_config(provider: GitProvider, authorization: Option<&str>, secret: Option<&str>) -> Config {
        let yaml = "projects: {}";
        let mut config: Config = serde_yaml::from_str(yaml).expect("yaml parses");
        config.projects = BTreeMap::from([(
            "site".to_string(),
            Project {
                git_provider: provider,
                repo: "me/site".to_string(),
                authorization: authorization.map(String::from),
                secret: secret.map(String::from),
                actions: vec![Action {
                    on: "push".to_string(),
                    branch: "master".to_string(),
                    cwd: None,
                    user: None,
                    script: None,
                    run: Some(vec!["true".to_string()]),
                }],
            },
        )]);
        config
    }

    async fn try_build(config: Config) -> anyhow::Result<Router> {
        let pipelines = PipelineStore::open_memory().await;
        let (tx, _rx) = mpsc::channel(1);
        build_router(Arc::new(AppState {
            config,
            pipelines,
            logs: None,
            actions_tx: tx,
        }))
    }

    #[tokio::test]
    async fn refuses_authorization_on_github() {
        let config = base_config(GitProvider::Github, Some("tok"), None);
        assert!(try_build(config).await.is_err());
    }

    #[tokio::test]
    async fn refuses_secret_on_gitlab() {
        let config = base_config(GitProvider::Gitlab, None, Some("sec"));
        assert!(try_build(config).await.is_err());
    }

    #[tokio::test]
    async fn accepts_matching_capabilities() {
        assert!(try_build(base_config(GitProvider::Gitea, Some("tok"), Some("sec"))).await.is_ok());
        assert!(try_build(base_config(GitProvider::Github, None, Some("sec"))).await.is_ok());
        assert!(try_build(base_config(GitProvider::Gitlab, Some("tok"), None)).await.is_ok());
    }
}
