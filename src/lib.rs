pub mod cli;
pub mod config;
pub mod crypto;
pub mod db;
pub mod logging;
pub mod receiver;
pub mod runner;
pub mod server;

use tokio::sync::mpsc;

use config::Config;
use db::{LogStore, PipelineStore};
use runner::ActionDescriptor;

/// Shared state for HTTP handlers. Configuration is immutable after load;
/// the stores are internally synchronized; the action sender applies
/// backpressure when the runner is saturated.
pub struct AppState {
    pub config: Config,
    pub pipelines: PipelineStore,
    pub logs: Option<LogStore>,
    pub actions_tx: mpsc::Sender<ActionDescriptor>,
}
