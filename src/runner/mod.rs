//! The action runner: a channel-fed worker pool executing dispatched
//! actions.
//!
//! The webhook handler sends [`ActionDescriptor`]s into a capacity-1 bounded
//! channel; a saturated runner therefore applies backpressure to inbound
//! webhook requests instead of buffering or dropping work. A single
//! dispatcher task drains the channel and spawns one tracked worker per
//! descriptor. Workers observe a shared cancellation token; see
//! [`ActionRunner::cancel`] and [`ActionRunner::wait`] for the drain
//! protocol.

mod exec;
mod proc;
mod script;

pub use proc::ProcAttrError;
pub use script::ScriptError;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::Action;
use crate::db::PipelineStore;

#[derive(Debug, Clone, Serialize)]
pub struct ActionIdentifier {
    #[serde(rename = "actionIdx")]
    pub index: usize,
    #[serde(rename = "pipeId")]
    pub pipe_id: String,
    pub project: String,
    #[serde(skip)]
    pub delivery_id: String,
}

/// Identifier plus a snapshot of the action configuration; workers never
/// reach back into the live config.
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    pub ident: ActionIdentifier,
    pub action: Action,
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("exit status {0}")]
    ExitStatus(i32),
    #[error("failed to start command '{command}': {source}")]
    Start {
        command: String,
        source: std::io::Error,
    },
    #[error("action cancelled during shutdown")]
    Cancelled,
    #[error("action has neither 'run' nor 'script' configured")]
    NothingToRun,
    #[error(transparent)]
    Proc(#[from] ProcAttrError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct ActionRunner {
    tx: mpsc::Sender<ActionDescriptor>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl ActionRunner {
    /// Start the dispatcher task. Workers write their records to `store`.
    pub fn new(store: PipelineStore) -> Self {
        let (tx, mut rx) = mpsc::channel::<ActionDescriptor>(1);
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();

        let worker_tracker = tracker.clone();
        let worker_cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(descriptor) = rx.recv().await {
                worker_tracker.spawn(exec::execute_action(
                    store.clone(),
                    descriptor,
                    worker_cancel.clone(),
                ));
            }
        });

        Self {
            tx,
            tracker,
            cancel,
        }
    }

    /// Producer handle for the dispatch channel; `send().await` blocks while
    /// the runner is saturated.
    pub fn sender(&self) -> mpsc::Sender<ActionDescriptor> {
        self.tx.clone()
    }

    /// Broadcast cancellation to every in-flight worker. Cooperative: the
    /// workers forward signals to their subprocesses and finish their
    /// records.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until all in-flight workers have finished.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::db::PipelineStatus;
    use std::time::Duration;

    fn echo_descriptor(pipe_id: &str) -> ActionDescriptor {
        ActionDescriptor {
            ident: ActionIdentifier {
                index: 0,
                pipe_id: pipe_id.to_string(),
                project: "proj".to_string(),
                delivery_id: "d-1".to_string(),
            },
            action: Action {
                on: "push".to_string(),
                branch: "master".to_string(),
                cwd: None,
                user: None,
                script: None,
                run: Some(vec!["echo".to_string(), "done".to_string()]),
            },
        }
    }

    #[tokio::test]
    async fn dispatched_actions_run_and_close_their_records() {
        let store = PipelineStore::open_memory().await;
        let runner = ActionRunner::new(store.clone());

        let sender = runner.sender();
        sender.send(echo_descriptor("run-1")).await.expect("send");
        sender.send(echo_descriptor("run-2")).await.expect("send");
        drop(sender);

        // give the dispatcher a moment to pick both up, then drain
        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::time::timeout(Duration::from_secs(5), runner.wait())
            .await
            .expect("runner drains");

        for pipe_id in ["run-1", "run-2"] {
            let record = store.get_record(pipe_id).await.expect("query").expect("row");
            assert_eq!(record.status(), PipelineStatus::Ok, "pipe {pipe_id}");
            assert_eq!(record.output.as_deref(), Some("done\n"));
        }
    }

    #[tokio::test]
    async fn identifier_serializes_for_webhook_responses() {
        let ident = ActionIdentifier {
            index: 1,
            pipe_id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            project: "site".to_string(),
            delivery_id: "hidden".to_string(),
        };
        let json = serde_json::to_value(&ident).expect("serializes");
        assert_eq!(json["actionIdx"], 1);
        assert_eq!(json["pipeId"], "01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert_eq!(json["project"], "site");
        assert!(json.get("delivery_id").is_none());
    }
}
