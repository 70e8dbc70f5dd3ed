//! Worker-side execution of a single dispatched action.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Action;
use crate::db::PipelineStore;

use super::proc::ProcAttrs;
use super::script;
use super::{ActionDescriptor, ActionError};

/// Grace period between SIGINT and SIGKILL for cancelled script commands.
pub(crate) const KILL_TIMEOUT: Duration = Duration::from_secs(30);

/// Run one action end to end: open the pipeline record, execute, capture
/// output, close the record. Never panics and never returns an error; every
/// failure ends up in the record or the log.
pub(crate) async fn execute_action(
    store: PipelineStore,
    descriptor: ActionDescriptor,
    cancel: CancellationToken,
) {
    let span = tracing::info_span!(
        "action",
        project = %descriptor.ident.project,
        delivery_id = %descriptor.ident.delivery_id,
        pipe_id = %descriptor.ident.pipe_id,
    );
    run_recorded(store, descriptor, cancel).instrument(span).await;
}

async fn run_recorded(
    store: PipelineStore,
    descriptor: ActionDescriptor,
    cancel: CancellationToken,
) {
    let ident = &descriptor.ident;
    tracing::info!(action_index = ident.index, "Running action");

    if let Err(err) = store
        .create_record(
            &ident.pipe_id,
            &ident.project,
            &ident.delivery_id,
            &descriptor.action,
        )
        .await
    {
        tracing::error!(error = %err, "Error creating the pipeline record, action will not run");
        return;
    }

    let close = |error: Option<String>, output: String| {
        let store = store.clone();
        let pipe_id = ident.pipe_id.clone();
        async move {
            if let Err(err) = store
                .close_record(&pipe_id, error.as_deref(), &output)
                .await
            {
                tracing::error!(error = %err, "Error closing the pipeline record");
            }
        }
    };

    let mut capture = match tempfile::tempfile() {
        Ok(file) => file,
        Err(err) => {
            tracing::error!(error = %err, "Error creating a temporary file for output capture");
            close(Some(format!("output capture setup failed: {err}")), String::new()).await;
            return;
        }
    };

    let result = run_action(&descriptor.action, &capture, &cancel).await;
    match &result {
        Ok(()) => tracing::info!("Action successfully finished"),
        Err(err) => tracing::error!(error = %err, "Error while running the action"),
    }

    let output = match read_capture(&mut capture) {
        Ok(output) => output,
        Err(err) => {
            tracing::error!(error = %err, "Error reading the captured action output");
            String::new()
        }
    };

    close(result.err().map(|e| e.to_string()), output).await;
}

async fn run_action(
    action: &Action,
    capture: &File,
    cancel: &CancellationToken,
) -> Result<(), ActionError> {
    let attrs = ProcAttrs::for_user(action.user.as_deref())?;
    if let Some(user) = action.user.as_deref().filter(|u| !u.is_empty()) {
        tracing::debug!(user, "Running as a dedicated user");
    }

    if let Some(argv) = action.run.as_deref().filter(|r| !r.is_empty()) {
        tracing::debug!(command = ?argv, "Running the command");
        run_argv(argv, action.cwd.as_deref(), attrs, capture, cancel).await
    } else if let Some(source) = action.script.as_deref() {
        tracing::debug!("Running the script");
        script::execute_script(
            source,
            action.cwd.as_deref(),
            attrs,
            capture.try_clone()?,
            cancel,
        )
        .await
    } else {
        // configuration validation makes this unreachable in practice
        Err(ActionError::NothingToRun)
    }
}

async fn run_argv(
    argv: &[String],
    cwd: Option<&str>,
    attrs: ProcAttrs,
    capture: &File,
    cancel: &CancellationToken,
) -> Result<(), ActionError> {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    if let Some(cwd) = cwd.filter(|c| !c.is_empty()) {
        cmd.current_dir(cwd);
    }
    attrs.apply(&mut cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(capture.try_clone()?))
        .stderr(Stdio::from(capture.try_clone()?));

    let mut child = cmd.spawn().map_err(|source| ActionError::Start {
        command: argv[0].clone(),
        source,
    })?;

    let (status, cancelled) = wait_with_cancel(&mut child, cancel, CancelMode::InterruptOnly).await?;
    if cancelled && !status.success() {
        return Err(ActionError::Cancelled);
    }
    match status_code(status) {
        0 => Ok(()),
        code => Err(ActionError::ExitStatus(code)),
    }
}

pub(crate) enum CancelMode {
    /// Forward SIGINT and keep waiting.
    InterruptOnly,
    /// Forward SIGINT, then SIGKILL after the grace period.
    InterruptThenKill(Duration),
}

/// Wait for the child, forwarding cancellation. Returns the exit status and
/// whether cancellation fired before the child finished.
pub(crate) async fn wait_with_cancel(
    child: &mut Child,
    cancel: &CancellationToken,
    mode: CancelMode,
) -> std::io::Result<(ExitStatus, bool)> {
    tokio::select! {
        status = child.wait() => Ok((status?, false)),
        _ = cancel.cancelled() => {
            interrupt(child);
            match mode {
                CancelMode::InterruptOnly => Ok((child.wait().await?, true)),
                CancelMode::InterruptThenKill(grace) => {
                    tokio::select! {
                        status = child.wait() => Ok((status?, true)),
                        _ = tokio::time::sleep(grace) => {
                            child.start_kill()?;
                            Ok((child.wait().await?, true))
                        }
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
fn interrupt(child: &mut Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGINT);
        }
    }
}

/// No interrupt equivalent off Unix; kill immediately.
#[cfg(not(unix))]
fn interrupt(child: &mut Child) {
    let _ = child.start_kill();
}

/// Map an exit status to its shell-convention code: exit code as-is,
/// `128 + signal` for signaled processes.
pub(crate) fn status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal().map(|sig| 128 + sig).unwrap_or(1)
    }
    #[cfg(not(unix))]
    {
        1
    }
}

fn read_capture(capture: &mut File) -> std::io::Result<String> {
    capture.seek(SeekFrom::Start(0))?;
    let mut output = String::new();
    capture.read_to_string(&mut output)?;
    Ok(output)
}
