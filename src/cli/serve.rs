use std::process::ExitCode;

use crate::config::Config;
use crate::db::{LogStore, PipelineStore};
use crate::logging;
use crate::server::{self, ServerError};

use super::{exit, EXIT_ACTIONS_DB, EXIT_CONFIG, EXIT_LOGS_DB, EXIT_RUN, EXIT_SHUTDOWN};

/// Run the webhook receiver until shutdown completes.
pub async fn serve(config: Config) -> ExitCode {
    let pipelines = match PipelineStore::open(&config.actions_db_file).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Error opening actions db: {err:#}");
            return exit(EXIT_ACTIONS_DB);
        }
    };

    let logs = if config.logs_db_file.as_os_str().is_empty() {
        None
    } else {
        match LogStore::open(&config.logs_db_file).await {
            Ok(store) => Some(store),
            Err(err) => {
                eprintln!("Error opening logs db: {err:#}");
                return exit(EXIT_LOGS_DB);
            }
        }
    };

    if let Err(err) = logging::init(&config.log_level, logs.clone()) {
        eprintln!("Error setting up the logger: {err:#}");
        return exit(EXIT_LOGS_DB);
    }
    tracing::debug!(config = ?config.masked(), "Configuration loaded");

    match server::run(config, pipelines, logs).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ ServerError::Setup(_)) => {
            tracing::error!(error = %err, "Refusing to start");
            exit(EXIT_CONFIG)
        }
        Err(err @ ServerError::Run(_)) => {
            tracing::error!(error = %err, "Server failed");
            exit(EXIT_RUN)
        }
        Err(err @ ServerError::Shutdown(_)) => {
            tracing::error!(error = %err, "Shutdown did not complete cleanly");
            exit(EXIT_SHUTDOWN)
        }
    }
}
