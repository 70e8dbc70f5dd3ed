//! Logger fan-out: a text sink on stdout plus, when a log store is
//! configured, a SQLite sink. Both sit behind the same level filter.

mod db_layer;

pub use db_layer::DbLayer;

use anyhow::{bail, Result};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::db::LogStore;

pub fn level_from_str(level: &str) -> Result<Level> {
    match level {
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => bail!("Unexpected log level '{other}'"),
    }
}

/// Install the global subscriber. Must run inside a tokio runtime: the
/// database sink spawns its writer task at construction.
pub fn init(level: &str, store: Option<LogStore>) -> Result<()> {
    let level = level_from_str(level)?;
    let filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(store.map(DbLayer::new))
        .init();
    Ok(())
}
