//! CLI subcommand handlers.
//!
//! `serve` runs the receiver; the query commands (`pipeline`,
//! `list-pipelines`, `logs`) open the store files directly, so they work
//! whether or not a server is running.

mod list_pipelines;
mod logs;
mod pipeline;
mod serve;

pub use list_pipelines::{list_pipelines, ListPipelinesArgs};
pub use logs::{logs, LogsArgs};
pub use pipeline::{pipeline, PipelineArgs};
pub use serve::serve;

use std::process::ExitCode;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_ACTIONS_DB: u8 = 3;
pub const EXIT_LOGS_DB: u8 = 4;
pub const EXIT_RUN: u8 = 5;
pub const EXIT_SHUTDOWN: u8 = 6;

pub(crate) fn exit(code: u8) -> ExitCode {
    ExitCode::from(code)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Simple,
    Jq,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OutputFormat::Simple => "simple",
            OutputFormat::Jq => "jq",
            OutputFormat::Json => "json",
        })
    }
}

pub(crate) fn format_ts(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

pub(crate) fn format_time_only(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;
const TIB: f64 = GIB * 1024.0;

pub(crate) fn format_bytes(bytes: usize) -> String {
    let b = bytes as f64;
    if b >= TIB {
        format!("{:.2} TiB", b / TIB)
    } else if b >= GIB {
        format!("{:.2} GiB", b / GIB)
    } else if b >= MIB {
        format!("{:.2} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.2} KiB", b / KIB)
    } else {
        format!("{bytes}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_format_picks_the_right_unit() {
        assert_eq!(format_bytes(0), "0");
        assert_eq!(format_bytes(512), "512");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GiB");
    }

    #[test]
    fn timestamps_render_in_utc() {
        assert_eq!(format_ts(1_700_000_000), "2023-11-14 22:13:20");
        assert_eq!(format_time_only(1_700_000_000), "22:13:20");
    }
}
