use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::Config;
use crate::db::{
    level_name, parse_log_level, EntryQuery, FilteredEntryQuery, LogEntry, LogEntryView, LogStore,
};

use super::{exit, format_ts, OutputFormat, EXIT_CONFIG, EXIT_LOGS_DB};

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Logs db file (defaults to the file specified in config)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Maximum number of log entries to output
    #[arg(short, long, default_value_t = 20)]
    pub limit: i64,

    /// Skip first N entries
    #[arg(short, long, default_value_t = 0)]
    pub skip: i64,

    /// Filter by level (debug, info, warn, error; repeatable)
    #[arg(short = 'e', long = "level")]
    pub levels: Vec<String>,

    /// Filter by project
    #[arg(short, long)]
    pub project: Option<String>,

    /// Filter by deliveryId
    #[arg(short, long)]
    pub delivery_id: Option<String>,

    /// Filter by the action's pipeId
    #[arg(short = 'a', long)]
    pub pipe_id: Option<String>,

    /// Filter by message
    #[arg(short, long)]
    pub message: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

pub async fn logs(config: Config, args: LogsArgs) -> ExitCode {
    let mut levels = Vec::new();
    for name in &args.levels {
        match parse_log_level(name) {
            Some(level) => levels.push(level),
            None => {
                eprintln!("Unknown log level '{name}', expected debug, info, warn or error");
                return exit(EXIT_CONFIG);
            }
        }
    }

    let file = args.file.unwrap_or(config.logs_db_file);
    if file.as_os_str().is_empty() {
        eprintln!("No logs db configured");
        return exit(EXIT_LOGS_DB);
    }
    let store = match LogStore::open(&file).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Error opening logs db: {err:#}");
            return exit(EXIT_LOGS_DB);
        }
    };

    let query = FilteredEntryQuery {
        base: EntryQuery {
            cursor_ts: 0,
            cursor_id: 0,
            page_size: args.limit,
            offset: args.skip,
        },
        levels,
        project: args.project.unwrap_or_default(),
        delivery_id: args.delivery_id.unwrap_or_default(),
        pipe_id: args.pipe_id.unwrap_or_default(),
        message: args.message.unwrap_or_default(),
    };
    let entries = match store.get_entries_filtered(&query).await {
        Ok(entries) => entries,
        Err(err) => {
            eprintln!("Error retrieving the records: {err}");
            return exit(EXIT_LOGS_DB);
        }
    };

    match args.format {
        OutputFormat::Simple => format_simple(&entries),
        OutputFormat::Jq => {
            for entry in &entries {
                match serde_json::to_string_pretty(&LogEntryView::from(entry)) {
                    Ok(json) => println!("{json}"),
                    Err(err) => eprintln!("Error serializing entry: {err}"),
                }
            }
        }
        OutputFormat::Json => {
            let views: Vec<LogEntryView> = entries.iter().map(LogEntryView::from).collect();
            match serde_json::to_string_pretty(&views) {
                Ok(json) => println!("{json}"),
                Err(err) => eprintln!("Error serializing entries: {err}"),
            }
        }
    }
    ExitCode::SUCCESS
}

fn format_simple(entries: &[LogEntry]) {
    for entry in entries {
        println!(
            "{} {:5} {} {} {} {} {}",
            format_ts(entry.ts),
            level_name(entry.level),
            entry.message,
            entry.project.as_deref().unwrap_or_default(),
            entry.delivery_id.as_deref().unwrap_or_default(),
            entry.pipe_id.as_deref().unwrap_or_default(),
            entry.data,
        );
    }
}
