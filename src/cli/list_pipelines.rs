use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::Config;
use crate::db::{ListPipelinesQuery, PipelineRecord, PipelineStore, PipelineView};

use super::{exit, format_time_only, format_ts, OutputFormat, EXIT_ACTIONS_DB, EXIT_CONFIG};

#[derive(Args, Debug)]
pub struct ListPipelinesArgs {
    /// Actions db file (defaults to the file specified in config)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Maximum number of pipeline records to output
    #[arg(short, long, default_value_t = 20)]
    pub limit: i64,

    /// Skip first N records
    #[arg(short, long, default_value_t = 0)]
    pub skip: i64,

    /// Filter by project
    #[arg(short, long)]
    pub project: Option<String>,

    /// Filter by deliveryId
    #[arg(short, long)]
    pub delivery_id: Option<String>,

    /// Filter by status (any, ok, error, pending)
    #[arg(long, default_value = "any")]
    pub status: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

pub async fn list_pipelines(config: Config, args: ListPipelinesArgs) -> ExitCode {
    let status = match args.status.parse() {
        Ok(status) => status,
        Err(err) => {
            eprintln!("{err}");
            return exit(EXIT_CONFIG);
        }
    };

    let file = args.file.unwrap_or(config.actions_db_file);
    let store = match PipelineStore::open(&file).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Error opening actions db: {err:#}");
            return exit(EXIT_ACTIONS_DB);
        }
    };

    let query = ListPipelinesQuery {
        offset: args.skip,
        limit: args.limit,
        project: args.project.unwrap_or_default(),
        delivery_id: args.delivery_id.unwrap_or_default(),
        status,
    };
    let records = match store.list_records(&query).await {
        Ok(records) => records,
        Err(err) => {
            eprintln!("Error reading actions db: {err}");
            return exit(EXIT_ACTIONS_DB);
        }
    };

    match args.format {
        OutputFormat::Simple => format_simple(&records),
        OutputFormat::Jq => {
            for record in &records {
                let view = PipelineView::from_record(record, false);
                match serde_json::to_string_pretty(&view) {
                    Ok(json) => println!("{json}"),
                    Err(err) => eprintln!("Error serializing record: {err}"),
                }
            }
        }
        OutputFormat::Json => {
            let views: Vec<PipelineView> = records
                .iter()
                .map(|record| PipelineView::from_record(record, false))
                .collect();
            match serde_json::to_string_pretty(&views) {
                Ok(json) => println!("{json}"),
                Err(err) => eprintln!("Error serializing records: {err}"),
            }
        }
    }
    ExitCode::SUCCESS
}

fn format_simple(records: &[PipelineRecord]) {
    for record in records {
        let created_at = format_ts(record.created_at);
        let ended_at = record
            .ended_at
            .map(format_time_only)
            .unwrap_or_else(|| "...".to_string());
        let result = match record.error.as_deref() {
            Some(error) if !error.is_empty() => error,
            _ => "ok",
        };
        println!(
            "{created_at}-{ended_at} {} {} {result}",
            record.pipe_id, record.project
        );
    }
}
