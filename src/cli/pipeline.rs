use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::Config;
use crate::db::{PipelineRecord, PipelineStore};

use super::{exit, format_bytes, format_ts, EXIT_ACTIONS_DB, EXIT_CONFIG};

#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// Id of the pipeline to display (defaults to the most recent one)
    pub pipe_id: Option<String>,

    /// Actions db file (defaults to the file specified in config)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Display only pipeline general info, without its output
    #[arg(short, long)]
    pub info: bool,

    /// Display only pipeline output, without general info
    #[arg(short, long)]
    pub output_only: bool,
}

pub async fn pipeline(config: Config, args: PipelineArgs) -> ExitCode {
    if args.info && args.output_only {
        eprintln!("Unable to specify both info-only and output-only flags");
        return exit(EXIT_CONFIG);
    }

    let file = args.file.unwrap_or(config.actions_db_file);
    let store = match PipelineStore::open(&file).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Error opening actions db: {err:#}");
            return exit(EXIT_ACTIONS_DB);
        }
    };

    let record = match store.get_record(args.pipe_id.as_deref().unwrap_or("")).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            eprintln!("Unable to find the pipeline record");
            return exit(EXIT_ACTIONS_DB);
        }
        Err(err) => {
            eprintln!("Unable to get the pipeline record: {err}");
            return exit(EXIT_ACTIONS_DB);
        }
    };

    if !args.output_only {
        print_details(&record);
        if !args.info {
            println!();
        }
    }
    if !args.info {
        if let Some(output) = &record.output {
            print!("{output}");
        }
    }
    ExitCode::SUCCESS
}

fn print_details(record: &PipelineRecord) {
    let ended_at = record.ended_at.map(format_ts).unwrap_or_default();
    let output_length = match &record.output {
        Some(output) => format_bytes(output.len()),
        None => "null".to_string(),
    };

    println!("pipeId        : {}", record.pipe_id);
    println!("project       : {}", record.project);
    println!("deliveryId    : {}", record.delivery_id);
    println!("config        : {}", record.config);
    println!("status        : {}", record.status());
    println!("error         : {}", record.error.as_deref().unwrap_or_default());
    println!("output length : {output_length}");
    println!("created at    : {}", format_ts(record.created_at));
    println!("ended at      : {ended_at}");
}
