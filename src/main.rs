use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use hookpipe::cli::{self, ListPipelinesArgs, LogsArgs, PipelineArgs};
use hookpipe::config::Config;

#[derive(Parser, Debug)]
#[command(name = "hookpipe")]
#[command(author, version, about = "Self-hosted git webhook receiver that runs your deploy pipelines", long_about = None)]
struct Cli {
    /// Configuration file name
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook receiver server (default mode)
    Serve,

    /// Display pipeline details and output
    #[command(visible_aliases = ["pl", "get"])]
    Pipeline(PipelineArgs),

    /// Display a list of recent pipelines
    #[command(name = "list-pipelines", visible_alias = "ls")]
    ListPipelines(ListPipelinesArgs),

    /// Query the structured log store
    Logs(LogsArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Unable to load configuration file, aborting: {err:#}");
            return ExitCode::from(cli::EXIT_CONFIG);
        }
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => cli::serve(config).await,
        Commands::Pipeline(args) => cli::pipeline(config, args).await,
        Commands::ListPipelines(args) => cli::list_pipelines(config, args).await,
        Commands::Logs(args) => cli::logs(config, args).await,
    }
}
