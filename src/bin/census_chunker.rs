use std::process::ExitCode;

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use census_chunker::config::{ConfigLoader, ResolvedConfig};
use census_chunker::error::ChunkerError;
use census_chunker::nomis::NomisHttpClient;
use census_chunker::output::{
    ConsoleProgress, JsonOutput, OutputMode, print_reset_summary, print_resolve_summary,
    print_run_summary, print_status_summary,
};
use census_chunker::pipeline::{self, Pipeline, ProgressSink};
use census_chunker::progress::FileProgressStore;
use census_chunker::sink::ConfiguredConnector;

#[derive(Parser)]
#[command(name = "census-chunker")]
#[command(about = "Stream NOMIS population estimates into chunked CSV blobs, resuming after a crash")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch the dataset and upload it chunk by chunk (default)")]
    Run,
    #[command(about = "Resolve the geography range and print the data URL")]
    Resolve,
    #[command(about = "Show where the next run would resume")]
    Status,
    #[command(about = "Delete the progress file so the next run starts from chunk 0")]
    Reset,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ChunkerError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ChunkerError) -> u8 {
    match error {
        ChunkerError::Configuration(_)
        | ChunkerError::InvalidDatasetId(_)
        | ChunkerError::ConfigRead(_)
        | ChunkerError::ConfigParse(_) => 2,
        ChunkerError::DataIntegrity(_) | ChunkerError::InvalidGeographyCode(_) => 4,
        err if err.is_remote() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("census_chunker=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let progress = FileProgressStore::new(config.progress_path.clone());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_pipeline(config, &progress, output_mode),
        Commands::Resolve => run_resolve(config, output_mode),
        Commands::Status => {
            let result = pipeline::status(&config, &progress)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_status(&result).into_diagnostic()?,
                OutputMode::Human => print_status_summary(&result),
            }
            Ok(())
        }
        Commands::Reset => {
            let result = pipeline::reset(&progress)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_reset(&result).into_diagnostic()?,
                OutputMode::Human => print_reset_summary(&result),
            }
            Ok(())
        }
    }
}

fn progress_sink(output_mode: OutputMode) -> Box<dyn ProgressSink> {
    match output_mode {
        OutputMode::Json => Box::new(JsonOutput),
        OutputMode::Human => Box::new(ConsoleProgress),
    }
}

fn run_pipeline(
    config: ResolvedConfig,
    progress: &FileProgressStore,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let client = NomisHttpClient::new(&config.api_base)?;
    let connector = ConfiguredConnector::from_config(&config.sink);
    let app = Pipeline::new(config, client);
    let sink = progress_sink(output_mode);
    let result = app.run(connector, progress, sink.as_ref())?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&result).into_diagnostic()?,
        OutputMode::Human => print_run_summary(&result),
    }
    Ok(())
}

fn run_resolve(config: ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let client = NomisHttpClient::new(&config.api_base)?;
    let app = Pipeline::new(config, client);
    let sink = progress_sink(output_mode);
    let result = app.resolve(sink.as_ref())?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_resolve(&result).into_diagnostic()?,
        OutputMode::Human => print_resolve_summary(&result),
    }
    Ok(())
}
