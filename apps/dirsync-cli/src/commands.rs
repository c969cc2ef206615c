//! Command-line surface of the `dirsync` binary.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use crate::config::PipelineConfig;
use crate::error::CliResult;
use crate::logging::{init_logging, LogFormat};
use crate::pipeline::{Collaborators, Pipeline};

/// dirsync - Stage directory records and replay them into profiles
#[derive(Debug, Parser)]
#[command(name = "dirsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run every step of a pipeline file
    Run(RunArgs),

    /// Check a pipeline file without connecting to anything
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Pipeline YAML file
    #[arg(short, long, env = "DIRSYNC_CONFIG")]
    pub config: PathBuf,

    /// Timestamp to use as "now" for delta windows (RFC 3339)
    #[arg(long, value_parser = parse_timestamp)]
    pub now: Option<DateTime<Utc>>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Log level or filter directive; RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Pipeline YAML file
    #[arg(short, long, env = "DIRSYNC_CONFIG")]
    pub config: PathBuf,
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

pub async fn execute(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Validate(args) => validate(args),
    }
}

async fn run(args: RunArgs) -> CliResult<()> {
    init_logging(args.log_format, &args.log_level)?;

    let config = PipelineConfig::load(&args.config)?;
    let mut pipeline = Pipeline::build(&config, &Collaborators::from_config(&config))?;

    let now = args.now.unwrap_or_else(Utc::now);
    let report = pipeline.run(now).await;

    for summary in &report.summaries {
        println!("{summary}");
    }
    for (step, entry) in pipeline.errors() {
        eprintln!("{step}: [{}] {}", entry.code, entry.message);
    }

    match report.failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn validate(args: ValidateArgs) -> CliResult<()> {
    let config = PipelineConfig::load(&args.config)?;
    Pipeline::build(&config, &Collaborators::from_config(&config))?;
    println!(
        "Configuration OK: {} step(s) in {}",
        config.step_count(),
        args.config.display()
    );
    Ok(())
}
