pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use booker_core::chrono::{DateTime, Utc};
use booker_core::config::{AppConfig, LoadOptions, LogFormat};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::parse_timestamp;

#[derive(Debug, Parser)]
#[command(
    name = "booker",
    about = "Discovery call booking operator CLI",
    long_about = "Inspect configuration, apply migrations, check contact eligibility, record attempts, query manager availability and run an end-to-end smoke booking.",
    after_help = "Examples:\n  booker config\n  booker schedule --lead L-1 --region us-east\n  booker availability --manager M-1 --from 2026-03-03T13:00:00Z --to 2026-03-03T17:00:00Z\n  booker smoke"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a booker.toml file (must exist when given)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Check whether a lead may be contacted now")]
    Schedule {
        #[arg(long)]
        lead: String,
        #[arg(long, help = "Region key such as us-east; unknown regions use the default window")]
        region: String,
        #[arg(
            long,
            value_parser = parse_timestamp,
            help = "Evaluation time (RFC 3339), defaults to now"
        )]
        at: Option<DateTime<Utc>>,
    },
    #[command(about = "Append a contact attempt to a lead's history")]
    RecordAttempt {
        #[arg(long)]
        lead: String,
        #[arg(long)]
        attempt_no: u32,
        #[arg(long, help = "answered | no_answer | busy | voicemail | failed | opt_out")]
        outcome: String,
        #[arg(long)]
        region: Option<String>,
        #[arg(
            long,
            value_parser = parse_timestamp,
            help = "Attempt time (RFC 3339), defaults to now"
        )]
        at: Option<DateTime<Utc>>,
    },
    #[command(about = "List a manager's slots with their availability")]
    Availability {
        #[arg(long)]
        manager: String,
        #[arg(long, value_parser = parse_timestamp)]
        from: DateTime<Utc>,
        #[arg(long, value_parser = parse_timestamp)]
        to: DateTime<Utc>,
        #[arg(
            long,
            value_parser = parse_timestamp,
            help = "Clock used to expire holds, defaults to now"
        )]
        at: Option<DateTime<Utc>>,
    },
    #[command(about = "Run readiness checks and a scripted booking with per-check timing")]
    Smoke,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };
    // Commands report config failures themselves; logging just falls back to defaults.
    init_logging(&AppConfig::load(options.clone()).unwrap_or_default());

    let result = match cli.command {
        Command::Config => commands::config::run(&options),
        Command::Migrate => commands::migrate::run(&options),
        Command::Schedule { lead, region, at } => {
            commands::attempts::schedule(&options, &lead, &region, at)
        }
        Command::RecordAttempt { lead, attempt_no, outcome, region, at } => {
            commands::attempts::record(&options, &lead, attempt_no, &outcome, region, at)
        }
        Command::Availability { manager, from, to, at } => {
            commands::availability::run(&options, &manager, from, to, at)
        }
        Command::Smoke => commands::smoke::run(&options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout carries exactly one JSON document.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
