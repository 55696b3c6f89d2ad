// swapfix CLI - detect and repair day/month transposed dates in a record store

mod commands;
mod exit_codes;
mod store;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use swapfix_recon::ReconError;

use exit_codes::{recon_exit_code, EXIT_SUCCESS};

#[derive(Parser)]
#[command(name = "swapfix")]
#[command(about = "Find and repair stored dates whose day and month were swapped")]
#[command(version)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true, env = "SWAPFIX_CONFIG", default_value = "swapfix.toml")]
    config: PathBuf,

    /// API key for REST sources (overrides the env var named by api_key_env)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Log more (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count swapped records in the most recent window without writing
    #[command(after_help = "\
Examples:
  swapfix analyze
  swapfix analyze --limit 500 --samples 20
  swapfix --config orders.toml analyze --json
  swapfix analyze --output analysis.json")]
    Analyze {
        /// Scan this many most recently created records (overrides run.batch_limit)
        #[arg(long)]
        limit: Option<usize>,

        /// Swapped records to show as evidence (overrides run.sample_size)
        #[arg(long)]
        samples: Option<usize>,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write JSON report to file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Rewrite each swapped stored date to its corrected value
    #[command(after_help = "\
Examples:
  swapfix fix --dry-run
  swapfix fix
  swapfix fix --limit 200 --json
  swapfix fix && swapfix verify")]
    Fix {
        /// Scan this many most recently created records (overrides run.batch_limit)
        #[arg(long)]
        limit: Option<usize>,

        /// Plan corrections without writing them
        #[arg(long)]
        dry_run: bool,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write JSON report to file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Re-scan the window and fail if any swapped records remain
    #[command(after_help = "\
Examples:
  swapfix verify
  swapfix verify --json
  swapfix verify --limit 5000 --output verify.json")]
    Verify {
        /// Scan this many most recently created records (overrides run.batch_limit)
        #[arg(long)]
        limit: Option<usize>,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write JSON report to file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Count records whose stored date is exactly DATE
    #[command(after_help = "\
Examples:
  swapfix count --date 2026-05-02
  swapfix count --date 2026-02-05 --json")]
    Count {
        /// Stored date to count (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date_arg)]
        date: NaiveDate,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Config file operations
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Parse and validate the config without touching the store
    #[command(after_help = "\
Examples:
  swapfix config check
  swapfix --config orders.toml config check")]
    Check,
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD ({e})"))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // `log` records from the library crates are bridged by the subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = commands::Context {
        config_path: cli.config,
        api_key: cli.api_key,
    };

    let result = match cli.command {
        Commands::Analyze { limit, samples, json, output } => {
            commands::cmd_analyze(&ctx, limit, samples, json, output)
        }
        Commands::Fix { limit, dry_run, json, output } => {
            commands::cmd_fix(&ctx, limit, dry_run, json, output)
        }
        Commands::Verify { limit, json, output } => commands::cmd_verify(&ctx, limit, json, output),
        Commands::Count { date, json } => commands::cmd_count(&ctx, date, json),
        Commands::Config(ConfigCommands::Check) => commands::cmd_config_check(&ctx),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        let code = recon_exit_code(&err);
        let hint = match &err {
            ReconError::InvalidLimit(_) => Some("--limit must be at least 1".to_string()),
            ReconError::Source(_) => {
                Some("check that the store is reachable and the credentials are valid".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }
}
