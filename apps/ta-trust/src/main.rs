//! # ta-trust
//!
//! Command-line driver for trust graduation.
//!
//! - `ta-trust status`: current autonomy level of every category
//! - `ta-trust check <category>`: explain what the next pass would do
//! - `ta-trust evaluate`: run a graduation pass and log transitions
//! - `ta-trust metrics set`: record metrics for a category by hand
//! - `ta-trust events tail`: recent transitions
//!
//! `evaluate` is meant to be run periodically (cron, systemd timer, CI job).

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ta_graduation::{ThresholdConfig, TrustPaths};

/// Trusted Autonomy trust graduation: earned autonomy per action category.
#[derive(Parser)]
#[command(name = "ta-trust", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Threshold config file (defaults to .ta/graduation.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the autonomy level of every category.
    Status,
    /// Explain every gate the next pass would check for a category.
    Check {
        /// Category identifier (e.g., "email_replies").
        category: String,
    },
    /// Run demotion and graduation checks across all categories.
    Evaluate {
        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Record category metrics.
    Metrics {
        #[command(subcommand)]
        command: commands::metrics::MetricsCommands,
    },
    /// Inspect the transition event log.
    Events {
        #[command(subcommand)]
        command: commands::events::EventsCommands,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays clean on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ta_graduation=info".parse()?)
                .add_directive("ta_trust=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let paths = TrustPaths::for_project(&project_root);
    let config_file = cli.config.unwrap_or_else(|| paths.config_file.clone());
    let thresholds = ThresholdConfig::load_or_default(&config_file)
        .with_context(|| format!("loading thresholds from {}", config_file.display()))?;
    tracing::debug!(
        "project root {}, thresholds from {}",
        project_root.display(),
        config_file.display()
    );

    let ctx = commands::TrustContext { paths, thresholds };

    match &cli.command {
        Commands::Status => commands::status::execute(&ctx),
        Commands::Check { category } => commands::check::execute(&ctx, category),
        Commands::Evaluate { dry_run } => commands::evaluate::execute(&ctx, *dry_run),
        Commands::Metrics { command } => commands::metrics::execute(command, &ctx),
        Commands::Events { command } => commands::events::execute(command, &ctx),
    }
}
