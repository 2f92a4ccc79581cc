// Copyright 2026 Prospect Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use prospect::cli;

#[derive(Parser)]
#[command(
    name = "prospect",
    about = "Prospect: procurement-forecast scraper and normalizer",
    version,
    after_help = "Run 'prospect <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape one source end to end
    Run {
        /// Source name or short name
        source: String,
    },
    /// Scrape every seeded source in sequence
    RunAll {
        /// Ignore refresh windows and run everything
        #[arg(long)]
        force: bool,
    },
    /// Show run status for one source or all of them
    Status {
        /// Source name or short name (omit for all)
        source: Option<String>,
    },
    /// List seeded sources
    Sources,
    /// Seed sources from a JSON document
    Seed {
        /// Path to the seed file
        file: String,
    },
    /// Check environment and diagnose issues
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Global flags travel as env vars so every module can check them.
    if cli.json {
        std::env::set_var("PROSPECT_JSON", "1");
    }
    if cli.verbose {
        std::env::set_var("PROSPECT_VERBOSE", "1");
    }

    let default_filter = if cli.verbose { "prospect=debug" } else { "prospect=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run { source } => cli::run_cmd::run(&source).await,
        Commands::RunAll { force } => cli::run_all_cmd::run(force).await,
        Commands::Status { source } => cli::status_cmd::run(source.as_deref()).await,
        Commands::Sources => cli::sources_cmd::run().await,
        Commands::Seed { file } => cli::seed_cmd::run(&file).await,
        Commands::Doctor => cli::doctor::run().await,
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
