//! Tablewright CLI - Main Entry Point
//!
//! Validates table schemas, lists resolved element addresses, inspects
//! findings reports, prints the effective configuration and probes a live
//! page through the Playwright bridge.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tablewright_common::{HarnessConfig, SchemaCatalog};

mod commands;
mod output;

use commands::{addresses, check, config, findings, probe};

/// Tablewright - regression harness for schema-described data-entry tables
#[derive(Parser)]
#[command(name = "tablewright")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Harness configuration file
    #[arg(long, default_value = "tablewright.toml", env = "TABLEWRIGHT_CONFIG", global = true)]
    config: PathBuf,

    /// Extra directory of YAML table schemas (overrides `schemas_dir`)
    #[arg(long, global = true)]
    schemas: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the schema catalog and report address collisions
    Check,

    /// List the resolved addresses of a table's columns
    Addresses(addresses::AddressesArgs),

    /// Inspect a findings report
    Findings(findings::FindingsArgs),

    /// Show or initialize the harness configuration
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Read a table from a live page
    Probe(probe::ProbeArgs),

    /// Show version information
    Version,
}

/// Built-in schemas plus any YAML schemas from the configured directory
pub fn load_catalog(config: &HarnessConfig, extra: Option<&Path>) -> anyhow::Result<SchemaCatalog> {
    let mut catalog = SchemaCatalog::builtin();
    if let Some(dir) = extra.or(config.schemas_dir.as_deref()) {
        catalog
            .load_dir(dir)
            .with_context(|| format!("loading schemas from {}", dir.display()))?;
    }
    Ok(catalog)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let harness = HarnessConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Check => check::execute(&harness, cli.schemas.as_deref(), cli.format)?,
        Commands::Addresses(args) => {
            addresses::execute(args, &harness, cli.schemas.as_deref(), cli.format)?
        }
        Commands::Findings(args) => findings::execute(args, cli.format)?,
        Commands::Config(cmd) => config::execute(cmd, &harness, &cli.config)?,
        Commands::Probe(args) => {
            probe::execute(args, &harness, cli.schemas.as_deref(), cli.format).await?
        }
        Commands::Version => {
            println!("Tablewright CLI v{}", tablewright_common::VERSION);
        }
    }

    Ok(())
}
