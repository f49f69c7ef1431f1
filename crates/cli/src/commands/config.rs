//! Configuration Commands

use std::path::Path;

use anyhow::{bail, Result};
use clap::Subcommand;
use tablewright_common::HarnessConfig;

use crate::output::{print_success, print_warning};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration (file, defaults and environment)
    Show,

    /// Write a configuration file populated with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn execute(cmd: ConfigCommands, config: &HarnessConfig, path: &Path) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            if !path.exists() {
                print_warning(&format!("{} not found, showing defaults", path.display()));
            }
            print!("{}", config.to_toml()?);
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            HarnessConfig::default().save(path)?;
            print_success(&format!("Wrote {}", path.display()));
        }
    }
    Ok(())
}
