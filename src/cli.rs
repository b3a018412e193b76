//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::commands;

/// Repo Control - compile declarative configuration into repository artifacts
#[derive(Parser, Debug)]
#[command(name = "repo-control")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile the configuration and synchronize the repository to match
    Apply(commands::apply::ApplyArgs),

    /// Compile the configuration without touching the filesystem
    Check(commands::check::CheckArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let level: LevelFilter = self
            .log_level
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid log level '{}'", self.log_level))?;
        env_logger::Builder::new().filter_level(level).init();

        match self.command {
            Commands::Apply(args) => commands::apply::execute(args),
            Commands::Check(args) => commands::check::execute(args),
        }
    }
}
