//! # Repo Control CLI
//!
//! Binary entry point for the `repo-control` command-line tool.
//!
//! Its responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Initializing logging from the global `--log-level` flag.
//! - Dispatching to the selected subcommand and translating failures into
//!   user-facing output.
//!
//! All core logic lives in the library crate; the binary is a thin wrapper.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
