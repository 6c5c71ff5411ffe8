//! Command line interface

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use commands::diff::DiffCommands;
use commands::edit::EditCommands;
use commands::submit::SubmitCommands;

#[derive(Parser)]
#[command(name = "onboarding-cli")]
#[command(version)]
#[command(about = "Onboard businesses with their leads and edit them with minimal updates")]
pub struct Cli {
    /// Config file (defaults to <config_dir>/onboarding-cli/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a business, its contacts and one lead per category
    Submit(SubmitCommands),
    /// Update an existing business (and optionally one lead) with only what changed
    Edit(EditCommands),
    /// Show the minimal patch between two JSON records
    Diff(DiffCommands),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
