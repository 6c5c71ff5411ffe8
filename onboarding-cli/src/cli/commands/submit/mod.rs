//! `submit`: run the onboarding saga for a drafted submission

mod handler;

pub use handler::handle_submit_command;

use clap::Args;
use std::path::PathBuf;

use crate::api::CallKind;
use crate::cli::OutputFormat;

#[derive(Args, Debug)]
pub struct SubmitCommands {
    /// Submission file (.toml or .json)
    pub file: PathBuf,

    /// Run against an in-memory backend and print the calls that would be made
    #[arg(long)]
    pub dry_run: bool,

    /// With --dry-run, fail every call of KIND on COLLECTION (e.g. `create:leads`)
    #[arg(long = "fail", value_name = "KIND:COLLECTION", value_parser = parse_failure, requires = "dry_run")]
    pub failures: Vec<(CallKind, String)>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

fn parse_failure(value: &str) -> Result<(CallKind, String), String> {
    let (kind, collection) = value
        .split_once(':')
        .ok_or_else(|| format!("expected KIND:COLLECTION, got '{}'", value))?;
    if collection.trim().is_empty() {
        return Err("collection name is empty".to_string());
    }
    Ok((kind.trim().parse()?, collection.trim().to_string()))
}
