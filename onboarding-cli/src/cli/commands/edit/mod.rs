//! `edit`: minimal-diff update of an existing business and lead

mod handler;

pub use handler::{EditFile, handle_edit_command};

use clap::Args;
use std::path::PathBuf;

use crate::cli::OutputFormat;

#[derive(Args, Debug)]
pub struct EditCommands {
    /// Id of the business to edit
    pub parent_id: String,

    /// Edits file (.toml or .json); only the fields it names change
    pub file: PathBuf,

    /// Also edit this lead and its competitors
    #[arg(long)]
    pub lead: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
