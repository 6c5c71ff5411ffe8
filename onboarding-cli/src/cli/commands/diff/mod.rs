//! `diff`: offline minimal patch between two records

mod handler;

pub use handler::handle_diff_command;

use clap::Args;
use std::path::PathBuf;

use crate::cli::OutputFormat;
use crate::onboarding::types::EntityKind;

#[derive(Args, Debug)]
pub struct DiffCommands {
    /// Record as loaded from the backend (.json or .toml)
    pub original: PathBuf,

    /// Record as edited
    pub current: PathBuf,

    /// Entity kind, selects array and text-only fields
    #[arg(long, value_enum)]
    pub kind: EntityKind,

    /// Keep an unparseable array field as a single element instead of failing
    #[arg(long)]
    pub lenient: bool,

    /// Print the original record with the patch applied instead of the patch
    #[arg(long)]
    pub apply: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
