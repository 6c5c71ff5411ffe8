//! Diff command handler

use anyhow::{Context, Result};
use colored::*;
use serde_json::Value;

use super::DiffCommands;
use crate::cli::OutputFormat;
use crate::cli::commands::read_structured;
use crate::config::Config;
use crate::onboarding::diff::{Patch, apply_patch, diff_records};
use crate::onboarding::snapshot::ArrayFieldPolicy;
use crate::onboarding::types::Record;

pub fn handle_diff_command(args: DiffCommands, config: &Config) -> Result<()> {
    let original: Record = read_structured(&args.original)?;
    let current: Record = read_structured(&args.current)?;

    let policy = if args.lenient {
        ArrayFieldPolicy::Lenient
    } else {
        config.normalizer.array_policy
    };

    let patch = diff_records(&original, &current, args.kind, policy)
        .context("Records could not be normalized")?;

    if args.apply {
        let patched = apply_patch(&original, &patch);
        println!(
            "{}",
            serde_json::to_string_pretty(&patched).context("Failed to serialize record")?
        );
        return Ok(());
    }

    match args.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&patch).context("Failed to serialize patch")?
        ),
        OutputFormat::Text => print_patch(&patch, &original),
    }
    Ok(())
}

fn print_patch(patch: &Patch, original: &Record) {
    if patch.is_empty() {
        println!("{}", "No changes detected".dimmed());
        return;
    }

    println!("{} field(s) changed:", patch.len().to_string().bold());
    for (field, value) in patch.changes() {
        let before = original.get(field).map(render).unwrap_or_else(|| "-".to_string());
        let after = if value.is_null() {
            "(cleared)".red().to_string()
        } else {
            render(value).green().to_string()
        };
        println!("  {}: {} -> {}", field.cyan(), before.dimmed(), after);
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
