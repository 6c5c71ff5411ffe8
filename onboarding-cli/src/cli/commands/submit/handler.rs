//! Submit command handler

use anyhow::{Context, Result};
use colored::*;
use dialoguer::Confirm;
use uuid::Uuid;

use super::SubmitCommands;
use crate::api::{Collaborators, MemoryBackend};
use crate::cli::OutputFormat;
use crate::cli::commands::{backend_client, fill_wizard};
use crate::config::Config;
use crate::onboarding::saga::{SagaReport, SagaRunner, plan_branches};
use crate::onboarding::types::{Category, OnboardingSubmission};
use crate::onboarding::wizard::{Effect, Msg, Wizard};

pub async fn handle_submit_command(args: SubmitCommands, config: &Config) -> Result<()> {
    let submission = OnboardingSubmission::from_file(&args.file)?;
    let settings = config.onboarding_settings();

    let mut wizard = Wizard::create();
    fill_wizard(&mut wizard, submission)?;

    let plan = plan_branches(&wizard.drafts().dependent);
    if args.format == OutputFormat::Text {
        print_plan(wizard.drafts(), &plan);
    }

    if !args.yes && !args.dry_run {
        let confirmed = Confirm::new()
            .with_prompt(format!("Create the business and {} lead(s)?", plan.len()))
            .default(true)
            .interact()
            .context("Failed to read confirmation")?;

        if !confirmed {
            wizard.update(Msg::Cancel)?;
            wizard.update(Msg::ConfirmCancel)?;
            println!("{}", "Cancelled, nothing was created".yellow());
            return Ok(());
        }
    }

    let submission = match wizard.update(Msg::Submit)? {
        Effect::RunSaga(submission) => submission,
        other => anyhow::bail!("Unexpected wizard effect on submit: {:?}", other),
    };

    let correlation_id = Uuid::new_v4().to_string();
    let report = if args.dry_run {
        let backend = MemoryBackend::new();
        for (kind, collection) in &args.failures {
            log::info!("Simulating {} failures on {}", kind, collection);
            backend.fail_always(*kind, collection);
        }
        let report = SagaRunner::new(Collaborators::from_backend(&backend), &settings)
            .with_correlation_id(correlation_id.as_str())
            .run(&submission)
            .await;

        if args.format == OutputFormat::Text {
            println!("{}", "Dry run, calls that would be made:".bold());
            for result in backend.journal() {
                let line = result.operation.describe();
                if result.is_success() {
                    println!("  {}", line.dimmed());
                } else {
                    println!("  {} {}", line.red(), "(failed)".red());
                }
            }
            println!();
        }
        report
    } else {
        let client = backend_client(config, &correlation_id)?;
        println!(
            "Submitting to {} (correlation id {})",
            client.base_url().cyan(),
            correlation_id.dimmed()
        );
        SagaRunner::new(Collaborators::from_backend(&client), &settings)
            .with_correlation_id(correlation_id.as_str())
            .run(&submission)
            .await
    };

    match args.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize saga report")?
        ),
        OutputFormat::Text => print_report(&report),
    }

    if let Some(hard) = &report.hard_failure {
        anyhow::bail!("Onboarding failed: {}", hard);
    }
    Ok(())
}

fn print_plan(drafts: &OnboardingSubmission, plan: &[Vec<Category>]) {
    println!(
        "Business: {} ({} contact(s))",
        drafts.parent.name().bright_green().bold(),
        drafts.parent.contacts.len()
    );
    println!("Branch mode: {}", drafts.dependent.mode);
    for categories in plan {
        let label: Vec<&str> = categories.iter().map(Category::as_str).collect();
        println!(
            "  lead for {} with {} document(s)",
            label.join(" + ").cyan(),
            drafts.documents.for_branch(categories).len()
        );
    }
    println!();
}

fn print_report(report: &SagaReport) {
    let headline = if report.is_hard_failure() {
        "Onboarding failed".red().bold()
    } else if report.failed() > 0 {
        "Onboarding partially succeeded".yellow().bold()
    } else {
        "Onboarding complete".green().bold()
    };
    println!("{}", headline);

    for line in report.summary().lines() {
        println!("{}", line);
    }

    if let Some(parent_id) = &report.parent_id {
        println!("Business id: {}", parent_id.cyan());
    }
}
