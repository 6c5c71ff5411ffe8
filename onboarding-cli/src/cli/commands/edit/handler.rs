//! Edit command handler

use anyhow::{Context, Result};
use colored::*;
use dialoguer::Confirm;
use serde::Deserialize;
use uuid::Uuid;

use super::EditCommands;
use crate::api::Collaborators;
use crate::cli::OutputFormat;
use crate::cli::commands::{backend_client, fill_wizard, read_structured};
use crate::config::Config;
use crate::onboarding::edit::{EditReport, EditSession};
use crate::onboarding::types::{
    Competitor, ContactBook, ContactPerson, Document, OnboardingSubmission, Record,
};
use crate::onboarding::wizard::{Effect, Msg, Wizard};

/// Changes to apply on top of the loaded records.
///
/// Scalar fields are merged one by one. `contacts` and `competitors` replace
/// the whole list when present: entries with an existing id are updated,
/// entries without an id are created and loaded entries left out are deleted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EditFile {
    pub business: Record,
    pub currencies: Option<Vec<String>>,
    pub contacts: Option<Vec<ContactPerson>>,
    pub lead: Record,
    pub competitors: Option<Vec<Competitor>>,
    /// New files attached to the lead
    pub documents: Vec<Document>,
}

impl EditFile {
    pub fn merge_into(self, drafts: &mut OnboardingSubmission) {
        drafts.parent.fields.extend(self.business);
        if let Some(currencies) = self.currencies {
            drafts.parent.currencies = currencies;
        }
        if let Some(contacts) = self.contacts {
            drafts.parent.contacts = ContactBook::new(contacts);
        }

        drafts.dependent.fields.extend(self.lead);
        if let Some(competitors) = self.competitors {
            drafts.dependent.competitors = competitors;
        }
        drafts.documents.common.extend(self.documents);
    }

    fn touches_lead(&self) -> bool {
        !self.lead.is_empty() || self.competitors.is_some() || !self.documents.is_empty()
    }
}

pub async fn handle_edit_command(args: EditCommands, config: &Config) -> Result<()> {
    let edits: EditFile = read_structured(&args.file)?;
    if args.lead.is_none() && edits.touches_lead() {
        log::warn!("Lead changes in {} are ignored without --lead", args.file.display());
    }

    let settings = config.onboarding_settings();
    let correlation_id = Uuid::new_v4().to_string();
    let client = backend_client(config, &correlation_id)?;

    let session = EditSession::load(&client, &settings, &args.parent_id, args.lead.as_deref())
        .await
        .with_context(|| format!("Failed to load business {}", args.parent_id))?;

    let mut wizard = Wizard::edit(session).context("Loaded records cannot be edited")?;
    let mut drafts = wizard.drafts().clone();
    if args.lead.is_some() {
        edits.merge_into(&mut drafts);
    } else {
        EditFile {
            lead: Record::new(),
            competitors: None,
            documents: Vec::new(),
            ..edits
        }
        .merge_into(&mut drafts);
    }
    fill_wizard(&mut wizard, drafts)?;

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Apply changes to business {}?", args.parent_id))
            .default(true)
            .interact()
            .context("Failed to read confirmation")?;

        if !confirmed {
            wizard.update(Msg::Cancel)?;
            wizard.update(Msg::ConfirmCancel)?;
            println!("{}", "Cancelled, nothing was changed".yellow());
            return Ok(());
        }
    }

    let submission = match wizard.update(Msg::Submit)? {
        Effect::ApplyEdit(submission) => submission,
        other => anyhow::bail!("Unexpected wizard effect on submit: {:?}", other),
    };

    let session = wizard
        .session()
        .context("Edit wizard has no session attached")?;
    let report = session
        .apply(Collaborators::from_backend(&client), &settings, &submission)
        .await;
    wizard
        .commit_edit(&report)
        .context("Failed to record the applied changes")?;

    match args.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize edit report")?
        ),
        OutputFormat::Text => print_report(&report),
    }

    if !report.is_success() {
        anyhow::bail!("Some changes could not be saved");
    }
    Ok(())
}

fn print_report(report: &EditReport) {
    if !report.has_changes() {
        println!("{}", "No changes detected".dimmed());
        return;
    }

    let headline = if report.is_success() {
        "Changes saved".green().bold()
    } else {
        "Changes partially saved".yellow().bold()
    };
    println!("{}", headline);
    for line in report.summary().lines() {
        println!("  {}", line);
    }
}
