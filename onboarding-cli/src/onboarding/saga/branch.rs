//! Execution of a single branch: the lead, then its secondary steps in order

use serde_json::{Value, json};

use super::report::{BranchResult, SubStep, SubStepOutcome};
use crate::api::store::{Collaborators, Notification};
use crate::onboarding::settings::{
    BUSINESS_LINK, CONTACT_LINK, CREATED_BY, LEAD_LINK, OnboardingSettings,
};
use crate::onboarding::types::{Category, OnboardingSubmission, Record};

/// State shared by every branch of one saga run; read-only once the parent exists
pub(super) struct BranchContext<'a> {
    pub collab: Collaborators<'a>,
    pub settings: &'a OnboardingSettings,
    pub correlation_id: &'a str,
    pub submission: &'a OnboardingSubmission,
    pub parent_id: &'a str,
    /// Ids of the parent's contacts, `None` when their creation failed
    pub contact_ids: Option<&'a [String]>,
}

impl BranchContext<'_> {
    fn stamp(&self, mut record: Record, link: &str, id: &str) -> Record {
        record.insert(link.to_string(), Value::String(id.to_string()));
        record.insert(
            CREATED_BY.to_string(),
            Value::String(self.settings.actor.clone()),
        );
        record
    }

    async fn bulk(&self, collection: &str, records: Vec<Record>, empty: &str) -> SubStepOutcome {
        if records.is_empty() {
            return SubStepOutcome::Skipped {
                reason: empty.to_string(),
            };
        }
        match self.collab.bulk.bulk_create(collection, records).await {
            Ok(ids) => SubStepOutcome::Completed { count: ids.len() },
            Err(e) => SubStepOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }
}

/// Run one branch to a terminal state. Only the lead creation decides the status.
pub(super) async fn run_branch(ctx: &BranchContext<'_>, categories: Vec<Category>) -> BranchResult {
    let mut result = BranchResult::pending(categories);
    let label = result.label();
    let collections = &ctx.settings.collections;
    let dependent = &ctx.submission.dependent;

    log::info!("Creating lead for {}", label);
    let lead = ctx.stamp(
        dependent.to_record(&result.categories),
        BUSINESS_LINK,
        ctx.parent_id,
    );

    let lead_id = match ctx.collab.entities.create(&collections.leads, lead).await {
        Ok(id) => id,
        Err(e) => {
            log::error!("Lead for {} failed: {}", label, e);
            result.fail(e.to_string());
            return result;
        }
    };

    log::info!("Lead {} created for {}", lead_id, label);
    result.succeed(lead_id.clone());
    ctx.collab.notifier.notify(Notification {
        event: "lead_created".to_string(),
        correlation_id: Some(ctx.correlation_id.to_string()),
        payload: json!({
            "lead_id": lead_id,
            "business_id": ctx.parent_id,
            "categories": result.categories,
        }),
    });

    let outcome = upload_documents(ctx, &result.categories, &lead_id).await;
    record_sub_step(&mut result, SubStep::Documents, outcome);

    let notes = dependent
        .notes
        .iter()
        .filter(|n| !n.text.trim().is_empty())
        .map(|n| ctx.stamp(n.to_record(), LEAD_LINK, &lead_id))
        .collect();
    let outcome = ctx.bulk(&collections.notes, notes, "no follow-up notes").await;
    record_sub_step(&mut result, SubStep::FollowUpNotes, outcome);

    let associates = dependent
        .associates
        .iter()
        .map(|a| ctx.stamp(a.to_record(), LEAD_LINK, &lead_id))
        .collect();
    let outcome = ctx.bulk(&collections.associates, associates, "no associates").await;
    record_sub_step(&mut result, SubStep::Associates, outcome);

    let outcome = match ctx.contact_ids {
        None => SubStepOutcome::Skipped {
            reason: "business contacts were not created".to_string(),
        },
        Some(ids) => {
            let links = ids
                .iter()
                .map(|contact_id| {
                    let mut link = Record::new();
                    link.insert(CONTACT_LINK.to_string(), Value::String(contact_id.clone()));
                    ctx.stamp(link, LEAD_LINK, &lead_id)
                })
                .collect();
            ctx.bulk(&collections.lead_contacts, links, "no contacts").await
        }
    };
    record_sub_step(&mut result, SubStep::ContactLinks, outcome);

    let competitors = dependent
        .competitors
        .iter()
        .map(|c| ctx.stamp(c.to_record(), LEAD_LINK, &lead_id))
        .collect();
    let outcome = ctx.bulk(&collections.competitors, competitors, "no competitors").await;
    record_sub_step(&mut result, SubStep::Competitors, outcome);

    result
}

fn record_sub_step(result: &mut BranchResult, step: SubStep, outcome: SubStepOutcome) {
    match &outcome {
        SubStepOutcome::Failed { reason } => {
            log::warn!("{}: {} failed, lead kept: {}", result.label(), step, reason)
        }
        SubStepOutcome::Completed { count } => {
            log::debug!("{}: {} {} created", result.label(), count, step)
        }
        SubStepOutcome::Skipped { reason } => {
            log::debug!("{}: {} skipped ({})", result.label(), step, reason)
        }
    }
    result.record(step, outcome);
}

async fn upload_documents(
    ctx: &BranchContext<'_>,
    categories: &[Category],
    lead_id: &str,
) -> SubStepOutcome {
    let documents = ctx.submission.documents.for_branch(categories);
    if documents.is_empty() {
        return SubStepOutcome::Skipped {
            reason: "no documents".to_string(),
        };
    }

    let mut uploads = Vec::with_capacity(documents.len());
    for document in documents {
        match document.load().await {
            Ok(upload) => uploads.push(upload),
            Err(e) => {
                return SubStepOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        }
    }

    let count = uploads.len();
    match ctx.collab.documents.upload(lead_id, uploads).await {
        Ok(()) => SubStepOutcome::Completed { count },
        Err(e) => SubStepOutcome::Failed {
            reason: e.to_string(),
        },
    }
}
