//! Branch saga orchestrator
//!
//! Creates the business, then runs one branch per category (fan-out) or a
//! single branch for all categories (unified). Branches run strictly one after
//! another; a failed branch never blocks the next one and nothing already
//! created is rolled back. After the last branch the business is flagged as
//! having leads, exactly once.

mod branch;
pub mod report;

pub use report::{SagaError, SagaReport, SubStepOutcome};

use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::store::{Collaborators, Notification};
use crate::onboarding::settings::{
    BUSINESS_LINK, CREATED_BY, OnboardingSettings, PARENT_FLAG, UPDATED_BY,
};
use crate::onboarding::types::{BranchMode, Category, DependentDraft, OnboardingSubmission, Record};
use branch::{BranchContext, run_branch};

/// Categories covered by each branch, in execution order
pub fn plan_branches(dependent: &DependentDraft) -> Vec<Vec<Category>> {
    let mut categories: Vec<Category> = Vec::new();
    for category in &dependent.categories {
        if !categories.contains(category) {
            categories.push(category.clone());
        }
    }

    match dependent.mode {
        BranchMode::FanOut => categories.into_iter().map(|c| vec![c]).collect(),
        BranchMode::Unified => vec![categories],
    }
}

/// Runs one onboarding saga against a set of collaborators
pub struct SagaRunner<'a> {
    collab: Collaborators<'a>,
    settings: &'a OnboardingSettings,
    correlation_id: String,
}

impl<'a> SagaRunner<'a> {
    pub fn new(collab: Collaborators<'a>, settings: &'a OnboardingSettings) -> Self {
        Self {
            collab,
            settings,
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub async fn run(&self, submission: &OnboardingSubmission) -> SagaReport {
        let collections = &self.settings.collections;
        let parent = &submission.parent;
        log::info!(
            "[{}] Starting onboarding of '{}' ({} mode, {} categories)",
            self.correlation_id,
            parent.name(),
            submission.dependent.mode,
            submission.dependent.categories.len()
        );

        let mut record = parent.to_record();
        record.insert(CREATED_BY.to_string(), Value::String(self.settings.actor.clone()));

        let parent_id = match self.collab.entities.create(&collections.businesses, record).await {
            Ok(id) => id,
            Err(e) => {
                log::error!("[{}] Business creation failed: {}", self.correlation_id, e);
                return SagaReport {
                    correlation_id: self.correlation_id.clone(),
                    parent_id: None,
                    hard_failure: Some(SagaError::HardFailure {
                        reason: e.to_string(),
                    }),
                    parent_contacts: None,
                    branches: Vec::new(),
                    parent_flagged: false,
                };
            }
        };
        log::info!("[{}] Business {} created", self.correlation_id, parent_id);

        let (parent_contacts, contact_ids) = self.create_contacts(submission, &parent_id).await;

        let ctx = BranchContext {
            collab: self.collab,
            settings: self.settings,
            correlation_id: &self.correlation_id,
            submission,
            parent_id: &parent_id,
            contact_ids: contact_ids.as_deref(),
        };

        let mut branches = Vec::new();
        for categories in plan_branches(&submission.dependent) {
            let result = run_branch(&ctx, categories).await;
            debug_assert!(result.status.is_terminal());
            branches.push(result);
        }

        let parent_flagged = self.flag_parent(&parent_id).await;

        let report = SagaReport {
            correlation_id: self.correlation_id.clone(),
            parent_id: Some(parent_id.clone()),
            hard_failure: None,
            parent_contacts: Some(parent_contacts),
            branches,
            parent_flagged,
        };

        log::info!(
            "[{}] Onboarding finished: {} succeeded, {} failed",
            self.correlation_id,
            report.succeeded(),
            report.failed()
        );
        self.collab.notifier.notify(Notification {
            event: "saga_completed".to_string(),
            correlation_id: Some(self.correlation_id.clone()),
            payload: json!({
                "business_id": parent_id,
                "succeeded": report.succeeded(),
                "failed": report.failed(),
            }),
        });

        report
    }

    /// Bulk-create the business contacts so branches can link them
    async fn create_contacts(
        &self,
        submission: &OnboardingSubmission,
        parent_id: &str,
    ) -> (SubStepOutcome, Option<Vec<String>>) {
        let contacts = &submission.parent.contacts;
        if contacts.is_empty() {
            return (
                SubStepOutcome::Skipped {
                    reason: "no contacts".to_string(),
                },
                Some(Vec::new()),
            );
        }

        let records: Vec<Record> = contacts
            .iter()
            .map(|contact| {
                let mut record = contact.to_record();
                record.insert(BUSINESS_LINK.to_string(), Value::String(parent_id.to_string()));
                record.insert(CREATED_BY.to_string(), Value::String(self.settings.actor.clone()));
                record
            })
            .collect();

        match self
            .collab
            .bulk
            .bulk_create(&self.settings.collections.contacts, records)
            .await
        {
            Ok(ids) => {
                log::info!("[{}] {} contact(s) created", self.correlation_id, ids.len());
                (SubStepOutcome::Completed { count: ids.len() }, Some(ids))
            }
            Err(e) => {
                log::warn!(
                    "[{}] Contacts of business {} failed: {}",
                    self.correlation_id,
                    parent_id,
                    e
                );
                (
                    SubStepOutcome::Failed {
                        reason: e.to_string(),
                    },
                    None,
                )
            }
        }
    }

    /// Single best-effort write after every branch is terminal
    async fn flag_parent(&self, parent_id: &str) -> bool {
        let mut patch = Record::new();
        patch.insert(PARENT_FLAG.to_string(), Value::Bool(true));
        patch.insert(UPDATED_BY.to_string(), Value::String(self.settings.actor.clone()));

        match self
            .collab
            .entities
            .update(&self.settings.collections.businesses, parent_id, patch)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "[{}] Could not flag business {} as having leads: {}",
                    self.correlation_id,
                    parent_id,
                    e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::MemoryBackend;
    use crate::api::operations::{CallKind, Operation};
    use crate::onboarding::saga::report::{BranchStatus, SubStep};
    use crate::onboarding::types::lead::{Associate, FollowUpNote, WinProbability};
    use crate::onboarding::types::{Competitor, ContactPerson, Document, Identity};

    fn submission(categories: &[&str], mode: BranchMode) -> OnboardingSubmission {
        let mut submission = OnboardingSubmission::default();
        submission
            .parent
            .fields
            .insert("name".into(), json!("Acme Facilities"));
        submission.parent.currencies = vec!["USD".into()];

        let mut contact = ContactPerson::new_draft();
        contact.name = "Dana".into();
        contact.phone = "555-0100".into();
        submission.parent.contacts = crate::onboarding::types::ContactBook::new(vec![contact]);

        submission.dependent.categories = categories.iter().map(|c| Category::new(*c)).collect();
        submission.dependent.mode = mode;
        submission
            .dependent
            .fields
            .insert("title".into(), json!("HQ refurbishment"));
        submission.dependent.competitors = vec![Competitor::new(
            "Rival Co",
            WinProbability::try_from(25).unwrap(),
        )];
        submission.dependent.associates = vec![Associate {
            id: Identity::new_temporary(),
            name: "Architect".into(),
            role: "design".into(),
            phone: String::new(),
        }];
        submission.dependent.notes = vec![FollowUpNote {
            text: "Call back Monday".into(),
        }];
        submission
    }

    fn write_temp_document(name: &str) -> Document {
        let path = std::env::temp_dir().join(format!("{}-{}", Uuid::new_v4(), name));
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        Document::new(path, "quote")
    }

    fn flag_updates(backend: &MemoryBackend) -> usize {
        backend
            .operations()
            .iter()
            .filter(|op| matches!(op, Operation::Update { data, .. } if data.contains_key(PARENT_FLAG)))
            .count()
    }

    #[test]
    fn test_plan_branches() {
        let fan_out = submission(&["HVAC", "Electrical", "HVAC"], BranchMode::FanOut);
        assert_eq!(
            plan_branches(&fan_out.dependent),
            vec![vec![Category::new("HVAC")], vec![Category::new("Electrical")]]
        );

        let unified = submission(&["HVAC", "Electrical"], BranchMode::Unified);
        assert_eq!(plan_branches(&unified.dependent).len(), 1);
        assert_eq!(plan_branches(&unified.dependent)[0].len(), 2);
    }

    #[tokio::test]
    async fn test_parent_failure_aborts_without_branches() {
        let backend = MemoryBackend::new();
        backend.fail_always(CallKind::Create, "businesses");
        let settings = OnboardingSettings::default();

        let report = SagaRunner::new(Collaborators::from_backend(&backend), &settings)
            .run(&submission(&["HVAC", "Electrical"], BranchMode::FanOut))
            .await;

        assert!(report.branches.is_empty());
        assert!(report.parent_id.is_none());
        assert_eq!(report.errors().len(), 1);
        assert!(matches!(report.errors()[0], SagaError::HardFailure { .. }));
        assert_eq!(backend.operations().len(), 1);
        assert_eq!(flag_updates(&backend), 0);
    }

    #[tokio::test]
    async fn test_failed_branch_does_not_block_next_branch() {
        let backend = MemoryBackend::new();
        backend.fail_when(CallKind::Create, "leads", "categories", json!(["HVAC"]));
        let settings = OnboardingSettings::default();

        let report = SagaRunner::new(Collaborators::from_backend(&backend), &settings)
            .run(&submission(&["HVAC", "Electrical"], BranchMode::FanOut))
            .await;

        assert_eq!(report.branches.len(), 2);
        assert_eq!(report.branches[0].categories, vec![Category::new("HVAC")]);
        assert_eq!(report.branches[0].status, BranchStatus::Failed);
        assert!(report.branches[0].sub_steps.is_empty());
        assert_eq!(report.branches[1].categories, vec![Category::new("Electrical")]);
        assert_eq!(report.branches[1].status, BranchStatus::Success);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.parent_flagged);
        assert_eq!(flag_updates(&backend), 1);

        let leads = backend.records("leads");
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0]["business_id"], json!(report.parent_id.clone().unwrap()));
    }

    #[tokio::test]
    async fn test_document_failure_keeps_branch_successful() {
        let backend = MemoryBackend::new();
        backend.fail_always(CallKind::Upload, "documents");
        let settings = OnboardingSettings::default();

        let mut submission = submission(&["HVAC"], BranchMode::FanOut);
        submission.documents.common.push(write_temp_document("quote.pdf"));

        let report = SagaRunner::new(Collaborators::from_backend(&backend), &settings)
            .run(&submission)
            .await;

        let branch = &report.branches[0];
        assert_eq!(branch.status, BranchStatus::Success);
        assert!(matches!(
            branch.sub_step(SubStep::Documents),
            Some(SubStepOutcome::Failed { .. })
        ));
        assert_eq!(
            branch.sub_step(SubStep::Competitors),
            Some(&SubStepOutcome::Completed { count: 1 })
        );
        assert!(report
            .errors()
            .iter()
            .any(|e| matches!(e, SagaError::SubStepFailure { step: SubStep::Documents, .. })));
    }

    #[tokio::test]
    async fn test_unified_mode_runs_single_branch_with_all_documents() {
        let backend = MemoryBackend::new();
        let settings = OnboardingSettings::default();

        let mut submission = submission(&["HVAC", "Electrical"], BranchMode::Unified);
        submission.documents.common.push(write_temp_document("common.pdf"));
        submission
            .documents
            .by_category
            .insert(Category::new("HVAC"), vec![write_temp_document("hvac.pdf")]);
        submission
            .documents
            .by_category
            .insert(Category::new("Electrical"), vec![write_temp_document("elec.pdf")]);

        let report = SagaRunner::new(Collaborators::from_backend(&backend), &settings)
            .run(&submission)
            .await;

        assert_eq!(report.branches.len(), 1);
        assert_eq!(
            report.branches[0].sub_step(SubStep::Documents),
            Some(&SubStepOutcome::Completed { count: 3 })
        );
        assert_eq!(backend.records("leads")[0]["categories"], json!(["HVAC", "Electrical"]));
    }

    #[tokio::test]
    async fn test_branch_steps_run_in_order() {
        let backend = MemoryBackend::new();
        let settings = OnboardingSettings::default();

        SagaRunner::new(Collaborators::from_backend(&backend), &settings)
            .run(&submission(&["HVAC"], BranchMode::FanOut))
            .await;

        let described: Vec<String> = backend
            .operations()
            .iter()
            .map(|op| format!("{} {}", op.call_kind(), op.collection()))
            .collect();
        assert_eq!(
            described,
            vec![
                "create businesses",
                "bulk_create contacts",
                "create leads",
                "bulk_create lead_notes",
                "bulk_create associates",
                "bulk_create lead_contacts",
                "bulk_create competitors",
                "update businesses",
            ]
        );
    }

    #[tokio::test]
    async fn test_contact_failure_skips_contact_links() {
        let backend = MemoryBackend::new();
        backend.fail_always(CallKind::BulkCreate, "contacts");
        let settings = OnboardingSettings::default();

        let report = SagaRunner::new(Collaborators::from_backend(&backend), &settings)
            .run(&submission(&["HVAC"], BranchMode::FanOut))
            .await;

        assert!(matches!(report.parent_contacts, Some(SubStepOutcome::Failed { .. })));
        assert!(matches!(
            report.branches[0].sub_step(SubStep::ContactLinks),
            Some(SubStepOutcome::Skipped { .. })
        ));
        assert_eq!(report.branches[0].status, BranchStatus::Success);
    }

    #[tokio::test]
    async fn test_notifications_are_sent() {
        let backend = MemoryBackend::new();
        let settings = OnboardingSettings::default();

        let runner = SagaRunner::new(Collaborators::from_backend(&backend), &settings)
            .with_correlation_id("run-1");
        runner
            .run(&submission(&["HVAC", "Electrical"], BranchMode::FanOut))
            .await;

        let events: Vec<String> = backend
            .notifications()
            .into_iter()
            .map(|n| n.event)
            .collect();
        assert_eq!(events, vec!["lead_created", "lead_created", "saga_completed"]);
        assert!(backend
            .notifications()
            .iter()
            .all(|n| n.correlation_id.as_deref() == Some("run-1")));
    }

    #[tokio::test]
    async fn test_parent_flag_failure_is_best_effort() {
        let backend = MemoryBackend::new();
        backend.fail_always(CallKind::Update, "businesses");
        let settings = OnboardingSettings::default();

        let report = SagaRunner::new(Collaborators::from_backend(&backend), &settings)
            .run(&submission(&["HVAC"], BranchMode::FanOut))
            .await;

        assert!(!report.parent_flagged);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(flag_updates(&backend), 1);
    }
}
