//! Edit session: minimal-diff updates of an existing business and lead.
//!
//! The session owns the baselines loaded from the backend. They are plain
//! values; [`EditSession::commit`] swaps in new ones only for the parts the
//! backend confirmed.

use serde::Serialize;
use std::collections::HashSet;

use super::diff::diff;
use super::reconcile::{
    ChildAction, ChildRecord, OwnerLink, ReconcileReport, apply_reconciliation, reconcile,
};
use super::saga::SubStepOutcome;
use super::settings::{BUSINESS_LINK, LEAD_LINK, OnboardingSettings};
use super::snapshot::{ArrayFieldPolicy, MalformedFieldError, Snapshot};
use super::types::{
    Competitor, ContactBook, ContactPerson, DependentDraft, EntityKind, Identity,
    OnboardingSubmission, ParentDraft, Record,
};
use crate::api::store::{Collaborators, EntityStore, Filter, StoreError};

/// Failure while loading an edit session
#[derive(Debug)]
pub enum EditError {
    Store(StoreError),
    Malformed(MalformedFieldError),
    NotFound { collection: String, id: String },
}

impl std::fmt::Display for EditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditError::Store(e) => write!(f, "backend error: {}", e),
            EditError::Malformed(e) => write!(f, "{}", e),
            EditError::NotFound { collection, id } => {
                write!(f, "{} record '{}' not found", collection, id)
            }
        }
    }
}

impl std::error::Error for EditError {}

impl From<StoreError> for EditError {
    fn from(e: StoreError) -> Self {
        EditError::Store(e)
    }
}

impl From<MalformedFieldError> for EditError {
    fn from(e: MalformedFieldError) -> Self {
        EditError::Malformed(e)
    }
}

/// Outcome of a single-entity field update
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FieldUpdate {
    /// Empty patch; no call was made
    NoChanges,
    Updated { fields: Vec<String> },
    Failed { reason: String },
}

/// Outcome of a child collection sync
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChildSync {
    Applied(ReconcileReport),
    Failed { reason: String },
}

impl ChildSync {
    fn has_changes(&self) -> bool {
        match self {
            ChildSync::Applied(report) => !report.outcomes.is_empty(),
            ChildSync::Failed { .. } => true,
        }
    }

    fn is_success(&self) -> bool {
        match self {
            ChildSync::Applied(report) => report.is_success(),
            ChildSync::Failed { .. } => false,
        }
    }

    fn summary(&self) -> String {
        match self {
            ChildSync::Applied(report) => report.summary(),
            ChildSync::Failed { reason } => format!("failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditReport {
    pub parent: FieldUpdate,
    pub contacts: ChildSync,
    pub lead: Option<FieldUpdate>,
    pub competitors: Option<ChildSync>,
    pub documents: Option<SubStepOutcome>,
}

impl EditReport {
    pub fn has_changes(&self) -> bool {
        self.parent != FieldUpdate::NoChanges
            || self.contacts.has_changes()
            || self.lead.as_ref().is_some_and(|l| *l != FieldUpdate::NoChanges)
            || self.competitors.as_ref().is_some_and(ChildSync::has_changes)
            || self.documents.is_some()
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.parent, FieldUpdate::Failed { .. })
            && self.contacts.is_success()
            && !matches!(self.lead, Some(FieldUpdate::Failed { .. }))
            && self.competitors.as_ref().is_none_or(ChildSync::is_success)
            && !self.documents.as_ref().is_some_and(SubStepOutcome::is_failed)
    }

    pub fn summary(&self) -> String {
        if !self.has_changes() {
            return "No changes detected".to_string();
        }

        let mut lines = vec![format!("Business: {}", describe_update(&self.parent))];
        lines.push(format!("Contacts: {}", self.contacts.summary()));
        if let Some(lead) = &self.lead {
            lines.push(format!("Lead: {}", describe_update(lead)));
        }
        if let Some(competitors) = &self.competitors {
            lines.push(format!("Competitors: {}", competitors.summary()));
        }
        if let Some(documents) = &self.documents {
            lines.push(format!("Documents: {}", documents));
        }
        lines.join("\n")
    }
}

fn describe_update(update: &FieldUpdate) -> String {
    match update {
        FieldUpdate::NoChanges => "no changes detected".to_string(),
        FieldUpdate::Updated { fields } => format!("updated {}", fields.join(", ")),
        FieldUpdate::Failed { reason } => format!("failed: {}", reason),
    }
}

#[derive(Debug, Clone)]
struct LeadBaseline {
    id: String,
    snapshot: Snapshot,
    competitors: Vec<Competitor>,
}

/// Baselines of one business (and optionally one of its leads) under edit
#[derive(Debug, Clone)]
pub struct EditSession {
    parent_id: String,
    parent: Snapshot,
    contacts: Vec<ContactPerson>,
    lead: Option<LeadBaseline>,
    policy: ArrayFieldPolicy,
}

impl EditSession {
    pub fn new(
        parent_id: impl Into<String>,
        parent: &Record,
        contacts: Vec<ContactPerson>,
        policy: ArrayFieldPolicy,
    ) -> Result<Self, MalformedFieldError> {
        Ok(Self {
            parent_id: parent_id.into(),
            parent: Snapshot::capture(parent, EntityKind::Business, policy)?,
            contacts,
            lead: None,
            policy,
        })
    }

    pub fn with_lead(
        mut self,
        lead_id: impl Into<String>,
        lead: &Record,
        competitors: Vec<Competitor>,
    ) -> Result<Self, MalformedFieldError> {
        self.lead = Some(LeadBaseline {
            id: lead_id.into(),
            snapshot: Snapshot::capture(lead, EntityKind::Lead, self.policy)?,
            competitors,
        });
        Ok(self)
    }

    /// Fetch the originals of a business, its contacts and optionally one lead
    pub async fn load(
        store: &dyn EntityStore,
        settings: &OnboardingSettings,
        parent_id: &str,
        lead_id: Option<&str>,
    ) -> Result<Self, EditError> {
        let collections = &settings.collections;
        let policy = settings.array_policy;

        let parent = fetch_one(store, &collections.businesses, parent_id).await?;
        let contacts = store
            .list(&collections.contacts, &Filter::new().eq(BUSINESS_LINK, parent_id))
            .await?
            .iter()
            .map(|record| ContactPerson::from_record(record, policy))
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "Loaded business {} with {} contact(s)",
            parent_id,
            contacts.len()
        );

        let session = Self::new(parent_id, &parent, contacts, policy)?;
        let Some(lead_id) = lead_id else {
            return Ok(session);
        };

        let lead = fetch_one(store, &collections.leads, lead_id).await?;
        let competitors = store
            .list(&collections.competitors, &Filter::new().eq(LEAD_LINK, lead_id))
            .await?
            .iter()
            .map(Competitor::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        log::info!("Loaded lead {} with {} competitor(s)", lead_id, competitors.len());

        Ok(session.with_lead(lead_id, &lead, competitors)?)
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    /// Drafts prefilled from the baselines
    pub fn drafts(&self) -> Result<OnboardingSubmission, MalformedFieldError> {
        let parent = ParentDraft::from_record(
            &self.parent.to_record(),
            ContactBook::new(self.contacts.clone()),
            self.policy,
        )?;
        let dependent = match &self.lead {
            Some(lead) => DependentDraft::from_record(
                &lead.snapshot.to_record(),
                lead.competitors.clone(),
                self.policy,
            )?,
            None => DependentDraft::default(),
        };

        Ok(OnboardingSubmission {
            parent,
            dependent,
            documents: Default::default(),
        })
    }

    /// Send only what changed relative to the baselines
    pub async fn apply(
        &self,
        collab: Collaborators<'_>,
        settings: &OnboardingSettings,
        submission: &OnboardingSubmission,
    ) -> EditReport {
        let collections = &settings.collections;
        let actor = settings.actor.as_str();

        let parent = update_fields(
            collab.entities,
            &collections.businesses,
            &self.parent_id,
            &self.parent,
            &submission.parent.to_record(),
            self.policy,
            actor,
        )
        .await;

        let contacts = sync_children(
            collab.entities,
            &collections.contacts,
            OwnerLink {
                field: BUSINESS_LINK,
                id: &self.parent_id,
            },
            &self.contacts,
            submission.parent.contacts.as_slice(),
            self.policy,
            actor,
        )
        .await;

        let (lead, competitors, documents) = match &self.lead {
            None => (None, None, None),
            Some(baseline) => {
                let dependent = &submission.dependent;
                let lead = update_fields(
                    collab.entities,
                    &collections.leads,
                    &baseline.id,
                    &baseline.snapshot,
                    &dependent.to_record(&dependent.categories),
                    self.policy,
                    actor,
                )
                .await;

                let competitors = sync_children(
                    collab.entities,
                    &collections.competitors,
                    OwnerLink {
                        field: LEAD_LINK,
                        id: &baseline.id,
                    },
                    &baseline.competitors,
                    &dependent.competitors,
                    self.policy,
                    actor,
                )
                .await;

                let documents = upload_new_documents(collab, &baseline.id, submission).await;
                (Some(lead), Some(competitors), documents)
            }
        };

        let report = EditReport {
            parent,
            contacts,
            lead,
            competitors,
            documents,
        };
        if report.has_changes() {
            log::info!("Edit of business {} applied", self.parent_id);
        } else {
            log::info!("No changes detected for business {}", self.parent_id);
        }
        report
    }

    /// Replace baselines for the parts the backend confirmed and give created
    /// children their backend ids in `submission`.
    pub fn commit(
        &mut self,
        report: &EditReport,
        submission: &mut OnboardingSubmission,
    ) -> Result<(), MalformedFieldError> {
        if let FieldUpdate::Updated { .. } = report.parent {
            self.parent = Snapshot::capture(
                &submission.parent.to_record(),
                EntityKind::Business,
                self.policy,
            )?;
        }

        if let ChildSync::Applied(contacts) = &report.contacts {
            let mut current: Vec<ContactPerson> = submission.parent.contacts.as_slice().to_vec();
            self.contacts = next_baseline(&self.contacts, &mut current, contacts);
            submission.parent.contacts = ContactBook::new(current);
        }

        if let Some(lead) = self.lead.as_mut() {
            let dependent = &mut submission.dependent;
            if let Some(FieldUpdate::Updated { .. }) = report.lead {
                lead.snapshot = Snapshot::capture(
                    &dependent.to_record(&dependent.categories),
                    EntityKind::Lead,
                    self.policy,
                )?;
            }
            if let Some(ChildSync::Applied(competitors)) = &report.competitors {
                lead.competitors =
                    next_baseline(&lead.competitors, &mut dependent.competitors, competitors);
            }
        }

        Ok(())
    }
}

async fn fetch_one(store: &dyn EntityStore, collection: &str, id: &str) -> Result<Record, EditError> {
    store
        .list(collection, &Filter::new().eq("id", id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| EditError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })
}

async fn update_fields(
    store: &dyn EntityStore,
    collection: &str,
    id: &str,
    baseline: &Snapshot,
    current: &Record,
    policy: ArrayFieldPolicy,
    actor: &str,
) -> FieldUpdate {
    let current = match Snapshot::capture(current, baseline.kind(), policy) {
        Ok(snapshot) => snapshot,
        Err(e) => return FieldUpdate::Failed { reason: e.to_string() },
    };

    let patch = diff(baseline, &current);
    let fields = patch.field_names();
    let Some(payload) = patch.into_update_payload(actor) else {
        log::debug!("{} {}: no changes detected", baseline.kind(), id);
        return FieldUpdate::NoChanges;
    };

    match store.update(collection, id, payload).await {
        Ok(()) => {
            log::info!("{} {} updated: {}", baseline.kind(), id, fields.join(", "));
            FieldUpdate::Updated { fields }
        }
        Err(e) => {
            log::error!("{} {} update failed: {}", baseline.kind(), id, e);
            FieldUpdate::Failed {
                reason: e.to_string(),
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn sync_children<C: ChildRecord>(
    store: &dyn EntityStore,
    collection: &str,
    owner: OwnerLink<'_>,
    original: &[C],
    current: &[C],
    policy: ArrayFieldPolicy,
    actor: &str,
) -> ChildSync {
    match reconcile(original, current, policy) {
        Ok(reconciliation) => ChildSync::Applied(
            apply_reconciliation(store, collection, owner, &reconciliation, actor).await,
        ),
        Err(e) => ChildSync::Failed {
            reason: e.to_string(),
        },
    }
}

/// Documents attached in edit mode are uploaded to the edited lead
async fn upload_new_documents(
    collab: Collaborators<'_>,
    lead_id: &str,
    submission: &OnboardingSubmission,
) -> Option<SubStepOutcome> {
    if submission.documents.is_empty() {
        return None;
    }

    let mut uploads = Vec::new();
    for document in submission.documents.all() {
        match document.load().await {
            Ok(upload) => uploads.push(upload),
            Err(e) => {
                return Some(SubStepOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        }
    }

    let count = uploads.len();
    Some(match collab.documents.upload(lead_id, uploads).await {
        Ok(()) => SubStepOutcome::Completed { count },
        Err(e) => SubStepOutcome::Failed {
            reason: e.to_string(),
        },
    })
}

/// Children the backend now holds, given what was sent and what succeeded.
/// Successfully created children in `current` receive their backend id.
fn next_baseline<C: ChildRecord>(
    original: &[C],
    current: &mut [C],
    report: &ReconcileReport,
) -> Vec<C> {
    let failed: HashSet<(&Identity, ChildAction)> = report
        .failures()
        .map(|o| (&o.identity, o.action))
        .collect();
    let created = report.created_ids();

    for child in current.iter_mut() {
        if let Some((_, id)) = created.iter().find(|(temp, _)| temp == child.identity()) {
            child.set_identity(Identity::durable(id.clone()));
        }
    }

    let mut baseline = Vec::new();
    for child in current.iter() {
        let id = child.identity();
        if id.is_temporary() {
            continue;
        }
        if failed.contains(&(id, ChildAction::Update)) {
            if let Some(old) = original.iter().find(|o| o.identity() == id) {
                baseline.push(old.clone());
            }
            continue;
        }
        baseline.push(child.clone());
    }

    for old in original {
        if failed.contains(&(old.identity(), ChildAction::Delete)) {
            baseline.push(old.clone());
        }
    }
    baseline
}
