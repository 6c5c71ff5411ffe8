//! Child-collection reconciliation.
//!
//! Splits an edited child list (contacts, competitors) against its originally
//! loaded counterpart into creates, updates and deletes, then applies them as
//! independent backend calls and collects a per-item outcome.

use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::diff::{Patch, diff};
use super::settings::CREATED_BY;
use super::snapshot::{ArrayFieldPolicy, MalformedFieldError, Snapshot};
use super::types::{Competitor, ContactPerson, EntityKind, Identity, Record};
use crate::api::store::EntityStore;

/// A child record that can be matched by identity and diffed
pub trait ChildRecord: Clone {
    const KIND: EntityKind;

    fn identity(&self) -> &Identity;
    fn to_record(&self) -> Record;
    fn set_identity(&mut self, id: Identity);
}

impl ChildRecord for ContactPerson {
    const KIND: EntityKind = EntityKind::Contact;

    fn identity(&self) -> &Identity {
        &self.id
    }

    fn to_record(&self) -> Record {
        ContactPerson::to_record(self)
    }

    fn set_identity(&mut self, id: Identity) {
        ContactPerson::set_identity(self, id)
    }
}

impl ChildRecord for Competitor {
    const KIND: EntityKind = EntityKind::Competitor;

    fn identity(&self) -> &Identity {
        &self.id
    }

    fn to_record(&self) -> Record {
        Competitor::to_record(self)
    }

    fn set_identity(&mut self, id: Identity) {
        self.id = id;
    }
}

/// Changed fields of one durable child
#[derive(Debug, Clone, PartialEq)]
pub struct ChildUpdate {
    pub id: Identity,
    pub patch: Patch,
}

/// Disjoint classification of every child identity seen on either side
#[derive(Debug, Clone)]
pub struct Reconciliation<C> {
    pub to_create: Vec<C>,
    pub to_update: Vec<ChildUpdate>,
    pub to_delete: Vec<Identity>,
    /// Matched children without differences; never written
    pub unchanged: Vec<Identity>,
}

impl<C> Reconciliation<C> {
    /// Nothing to send to the backend
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Classify `current` against `original` by identity
pub fn reconcile<C: ChildRecord>(
    original: &[C],
    current: &[C],
    policy: ArrayFieldPolicy,
) -> Result<Reconciliation<C>, MalformedFieldError> {
    let originals: HashMap<&Identity, &C> = original.iter().map(|c| (c.identity(), c)).collect();
    let mut seen: HashSet<&Identity> = HashSet::new();

    let mut to_create = Vec::new();
    let mut to_update = Vec::new();
    let mut unchanged = Vec::new();

    for child in current {
        let id = child.identity();
        if !seen.insert(id) {
            log::warn!("Duplicate {} identity {} ignored", C::KIND, id);
            continue;
        }

        match originals.get(id) {
            Some(before) => {
                let before = Snapshot::capture(&before.to_record(), C::KIND, policy)?;
                let after = Snapshot::capture(&child.to_record(), C::KIND, policy)?;
                let patch = diff(&before, &after);
                if patch.is_empty() {
                    unchanged.push(id.clone());
                } else {
                    to_update.push(ChildUpdate {
                        id: id.clone(),
                        patch,
                    });
                }
            }
            None => {
                if !id.is_temporary() {
                    log::warn!(
                        "{} {} has a backend id but was not loaded originally, creating it",
                        C::KIND,
                        id
                    );
                }
                to_create.push(child.clone());
            }
        }
    }

    let to_delete = original
        .iter()
        .map(|c| c.identity())
        .filter(|id| !seen.contains(id))
        .cloned()
        .collect();

    Ok(Reconciliation {
        to_create,
        to_update,
        to_delete,
        unchanged,
    })
}

/// Foreign key stamped on created children
#[derive(Debug, Clone, Copy)]
pub struct OwnerLink<'a> {
    pub field: &'a str,
    pub id: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ChildAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChildAction::Create => write!(f, "create"),
            ChildAction::Update => write!(f, "update"),
            ChildAction::Delete => write!(f, "delete"),
        }
    }
}

/// Result of one child call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildOutcome {
    pub identity: Identity,
    pub action: ChildAction,
    /// Backend id assigned by a successful create
    pub new_id: Option<String>,
    pub error: Option<String>,
}

impl ChildOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-item outcomes of an applied reconciliation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub outcomes: Vec<ChildOutcome>,
    pub unchanged: usize,
}

impl ReconcileReport {
    fn count(&self, action: ChildAction) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.action == action && o.is_success())
            .count()
    }

    pub fn created(&self) -> usize {
        self.count(ChildAction::Create)
    }

    pub fn updated(&self) -> usize {
        self.count(ChildAction::Update)
    }

    pub fn deleted(&self) -> usize {
        self.count(ChildAction::Delete)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ChildOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// Some calls succeeded and some failed
    pub fn is_partial(&self) -> bool {
        let failed = self.failed();
        failed > 0 && failed < self.outcomes.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Temporary identity to backend id for every successful create
    pub fn created_ids(&self) -> Vec<(Identity, String)> {
        self.outcomes
            .iter()
            .filter(|o| o.action == ChildAction::Create)
            .filter_map(|o| o.new_id.clone().map(|id| (o.identity.clone(), id)))
            .collect()
    }

    pub fn summary(&self) -> String {
        if self.outcomes.is_empty() {
            return "no changes".to_string();
        }
        let mut text = format!(
            "{} created, {} updated, {} deleted",
            self.created(),
            self.updated(),
            self.deleted()
        );
        if self.is_partial() {
            text.push_str(&format!(", {} failed", self.failed()));
        } else if self.failed() > 0 {
            return format!("all {} change(s) failed", self.failed());
        }
        text
    }
}

/// Apply creates, then updates, then deletes. Every call is attempted even when
/// earlier ones failed.
pub async fn apply_reconciliation<C: ChildRecord>(
    store: &dyn EntityStore,
    collection: &str,
    owner: OwnerLink<'_>,
    reconciliation: &Reconciliation<C>,
    actor: &str,
) -> ReconcileReport {
    if reconciliation.is_noop() {
        log::debug!("No {} changes to apply", C::KIND);
        return ReconcileReport {
            outcomes: Vec::new(),
            unchanged: reconciliation.unchanged.len(),
        };
    }
    let mut outcomes = Vec::new();

    for child in &reconciliation.to_create {
        let mut record = child.to_record();
        record.insert(owner.field.to_string(), Value::String(owner.id.to_string()));
        record.insert(CREATED_BY.to_string(), Value::String(actor.to_string()));

        let result = store.create(collection, record).await;
        if let Err(e) = &result {
            log::warn!("Failed to create {} {}: {}", C::KIND, child.identity(), e);
        }
        outcomes.push(ChildOutcome {
            identity: child.identity().clone(),
            action: ChildAction::Create,
            new_id: result.as_ref().ok().cloned(),
            error: result.err().map(|e| e.to_string()),
        });
    }

    for update in &reconciliation.to_update {
        let Some(payload) = update.patch.clone().into_update_payload(actor) else {
            continue;
        };
        let result = store.update(collection, update.id.as_str(), payload).await;
        if let Err(e) = &result {
            log::warn!("Failed to update {} {}: {}", C::KIND, update.id, e);
        }
        outcomes.push(ChildOutcome {
            identity: update.id.clone(),
            action: ChildAction::Update,
            new_id: None,
            error: result.err().map(|e| e.to_string()),
        });
    }

    for id in &reconciliation.to_delete {
        let result = match id.durable_id() {
            Some(durable) => store.delete(collection, durable).await,
            None => {
                log::debug!("{} {} was never persisted, nothing to delete", C::KIND, id);
                Ok(())
            }
        };
        if let Err(e) = &result {
            log::warn!("Failed to delete {} {}: {}", C::KIND, id, e);
        }
        outcomes.push(ChildOutcome {
            identity: id.clone(),
            action: ChildAction::Delete,
            new_id: None,
            error: result.err().map(|e| e.to_string()),
        });
    }

    let report = ReconcileReport {
        outcomes,
        unchanged: reconciliation.unchanged.len(),
    };
    log::info!("{} reconciliation: {}", C::KIND, report.summary());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::MemoryBackend;
    use crate::api::operations::{CallKind, Operation};
    use crate::onboarding::types::lead::WinProbability;

    fn contact(id: &str, phone: &str, email: &str) -> ContactPerson {
        let mut c = ContactPerson::new_draft();
        c.id = Identity::from(id.to_string());
        c.name = format!("Contact {}", id);
        c.phone = phone.to_string();
        c.email = email.to_string();
        c
    }

    fn ids<'a>(items: impl Iterator<Item = &'a Identity>) -> HashSet<Identity> {
        items.cloned().collect()
    }

    #[test]
    fn test_classifies_create_update_delete() {
        let original = vec![
            contact("c1", "111", "a@x.com"),
            contact("c2", "222", "b@x.com"),
            contact("c3", "333", "c@x.com"),
        ];
        let mut current = vec![
            contact("c1", "999", "a@x.com"),
            contact("c2", "222", "b@x.com"),
        ];
        current.push(contact("tmp-new", "444", "d@x.com"));

        let result = reconcile(&original, &current, ArrayFieldPolicy::Strict).unwrap();

        assert_eq!(result.to_create.len(), 1);
        assert_eq!(result.to_update.len(), 1);
        assert_eq!(result.to_update[0].id, Identity::durable("c1"));
        assert_eq!(result.to_update[0].patch.field_names(), vec!["phone"]);
        assert_eq!(result.to_delete, vec![Identity::durable("c3")]);
        assert_eq!(result.unchanged, vec![Identity::durable("c2")]);
    }

    #[test]
    fn test_partition_covers_union_without_overlap() {
        let original = vec![contact("c1", "1", ""), contact("c2", "2", "")];
        let current = vec![
            contact("c2", "2", "changed@x.com"),
            contact("tmp-a", "3", ""),
            contact("tmp-b", "4", ""),
        ];

        let result = reconcile(&original, &current, ArrayFieldPolicy::Strict).unwrap();

        let created = ids(result.to_create.iter().map(|c| &c.id));
        let updated = ids(result.to_update.iter().map(|u| &u.id));
        let deleted = ids(result.to_delete.iter());
        let unchanged = ids(result.unchanged.iter());

        let sets = [&created, &updated, &deleted, &unchanged];
        for (i, a) in sets.iter().enumerate() {
            for b in sets.iter().skip(i + 1) {
                assert!(a.is_disjoint(b));
            }
        }

        let union: HashSet<Identity> = sets.iter().flat_map(|s| s.iter().cloned()).collect();
        let expected = ids(original.iter().map(|c| &c.id).chain(current.iter().map(|c| &c.id)));
        assert_eq!(union, expected);
    }

    #[test]
    fn test_unchanged_child_never_in_updates() {
        let original = vec![contact("c1", "111", "a@x.com")];
        let mut same = contact("c1", " 111 ", "a@x.com");
        same.designation = String::new();
        let result = reconcile(&original, &[same], ArrayFieldPolicy::Strict).unwrap();

        assert!(result.to_update.is_empty());
        assert!(result.is_noop());
    }

    #[test]
    fn test_reconciles_competitors() {
        let mut rival = Competitor::new("Rival", WinProbability::try_from(20).unwrap());
        rival.id = Identity::durable("k1");
        let mut edited = rival.clone();
        edited.win_probability = WinProbability::try_from(60).unwrap();

        let result = reconcile(&[rival], &[edited], ArrayFieldPolicy::Strict).unwrap();
        assert_eq!(result.to_update[0].patch.field_names(), vec!["win_probability"]);
    }

    #[tokio::test]
    async fn test_apply_attempts_every_call_despite_failures() {
        let backend = MemoryBackend::new();
        backend.seed("contacts", "c1", contact("c1", "1", "").to_record());
        backend.seed("contacts", "c3", contact("c3", "3", "").to_record());
        backend.fail_always(CallKind::Create, "contacts");

        let original = vec![contact("c1", "1", ""), contact("c3", "3", "")];
        let current = vec![contact("c1", "2", ""), contact("tmp-x", "9", "")];
        let reconciliation = reconcile(&original, &current, ArrayFieldPolicy::Strict).unwrap();

        let report = apply_reconciliation(
            &backend,
            "contacts",
            OwnerLink { field: "business_id", id: "b1" },
            &reconciliation,
            "tester",
        )
        .await;

        assert_eq!(report.failed(), 1);
        assert_eq!(report.updated(), 1);
        assert_eq!(report.deleted(), 1);
        assert!(report.is_partial());
        assert_eq!(report.summary(), "0 created, 1 updated, 1 deleted, 1 failed");

        let ops = backend.operations();
        assert!(matches!(ops[0], Operation::Create { .. }));
        assert!(matches!(ops[1], Operation::Update { .. }));
        assert!(matches!(ops[2], Operation::Delete { .. }));
    }

    #[tokio::test]
    async fn test_apply_without_changes_makes_no_calls() {
        let backend = MemoryBackend::new();
        let stored = vec![contact("c1", "1", "")];
        let reconciliation = reconcile(&stored, &stored, ArrayFieldPolicy::Strict).unwrap();

        let report = apply_reconciliation(
            &backend,
            "contacts",
            OwnerLink { field: "business_id", id: "b1" },
            &reconciliation,
            "tester",
        )
        .await;

        assert!(backend.operations().is_empty());
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.summary(), "no changes");
    }

    #[test]
    fn test_summary_when_every_call_failed() {
        let report = ReconcileReport {
            outcomes: vec![ChildOutcome {
                identity: Identity::durable("c1"),
                action: ChildAction::Delete,
                new_id: None,
                error: Some("gone".to_string()),
            }],
            unchanged: 0,
        };
        assert!(!report.is_partial());
        assert_eq!(report.summary(), "all 1 change(s) failed");
    }

    #[tokio::test]
    async fn test_apply_stamps_owner_and_audit_fields() {
        let backend = MemoryBackend::new();
        let reconciliation =
            reconcile(&[], &[contact("tmp-x", "9", "")], ArrayFieldPolicy::Strict).unwrap();

        let report = apply_reconciliation(
            &backend,
            "contacts",
            OwnerLink { field: "business_id", id: "b1" },
            &reconciliation,
            "tester",
        )
        .await;

        let created = report.created_ids();
        assert_eq!(created.len(), 1);
        let stored = backend.record("contacts", &created[0].1).unwrap();
        assert_eq!(stored["business_id"], serde_json::json!("b1"));
        assert_eq!(stored["created_by"], serde_json::json!("tester"));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::onboarding::types::entity::TEMPORARY_PREFIX;
    use proptest::prelude::*;

    /// What happens to a stored contact in the edited list
    #[derive(Debug, Clone, Copy)]
    enum Fate {
        Removed,
        Kept,
        Edited,
    }

    fn arb_fate() -> impl Strategy<Value = Fate> {
        prop_oneof![Just(Fate::Removed), Just(Fate::Kept), Just(Fate::Edited)]
    }

    fn contact(id: String, phone: &str, email: &str) -> ContactPerson {
        ContactPerson {
            id: Identity::from(id),
            name: "Contact".to_string(),
            phone: phone.to_string(),
            email: email.to_string(),
            designation: String::new(),
            secondary_phone: String::new(),
            birthday: None,
            anniversary: None,
            channels: Vec::new(),
        }
    }

    /// Stored contacts and an edited, shuffled list built from them plus new drafts
    fn arb_contact_lists() -> impl Strategy<Value = (Vec<ContactPerson>, Vec<ContactPerson>)> {
        (
            prop::collection::vec(("[0-9]{1,4}", arb_fate()), 0..8),
            prop::collection::vec("[0-9]{1,4}", 0..4),
        )
            .prop_flat_map(|(stored, drafts)| {
                let mut original = Vec::new();
                let mut current = Vec::new();
                for (i, (phone, fate)) in stored.into_iter().enumerate() {
                    let id = format!("c{}", i);
                    original.push(contact(id.clone(), &phone, ""));
                    match fate {
                        Fate::Removed => {}
                        Fate::Kept => current.push(contact(id, &format!(" {} ", phone), "")),
                        Fate::Edited => current.push(contact(id, &phone, "new@x.com")),
                    }
                }
                for (i, phone) in drafts.into_iter().enumerate() {
                    current.push(contact(format!("{}{}", TEMPORARY_PREFIX, i), &phone, ""));
                }
                (Just(original), Just(current).prop_shuffle())
            })
    }

    fn ids<'a>(items: impl Iterator<Item = &'a Identity>) -> HashSet<Identity> {
        items.cloned().collect()
    }

    proptest! {
        #[test]
        fn partition_covers_union_without_overlap((original, current) in arb_contact_lists()) {
            let result = reconcile(&original, &current, ArrayFieldPolicy::Strict).unwrap();

            let created = ids(result.to_create.iter().map(|c| &c.id));
            let updated = ids(result.to_update.iter().map(|u| &u.id));
            let deleted = ids(result.to_delete.iter());
            let unchanged = ids(result.unchanged.iter());

            let sets = [&created, &updated, &deleted, &unchanged];
            for (i, a) in sets.iter().enumerate() {
                for b in sets.iter().skip(i + 1) {
                    prop_assert!(a.is_disjoint(b));
                }
            }
            let total: usize = sets.iter().map(|s| s.len()).sum();
            let union = ids(original.iter().map(|c| &c.id).chain(current.iter().map(|c| &c.id)));
            prop_assert_eq!(total, union.len());
        }

        #[test]
        fn classification_follows_identity_and_content((original, current) in arb_contact_lists()) {
            let result = reconcile(&original, &current, ArrayFieldPolicy::Strict).unwrap();
            let stored = ids(original.iter().map(|c| &c.id));
            let kept = ids(current.iter().map(|c| &c.id));

            prop_assert!(result.to_create.iter().all(|c| c.id.is_temporary()));
            prop_assert!(result.to_delete.iter().all(|id| stored.contains(id) && !kept.contains(id)));
            for update in &result.to_update {
                prop_assert_eq!(update.patch.field_names(), vec!["email"]);
            }
            for id in &result.unchanged {
                prop_assert!(!result.to_update.iter().any(|u| &u.id == id));
            }
        }
    }
}
