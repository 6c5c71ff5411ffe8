//! Minimal field-level diffing between two snapshots of the same entity.
//!
//! Every field present in an update payload is treated by the backend as an
//! authoritative change, so a [`Patch`] only ever contains fields whose
//! canonical value differs. An empty patch means "no update needed" and must
//! not turn into a network call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::settings::UPDATED_BY;
use super::snapshot::{ArrayFieldPolicy, MalformedFieldError, Snapshot};
use super::types::{EntityKind, Record};

/// Field name to new raw value; `null` clears a field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    changes: Record,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.changes.get(field)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.changes.keys().cloned().collect()
    }

    pub fn changes(&self) -> &Record {
        &self.changes
    }

    /// Update payload with the audit field appended, or `None` when nothing changed
    pub fn into_update_payload(self, actor: &str) -> Option<Record> {
        if self.changes.is_empty() {
            return None;
        }
        let mut payload = self.changes;
        payload.insert(UPDATED_BY.to_string(), Value::String(actor.to_string()));
        Some(payload)
    }
}

/// Compare two snapshots and return only the fields whose canonical value changed.
///
/// Scalars are compared numerically when both sides parse as numbers, except for
/// the kind's text-only fields. List fields compare as sorted multisets.
pub fn diff(original: &Snapshot, current: &Snapshot) -> Patch {
    let schema = current.kind().schema();
    let mut names: Vec<&str> = original.field_names().chain(current.field_names()).collect();
    names.sort_unstable();
    names.dedup();

    let mut changes = Record::new();
    for name in names {
        let numeric = !schema.is_text(name) && !schema.is_array(name);
        let before = original.canonical(name);
        let after = current.canonical(name);

        if before.equivalent(after, numeric) {
            continue;
        }

        let value = match current.get(name) {
            Some(field) if !after.is_empty() => field.raw.clone(),
            _ => Value::Null,
        };
        log::debug!(
            "{} field '{}' changed: {:?} -> {:?}",
            current.kind(),
            name,
            before,
            after
        );
        changes.insert(name.to_string(), value);
    }

    Patch { changes }
}

/// Normalize both records and diff them
pub fn diff_records(
    original: &Record,
    current: &Record,
    kind: EntityKind,
    policy: ArrayFieldPolicy,
) -> Result<Patch, MalformedFieldError> {
    let original = Snapshot::capture(original, kind, policy)?;
    let current = Snapshot::capture(current, kind, policy)?;
    Ok(diff(&original, &current))
}

/// Apply a patch on top of a record
pub fn apply_patch(record: &Record, patch: &Patch) -> Record {
    let mut patched = record.clone();
    for (name, value) in &patch.changes {
        patched.insert(name.clone(), value.clone());
    }
    patched
}
