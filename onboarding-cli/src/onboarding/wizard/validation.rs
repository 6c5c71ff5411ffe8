//! Per-step validity gates

use std::path::Path;

use crate::onboarding::types::{DependentDraft, DocumentsDraft, ParentDraft};

/// Step 1: business name and a phone number on every contact
pub fn validate_parent(draft: &ParentDraft) -> Vec<String> {
    let mut problems = Vec::new();
    if draft.name().is_empty() {
        problems.push("business name is required".to_string());
    }
    for (index, contact) in draft.contacts.iter().enumerate() {
        if contact.phone.trim().is_empty() {
            let who = if contact.name.trim().is_empty() {
                format!("contact #{}", index + 1)
            } else {
                format!("contact '{}'", contact.name.trim())
            };
            problems.push(format!("{} has no phone number", who));
        }
    }
    problems
}

/// Step 2: at least one category when creating, named competitors.
/// Win probabilities are range checked when a `WinProbability` is built.
pub fn validate_dependent(draft: &DependentDraft, creating: bool) -> Vec<String> {
    let mut problems = Vec::new();
    if creating && draft.categories.is_empty() {
        problems.push("select at least one category".to_string());
    }
    if draft.categories.iter().any(|c| c.as_str().trim().is_empty()) {
        problems.push("category names cannot be empty".to_string());
    }
    for competitor in &draft.competitors {
        if competitor.name.trim().is_empty() {
            problems.push("competitor name is required".to_string());
        }
    }
    problems
}

/// Step 3: every attached file must exist
pub fn validate_documents(draft: &DocumentsDraft, exists: fn(&Path) -> bool) -> Vec<String> {
    draft
        .all()
        .filter(|doc| !exists(&doc.path))
        .map(|doc| format!("document not found: {}", doc.path.display()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::types::{Category, ContactPerson, Document};
    use serde_json::json;

    #[test]
    fn test_parent_requires_name_and_contact_phones() {
        let mut draft = ParentDraft::default();
        let contact = draft.contacts.add_draft();
        contact.name = "Dana".into();

        let problems = validate_parent(&draft);
        assert_eq!(problems.len(), 2);
        assert!(problems[1].contains("Dana"));

        draft.fields.insert("name".into(), json!("Acme"));
        draft.contacts = crate::onboarding::types::ContactBook::new(vec![ContactPerson {
            phone: "555".into(),
            ..ContactPerson::new_draft()
        }]);
        assert!(validate_parent(&draft).is_empty());
    }

    #[test]
    fn test_dependent_requires_category_only_when_creating() {
        let draft = DependentDraft::default();
        assert_eq!(validate_dependent(&draft, true).len(), 1);
        assert!(validate_dependent(&draft, false).is_empty());

        let with_category = DependentDraft {
            categories: vec![Category::new("HVAC")],
            ..DependentDraft::default()
        };
        assert!(validate_dependent(&with_category, true).is_empty());
    }

    #[test]
    fn test_documents_must_exist() {
        let mut draft = DocumentsDraft::default();
        draft.common.push(Document::new("/missing/file.pdf", ""));

        assert_eq!(validate_documents(&draft, |_| false).len(), 1);
        assert!(validate_documents(&draft, |_| true).is_empty());
    }
}
