//! Per-step drafts and the complete submission handed to the saga or the edit session

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use super::contact::ContactBook;
use super::entity::{EntityKind, Record, text_field};
use super::lead::{Associate, BranchMode, Category, Competitor, Document, FollowUpNote};
use crate::onboarding::snapshot::{ArrayFieldPolicy, MalformedFieldError, array_elements};

/// Step 1: the business and its contacts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParentDraft {
    /// Scalar business fields (name, phone, address, ...)
    #[serde(default)]
    pub fields: Record,
    #[serde(default)]
    pub currencies: Vec<String>,
    #[serde(default)]
    pub contacts: ContactBook,
}

impl ParentDraft {
    pub fn name(&self) -> String {
        text_field(&self.fields, "name")
    }

    /// Business payload without contacts
    pub fn to_record(&self) -> Record {
        let mut record = self.fields.clone();
        record.insert(
            "currencies".into(),
            Value::Array(self.currencies.iter().cloned().map(Value::String).collect()),
        );
        record
    }

    /// Rebuild a draft from a loaded business record; bookkeeping fields are dropped
    pub fn from_record(
        record: &Record,
        contacts: ContactBook,
        policy: ArrayFieldPolicy,
    ) -> Result<Self, MalformedFieldError> {
        let kind = EntityKind::Business;
        let schema = kind.schema();
        let currencies = match record.get("currencies") {
            Some(raw) => array_elements(kind, "currencies", raw, policy)?,
            None => Vec::new(),
        };
        let fields = record
            .iter()
            .filter(|(name, _)| !schema.is_bookkeeping(name) && *name != "currencies")
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(Self {
            fields,
            currencies,
            contacts,
        })
    }
}

/// Step 2: lead fields shared by every branch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependentDraft {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub mode: BranchMode,
    #[serde(default)]
    pub fields: Record,
    #[serde(default)]
    pub competitors: Vec<Competitor>,
    #[serde(default)]
    pub associates: Vec<Associate>,
    #[serde(default)]
    pub notes: Vec<FollowUpNote>,
}

impl DependentDraft {
    /// Lead payload tagged with the given categories
    pub fn to_record(&self, categories: &[Category]) -> Record {
        let mut record = self.fields.clone();
        record.insert(
            "categories".into(),
            Value::Array(
                categories
                    .iter()
                    .map(|c| Value::String(c.as_str().to_string()))
                    .collect(),
            ),
        );
        record
    }

    /// Rebuild a draft from a loaded lead record
    pub fn from_record(
        record: &Record,
        competitors: Vec<Competitor>,
        policy: ArrayFieldPolicy,
    ) -> Result<Self, MalformedFieldError> {
        let kind = EntityKind::Lead;
        let schema = kind.schema();
        let categories = match record.get("categories") {
            Some(raw) => array_elements(kind, "categories", raw, policy)?
                .into_iter()
                .map(Category)
                .collect(),
            None => Vec::new(),
        };
        let fields = record
            .iter()
            .filter(|(name, _)| !schema.is_bookkeeping(name) && *name != "categories")
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(Self {
            categories,
            mode: BranchMode::Unified,
            fields,
            competitors,
            associates: Vec::new(),
            notes: Vec::new(),
        })
    }
}

/// Step 3: documents shared by all leads and documents per category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentsDraft {
    #[serde(default)]
    pub common: Vec<Document>,
    #[serde(default)]
    pub by_category: BTreeMap<Category, Vec<Document>>,
}

impl DocumentsDraft {
    /// Documents of the branch covering `categories`, category files first
    pub fn for_branch(&self, categories: &[Category]) -> Vec<&Document> {
        categories
            .iter()
            .filter_map(|category| self.by_category.get(category))
            .flatten()
            .chain(self.common.iter())
            .collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &Document> {
        self.common
            .iter()
            .chain(self.by_category.values().flatten())
    }

    pub fn is_empty(&self) -> bool {
        self.all().next().is_none()
    }
}

/// Everything the wizard collected
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnboardingSubmission {
    #[serde(default)]
    pub parent: ParentDraft,
    #[serde(default)]
    pub dependent: DependentDraft,
    #[serde(default)]
    pub documents: DocumentsDraft,
}

impl OnboardingSubmission {
    /// Load a submission from a `.toml` or `.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read submission file: {}", path.display()))?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        if is_toml {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML submission: {}", path.display()))
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON submission: {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_documents_for_branch_includes_common() {
        let mut draft = DocumentsDraft::default();
        draft.common.push(Document::new("common.pdf", ""));
        draft
            .by_category
            .insert(Category::new("HVAC"), vec![Document::new("hvac.pdf", "")]);
        draft
            .by_category
            .insert(Category::new("Electrical"), vec![Document::new("elec.pdf", "")]);

        let hvac: Vec<_> = draft
            .for_branch(&[Category::new("HVAC")])
            .iter()
            .map(|d| d.file_name())
            .collect();
        assert_eq!(hvac, vec!["hvac.pdf", "common.pdf"]);

        let unified = draft.for_branch(&[Category::new("HVAC"), Category::new("Electrical")]);
        assert_eq!(unified.len(), 3);
    }

    #[test]
    fn test_parent_from_record_drops_bookkeeping() {
        let record = json!({
            "id": "b1",
            "name": "Acme",
            "has_leads": true,
            "currencies": "[\"USD\"]",
            "updated_by": "ops"
        });
        let draft = ParentDraft::from_record(
            record.as_object().unwrap(),
            ContactBook::default(),
            ArrayFieldPolicy::Strict,
        )
        .unwrap();

        assert_eq!(draft.name(), "Acme");
        assert_eq!(draft.currencies, vec!["USD"]);
        assert_eq!(draft.fields.len(), 1);
        assert_eq!(draft.to_record()["currencies"], json!(["USD"]));
    }

    #[test]
    fn test_dependent_to_record_tags_categories() {
        let mut draft = DependentDraft::default();
        draft.fields.insert("title".into(), json!("Office fit-out"));

        let record = draft.to_record(&[Category::new("HVAC")]);
        assert_eq!(record["categories"], json!(["HVAC"]));
        assert_eq!(record["title"], json!("Office fit-out"));
    }

    #[test]
    fn test_submission_from_toml() {
        let toml_text = r#"
            [parent]
            currencies = ["USD", "EUR"]

            [parent.fields]
            name = "Acme"
            phone = "0123"

            [[parent.contacts]]
            name = "Dana"
            phone = "555"

            [dependent]
            categories = ["HVAC", "Electrical"]
            mode = "fan_out"

            [[dependent.competitors]]
            name = "Rival"
            win_probability = 30
        "#;
        let submission: OnboardingSubmission = toml::from_str(toml_text).unwrap();

        assert_eq!(submission.parent.name(), "Acme");
        assert_eq!(submission.parent.contacts.len(), 1);
        assert_eq!(submission.dependent.categories.len(), 2);
        assert_eq!(submission.dependent.mode, BranchMode::FanOut);
        assert!(submission.documents.is_empty());
    }
}
