//! Lead-side types: categories, branch mode, competitors, associates, notes and documents

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;

use super::entity::{EntityKind, Identity, Record, text_field};
use crate::api::store::{DocumentUpload, StoreError};
use crate::onboarding::snapshot::MalformedFieldError;

/// Work type a lead is created for
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(pub String);

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How selected categories map to leads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchMode {
    /// One lead per category
    #[default]
    FanOut,
    /// One lead covering every category
    Unified,
}

impl std::fmt::Display for BranchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BranchMode::FanOut => write!(f, "fan-out"),
            BranchMode::Unified => write!(f, "unified"),
        }
    }
}

/// Percentage in 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct WinProbability(u8);

impl WinProbability {
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for WinProbability {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..=100).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(format!("win probability {} is outside 0..=100", value))
        }
    }
}

impl From<WinProbability> for u8 {
    fn from(value: WinProbability) -> Self {
        value.0
    }
}

/// Competitor bidding for the same work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    #[serde(default = "Identity::new_temporary")]
    pub id: Identity,
    pub name: String,
    #[serde(default)]
    pub win_probability: WinProbability,
}

impl Competitor {
    pub fn new(name: impl Into<String>, win_probability: WinProbability) -> Self {
        Self {
            id: Identity::new_temporary(),
            name: name.into(),
            win_probability,
        }
    }

    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("name".into(), Value::String(self.name.clone()));
        record.insert("win_probability".into(), json!(self.win_probability.value()));
        record
    }

    pub fn from_record(record: &Record) -> Result<Self, MalformedFieldError> {
        let raw = text_field(record, "win_probability");
        let win_probability = if raw.is_empty() {
            WinProbability::default()
        } else {
            parse_percentage(&raw)
                .and_then(WinProbability::try_from)
                .map_err(|reason| MalformedFieldError {
                    kind: EntityKind::Competitor,
                    field: "win_probability".to_string(),
                    raw: raw.clone(),
                    reason,
                })?
        };

        Ok(Self {
            id: Identity::from_record(record).unwrap_or_else(Identity::new_temporary),
            name: text_field(record, "name"),
            win_probability,
        })
    }
}

/// Whole number of percent; `"40"` and `40.0` are accepted, `"40.5"` and `"NaN"` are not
fn parse_percentage(raw: &str) -> Result<i64, String> {
    let n = raw.trim().parse::<f64>().map_err(|e| e.to_string())?;
    if !n.is_finite() {
        return Err(format!("'{}' is not a finite number", raw));
    }
    if n.fract() != 0.0 {
        return Err(format!("'{}' is not a whole percentage", raw));
    }
    Ok(n as i64)
}

/// Person associated with a lead (architect, consultant, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Associate {
    #[serde(default = "Identity::new_temporary")]
    pub id: Identity,
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub phone: String,
}

impl Associate {
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("name".into(), Value::String(self.name.clone()));
        record.insert("role".into(), Value::String(self.role.clone()));
        record.insert("phone".into(), Value::String(self.phone.clone()));
        record
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpNote {
    pub text: String,
}

impl FollowUpNote {
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("text".into(), Value::String(self.text.clone()));
        record
    }
}

/// File on disk plus its note; bytes are read only when uploading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: PathBuf,
    #[serde(default)]
    pub note: String,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, note: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            note: note.into(),
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub async fn load(&self) -> Result<DocumentUpload, StoreError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            StoreError::io(format!("failed to read {}: {}", self.path.display(), e))
        })?;

        Ok(DocumentUpload {
            file_name: self.file_name(),
            bytes,
            note: self.note.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win_probability_bounds() {
        assert!(WinProbability::try_from(0).is_ok());
        assert!(WinProbability::try_from(100).is_ok());
        assert!(WinProbability::try_from(101).is_err());
        assert!(WinProbability::try_from(-1).is_err());
    }

    #[test]
    fn test_competitor_deserialization_rejects_out_of_range() {
        let err = serde_json::from_value::<Competitor>(json!({"name": "Rival", "win_probability": 150}));
        assert!(err.is_err());

        let ok: Competitor =
            serde_json::from_value(json!({"name": "Rival", "win_probability": 40})).unwrap();
        assert_eq!(ok.win_probability.value(), 40);
        assert!(ok.id.is_temporary());
    }

    #[test]
    fn test_competitor_from_record() {
        let record = json!({"id": 9, "name": "Rival", "win_probability": "35"});
        let competitor = Competitor::from_record(record.as_object().unwrap()).unwrap();
        assert_eq!(competitor.id, Identity::durable("9"));
        assert_eq!(competitor.win_probability.value(), 35);

        let bad = json!({"id": 9, "name": "Rival", "win_probability": 250});
        assert!(Competitor::from_record(bad.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_competitor_from_record_rejects_non_finite_and_fractional() {
        for raw in [json!("NaN"), json!("inf"), json!("40.5"), json!(12.25)] {
            let record = json!({"id": 9, "name": "Rival", "win_probability": raw});
            let err = Competitor::from_record(record.as_object().unwrap()).unwrap_err();
            assert_eq!(err.field, "win_probability");
        }

        let whole = json!({"id": 9, "name": "Rival", "win_probability": 40.0});
        let competitor = Competitor::from_record(whole.as_object().unwrap()).unwrap();
        assert_eq!(competitor.win_probability.value(), 40);
    }

    #[test]
    fn test_branch_mode_serde() {
        assert_eq!(serde_json::to_value(BranchMode::FanOut).unwrap(), json!("fan_out"));
        let mode: BranchMode = serde_json::from_value(json!("unified")).unwrap();
        assert_eq!(mode, BranchMode::Unified);
    }

    #[tokio::test]
    async fn test_document_load_missing_file_is_io_error() {
        let doc = Document::new("/nonexistent/onboarding/quote.pdf", "quote");
        assert_eq!(doc.file_name(), "quote.pdf");
        let err = doc.load().await.unwrap_err();
        assert_eq!(err.kind, crate::api::store::StoreErrorKind::Io);
    }
}
