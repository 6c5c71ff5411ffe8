//! Records, identities and per-kind field schemas

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Flat JSON object as exchanged with the backend
pub type Record = Map<String, Value>;

/// Prefix of client-generated identities
pub const TEMPORARY_PREFIX: &str = "tmp-";

/// Identity of a child record: a client token before save, the backend id after
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Identity {
    Temporary(String),
    Durable(String),
}

impl Identity {
    pub fn new_temporary() -> Self {
        Identity::Temporary(format!("{}{}", TEMPORARY_PREFIX, Uuid::new_v4()))
    }

    pub fn durable(id: impl Into<String>) -> Self {
        Identity::Durable(id.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Identity::Temporary(token) => token,
            Identity::Durable(id) => id,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Identity::Temporary(_))
    }

    /// Backend id, if this record was ever persisted
    pub fn durable_id(&self) -> Option<&str> {
        match self {
            Identity::Durable(id) => Some(id),
            Identity::Temporary(_) => None,
        }
    }

    /// Read the identity from a record's `id` field (string or number)
    pub fn from_record(record: &Record) -> Option<Self> {
        match record.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(Identity::from(s.clone())),
            Some(Value::Number(n)) => Some(Identity::Durable(n.to_string())),
            _ => None,
        }
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        if value.trim().is_empty() {
            Identity::new_temporary()
        } else if value.starts_with(TEMPORARY_PREFIX) {
            Identity::Temporary(value)
        } else {
            Identity::Durable(value)
        }
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        match value {
            Identity::Temporary(token) => token,
            Identity::Durable(id) => id,
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kinds of entities the onboarding core creates or edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Business,
    Lead,
    Contact,
    Competitor,
    Associate,
    FollowUpNote,
}

/// Fields the diff engine never compares
const COMMON_BOOKKEEPING: &[&str] = &["id", "created_at", "updated_at", "created_by", "updated_by"];

/// Field-level typing rules of an entity kind
#[derive(Debug, Clone, Copy)]
pub struct FieldSchema {
    /// Fields holding lists (real arrays or JSON-encoded strings)
    pub array_fields: &'static [&'static str],
    /// Scalars compared as text even when both sides look numeric
    pub text_fields: &'static [&'static str],
    /// Foreign keys and flags owned by the saga, not by the form
    pub bookkeeping_fields: &'static [&'static str],
}

impl FieldSchema {
    pub fn is_array(&self, field: &str) -> bool {
        self.array_fields.contains(&field)
    }

    pub fn is_text(&self, field: &str) -> bool {
        self.text_fields.contains(&field)
    }

    pub fn is_bookkeeping(&self, field: &str) -> bool {
        COMMON_BOOKKEEPING.contains(&field) || self.bookkeeping_fields.contains(&field)
    }
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Lead => "lead",
            Self::Contact => "contact",
            Self::Competitor => "competitor",
            Self::Associate => "associate",
            Self::FollowUpNote => "follow-up note",
        }
    }

    pub fn schema(&self) -> FieldSchema {
        match self {
            Self::Business => FieldSchema {
                array_fields: &["currencies"],
                text_fields: &["phone", "postal_code", "tax_id", "registration_number"],
                bookkeeping_fields: &["has_leads"],
            },
            Self::Lead => FieldSchema {
                array_fields: &["categories"],
                text_fields: &[],
                bookkeeping_fields: &["business_id"],
            },
            Self::Contact => FieldSchema {
                array_fields: &["channels"],
                text_fields: &["phone", "secondary_phone"],
                bookkeeping_fields: &["business_id"],
            },
            Self::Competitor => FieldSchema {
                array_fields: &[],
                text_fields: &[],
                bookkeeping_fields: &["lead_id"],
            },
            Self::Associate => FieldSchema {
                array_fields: &[],
                text_fields: &["phone"],
                bookkeeping_fields: &["lead_id"],
            },
            Self::FollowUpNote => FieldSchema {
                array_fields: &[],
                text_fields: &[],
                bookkeeping_fields: &["lead_id"],
            },
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Read a scalar field as trimmed text; numbers and booleans are stringified
pub fn text_field(record: &Record, field: &str) -> String {
    match record.get(field) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
