//! Core Operation types describing every call made against the onboarding backend

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::onboarding::types::Record;

/// The kind of remote call, used to pick a retry policy and to match injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Create,
    Update,
    Delete,
    List,
    BulkCreate,
    Upload,
}

impl CallKind {
    /// Get the call kind as a string (matches the `[retry.<kind>]` config table names)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::BulkCreate => "bulk_create",
            Self::Upload => "upload",
        }
    }

    /// Whether repeating the call can produce duplicate records on the backend
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Self::Update | Self::Delete | Self::List)
    }

    pub fn all() -> &'static [CallKind] {
        &[
            Self::Create,
            Self::Update,
            Self::Delete,
            Self::List,
            Self::BulkCreate,
            Self::Upload,
        ]
    }
}

impl std::str::FromStr for CallKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::all().iter().map(CallKind::as_str).collect();
                format!("unknown call kind '{}', expected one of {}", s, known.join(", "))
            })
    }
}

impl std::fmt::Display for CallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents a single remote operation issued by the onboarding core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create a new record
    Create {
        /// Collection name (e.g., "businesses", "leads")
        collection: String,
        /// Record data
        data: Record,
    },
    /// Patch an existing record with changed fields only
    Update {
        collection: String,
        /// Durable record id
        id: String,
        data: Record,
    },
    /// Delete a record
    Delete { collection: String, id: String },
    /// List records matching an equality filter
    List {
        collection: String,
        filter: Vec<(String, String)>,
    },
    /// Insert many child records in a single call
    BulkCreate {
        collection: String,
        records: Vec<Record>,
    },
    /// Upload files attached to a lead
    Upload {
        lead_id: String,
        /// File names of the uploaded documents
        files: Vec<String>,
    },
}

impl Operation {
    pub fn create(collection: impl Into<String>, data: Record) -> Self {
        Self::Create {
            collection: collection.into(),
            data,
        }
    }

    pub fn update(collection: impl Into<String>, id: impl Into<String>, data: Record) -> Self {
        Self::Update {
            collection: collection.into(),
            id: id.into(),
            data,
        }
    }

    pub fn delete(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Delete {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Get the collection this operation targets
    pub fn collection(&self) -> &str {
        match self {
            Self::Create { collection, .. } => collection,
            Self::Update { collection, .. } => collection,
            Self::Delete { collection, .. } => collection,
            Self::List { collection, .. } => collection,
            Self::BulkCreate { collection, .. } => collection,
            Self::Upload { .. } => "documents",
        }
    }

    pub fn call_kind(&self) -> CallKind {
        match self {
            Self::Create { .. } => CallKind::Create,
            Self::Update { .. } => CallKind::Update,
            Self::Delete { .. } => CallKind::Delete,
            Self::List { .. } => CallKind::List,
            Self::BulkCreate { .. } => CallKind::BulkCreate,
            Self::Upload { .. } => CallKind::Upload,
        }
    }

    /// One-line description for logs and dry-run output
    pub fn describe(&self) -> String {
        match self {
            Self::Create { collection, data } => {
                format!("POST /{} ({} fields)", collection, data.len())
            }
            Self::Update {
                collection,
                id,
                data,
            } => {
                let mut fields: Vec<&str> = data.keys().map(|k| k.as_str()).collect();
                fields.sort();
                format!("PATCH /{}/{} [{}]", collection, id, fields.join(", "))
            }
            Self::Delete { collection, id } => format!("DELETE /{}/{}", collection, id),
            Self::List { collection, filter } => {
                let query: Vec<String> = filter.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                format!("GET /{}?{}", collection, query.join("&"))
            }
            Self::BulkCreate {
                collection,
                records,
            } => format!("POST /{}/bulk ({} records)", collection, records.len()),
            Self::Upload { lead_id, files } => {
                format!("POST /leads/{}/documents [{}]", lead_id, files.join(", "))
            }
        }
    }
}

/// Result of executing an Operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    /// The operation that was executed
    pub operation: Operation,
    /// Whether the operation succeeded
    pub success: bool,
    /// Response data (created ids, listed records, etc.)
    pub data: Option<Value>,
    /// Error message if operation failed
    pub error: Option<String>,
    /// HTTP status code from the response
    pub status_code: Option<u16>,
}

impl OperationResult {
    /// Create a new successful result
    pub fn success(operation: Operation, data: Option<Value>) -> Self {
        Self {
            operation,
            success: true,
            data,
            error: None,
            status_code: Some(200),
        }
    }

    /// Create a new error result
    pub fn error(operation: Operation, error: String, status_code: Option<u16>) -> Self {
        Self {
            operation,
            success: false,
            data: None,
            error: Some(error),
            status_code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}
