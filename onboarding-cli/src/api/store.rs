//! Remote collaborator contracts used by the onboarding core
//!
//! The saga, the reconciler and the edit session only ever talk to the backend
//! through these traits. [`super::BackendClient`] implements them over HTTP and
//! [`super::MemoryBackend`] implements them in-process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::resilience::RetryableError;
use crate::onboarding::types::Record;

/// Category of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreErrorKind {
    /// Connection refused, DNS, timeout
    Transport,
    /// Backend answered with a non-success status
    Status,
    /// Response body could not be interpreted
    Decode,
    /// Local I/O while preparing the request (e.g. reading a document)
    Io,
}

/// Error returned by any remote collaborator call
#[derive(Debug, Clone)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl StoreError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Transport,
            message: message.into(),
            status: None,
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Status,
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Decode,
            message: message.into(),
            status: None,
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Io,
            message: message.into(),
            status: None,
        }
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::status(404, format!("{} record '{}' not found", collection, id))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for StoreError {}

impl RetryableError for StoreError {
    fn is_retryable(&self) -> bool {
        match self.kind {
            StoreErrorKind::Transport => true,
            StoreErrorKind::Status => matches!(self.status, Some(429) | Some(500..=599)),
            StoreErrorKind::Decode | StoreErrorKind::Io => false,
        }
    }
}

/// Equality filter for [`EntityStore::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<(String, String)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `field = value` condition
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, String)] {
        &self.conditions
    }

    /// Check a record against every condition (values compared as strings)
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            match record.get(field) {
                Some(Value::String(s)) => s == expected,
                Some(Value::Null) | None => expected.is_empty(),
                Some(other) => other.to_string() == *expected,
            }
        })
    }
}

/// A file ready to be uploaded, with its free-text note
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub note: String,
}

/// Fire-and-forget notification payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Event name (e.g. "lead_created")
    pub event: String,
    /// Correlation id of the run that emitted it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub payload: Value,
}

/// Parent and dependent entity CRUD
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Create a record and return its backend-assigned id
    async fn create(&self, collection: &str, record: Record) -> Result<String, StoreError>;
    /// Apply a patch; every field present is treated as an authoritative change
    async fn update(&self, collection: &str, id: &str, patch: Record) -> Result<(), StoreError>;
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
    async fn list(&self, collection: &str, filter: &Filter) -> Result<Vec<Record>, StoreError>;
}

/// Bulk insert endpoint for associates, contacts, competitors and notes
#[async_trait]
pub trait BulkChildStore: Send + Sync {
    /// Insert all records and return their ids in input order
    async fn bulk_create(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<String>, StoreError>;
}

/// Opaque file storage attached to leads
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn upload(&self, lead_id: &str, files: Vec<DocumentUpload>) -> Result<(), StoreError>;
}

/// Notification sink; never awaited, failures are swallowed by the implementation
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Borrowed set of collaborators handed to the saga and the edit session
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub entities: &'a dyn EntityStore,
    pub bulk: &'a dyn BulkChildStore,
    pub documents: &'a dyn DocumentStore,
    pub notifier: &'a dyn NotificationSink,
}

impl<'a> Collaborators<'a> {
    /// Use one backend for every collaborator role
    pub fn from_backend<B>(backend: &'a B) -> Self
    where
        B: EntityStore + BulkChildStore + DocumentStore + NotificationSink,
    {
        Self {
            entities: backend,
            bulk: backend,
            documents: backend,
            notifier: backend,
        }
    }
}

/// Extract a record id from a create response (`{"id": ...}` or a bare id)
pub fn extract_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => obj.get("id").and_then(extract_id),
        _ => None,
    }
}
