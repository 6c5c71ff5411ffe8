//! In-process backend
//!
//! Implements every collaborator trait against in-memory collections and keeps a
//! journal of each call. Used by `--dry-run` and by the tests, which inject
//! failures per call kind and collection.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::operations::{CallKind, Operation, OperationResult};
use super::store::{
    BulkChildStore, DocumentStore, DocumentUpload, EntityStore, Filter, Notification,
    NotificationSink, StoreError,
};
use crate::onboarding::types::Record;

/// Collection used to journal and store uploaded documents
pub const DOCUMENTS_COLLECTION: &str = "documents";

#[derive(Debug, Clone)]
struct FailureRule {
    kind: CallKind,
    collection: String,
    /// Only fail when a record has this exact field value
    matcher: Option<(String, Value)>,
    /// `None` fails forever
    remaining: Option<u32>,
}

impl FailureRule {
    fn matches(&self, kind: CallKind, collection: &str, records: &[&Record]) -> bool {
        if self.kind != kind || self.collection != collection {
            return false;
        }
        if self.remaining == Some(0) {
            return false;
        }
        match &self.matcher {
            None => true,
            Some((field, value)) => records.iter().any(|r| r.get(field) == Some(value)),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, Vec<Record>>,
    next_id: u64,
    journal: Vec<OperationResult>,
    notifications: Vec<Notification>,
    failures: Vec<FailureRule>,
}

impl State {
    fn injected_failure(
        &mut self,
        kind: CallKind,
        collection: &str,
        records: &[&Record],
    ) -> Option<StoreError> {
        let rule = self
            .failures
            .iter_mut()
            .find(|rule| rule.matches(kind, collection, records))?;
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(StoreError::status(
            500,
            format!("injected {} failure on {}", kind, collection),
        ))
    }

    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("mem-{}", self.next_id)
    }

    fn insert(&mut self, collection: &str, mut record: Record) -> String {
        let id = self.allocate_id();
        record.insert("id".to_string(), Value::String(id.clone()));
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(record);
        id
    }

    fn position(&self, collection: &str, id: &str) -> Option<usize> {
        self.collections
            .get(collection)?
            .iter()
            .position(|r| r.get("id").and_then(Value::as_str) == Some(id))
    }

    fn log(&mut self, operation: Operation, result: &Result<Option<Value>, StoreError>) {
        log::debug!("[memory] {}", operation.describe());
        let entry = match result {
            Ok(data) => OperationResult::success(operation, data.clone()),
            Err(e) => OperationResult::error(operation, e.to_string(), e.status),
        };
        self.journal.push(entry);
    }
}

/// Backend keeping everything in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add_rule(&self, rule: FailureRule) {
        self.lock().failures.push(rule);
    }

    /// Fail every call of `kind` on `collection`
    pub fn fail_always(&self, kind: CallKind, collection: &str) {
        self.add_rule(FailureRule {
            kind,
            collection: collection.to_string(),
            matcher: None,
            remaining: None,
        });
    }

    pub fn journal(&self) -> Vec<OperationResult> {
        self.lock().journal.clone()
    }
}

#[cfg(test)]
impl MemoryBackend {
    /// Insert an existing record without journaling it
    pub fn seed(&self, collection: &str, id: &str, mut record: Record) {
        record.insert("id".to_string(), Value::String(id.to_string()));
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(record);
    }

    /// Fail the next call of `kind` on `collection`
    pub fn fail_next(&self, kind: CallKind, collection: &str) {
        self.add_rule(FailureRule {
            kind,
            collection: collection.to_string(),
            matcher: None,
            remaining: Some(1),
        });
    }

    /// Fail calls whose record has `field == value`
    pub fn fail_when(&self, kind: CallKind, collection: &str, field: &str, value: Value) {
        self.add_rule(FailureRule {
            kind,
            collection: collection.to_string(),
            matcher: Some((field.to_string(), value)),
            remaining: None,
        });
    }

    pub fn record(&self, collection: &str, id: &str) -> Option<Record> {
        let state = self.lock();
        let index = state.position(collection, id)?;
        state.collections.get(collection).map(|rows| rows[index].clone())
    }

    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Every attempted operation, failed ones included
    pub fn operations(&self) -> Vec<Operation> {
        self.lock()
            .journal
            .iter()
            .map(|entry| entry.operation.clone())
            .collect()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }
}

#[async_trait]
impl EntityStore for MemoryBackend {
    async fn create(&self, collection: &str, record: Record) -> Result<String, StoreError> {
        let mut state = self.lock();
        let operation = Operation::create(collection, record.clone());

        let result = match state.injected_failure(CallKind::Create, collection, &[&record]) {
            Some(err) => Err(err),
            None => Ok(state.insert(collection, record)),
        };
        state.log(operation, &result.as_ref().map(|id| Some(json!({ "id": id }))).map_err(Clone::clone));
        result
    }

    async fn update(&self, collection: &str, id: &str, patch: Record) -> Result<(), StoreError> {
        let mut state = self.lock();
        let operation = Operation::update(collection, id, patch.clone());

        let result = match state.injected_failure(CallKind::Update, collection, &[&patch]) {
            Some(err) => Err(err),
            None => match state.position(collection, id) {
                Some(index) => {
                    if let Some(rows) = state.collections.get_mut(collection) {
                        for (field, value) in patch {
                            rows[index].insert(field, value);
                        }
                    }
                    Ok(())
                }
                None => Err(StoreError::not_found(collection, id)),
            },
        };
        state.log(operation, &result.clone().map(|_| None));
        result
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let operation = Operation::delete(collection, id);

        let result = match state.injected_failure(CallKind::Delete, collection, &[]) {
            Some(err) => Err(err),
            None => match state.position(collection, id) {
                Some(index) => {
                    if let Some(rows) = state.collections.get_mut(collection) {
                        rows.remove(index);
                    }
                    Ok(())
                }
                None => Err(StoreError::not_found(collection, id)),
            },
        };
        state.log(operation, &result.clone().map(|_| None));
        result
    }

    async fn list(&self, collection: &str, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        let mut state = self.lock();
        let operation = Operation::List {
            collection: collection.to_string(),
            filter: filter.conditions().to_vec(),
        };

        let result = match state.injected_failure(CallKind::List, collection, &[]) {
            Some(err) => Err(err),
            None => Ok(state
                .collections
                .get(collection)
                .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
                .unwrap_or_default()),
        };
        state.log(
            operation,
            &result
                .as_ref()
                .map(|rows: &Vec<Record>| Some(json!({ "count": rows.len() })))
                .map_err(Clone::clone),
        );
        result
    }
}

#[async_trait]
impl BulkChildStore for MemoryBackend {
    async fn bulk_create(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<String>, StoreError> {
        let mut state = self.lock();
        let operation = Operation::BulkCreate {
            collection: collection.to_string(),
            records: records.clone(),
        };

        let refs: Vec<&Record> = records.iter().collect();
        let result = match state.injected_failure(CallKind::BulkCreate, collection, &refs) {
            Some(err) => Err(err),
            None => Ok(records
                .into_iter()
                .map(|record| state.insert(collection, record))
                .collect::<Vec<_>>()),
        };
        state.log(
            operation,
            &result
                .as_ref()
                .map(|ids| Some(json!({ "ids": ids })))
                .map_err(Clone::clone),
        );
        result
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn upload(&self, lead_id: &str, files: Vec<DocumentUpload>) -> Result<(), StoreError> {
        let mut state = self.lock();
        let operation = Operation::Upload {
            lead_id: lead_id.to_string(),
            files: files.iter().map(|f| f.file_name.clone()).collect(),
        };

        let result = match state.injected_failure(CallKind::Upload, DOCUMENTS_COLLECTION, &[]) {
            Some(err) => Err(err),
            None => {
                for file in files {
                    let mut record = Record::new();
                    record.insert("lead_id".into(), Value::String(lead_id.to_string()));
                    record.insert("file_name".into(), Value::String(file.file_name));
                    record.insert("note".into(), Value::String(file.note));
                    record.insert("size".into(), json!(file.bytes.len()));
                    state.insert(DOCUMENTS_COLLECTION, record);
                }
                Ok(())
            }
        };
        state.log(operation, &result.clone().map(|_| None));
        result
    }
}

impl NotificationSink for MemoryBackend {
    fn notify(&self, notification: Notification) {
        log::debug!("[memory] notify {}", notification.event);
        self.lock().notifications.push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_update_list_delete() {
        let backend = MemoryBackend::new();
        let id = backend
            .create("businesses", record(json!({"name": "Acme"})))
            .await
            .unwrap();

        backend
            .update("businesses", &id, record(json!({"name": "Acme Ltd"})))
            .await
            .unwrap();
        let listed = backend
            .list("businesses", &Filter::new().eq("id", id.clone()))
            .await
            .unwrap();
        assert_eq!(listed[0]["name"], json!("Acme Ltd"));

        backend.delete("businesses", &id).await.unwrap();
        assert!(backend.records("businesses").is_empty());
        assert_eq!(backend.journal().len(), 4);
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend
            .update("contacts", "nope", Record::new())
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(404));
    }

    #[tokio::test]
    async fn test_fail_next_only_fails_once() {
        let backend = MemoryBackend::new();
        backend.fail_next(CallKind::Create, "leads");

        assert!(backend.create("leads", Record::new()).await.is_err());
        assert!(backend.create("leads", Record::new()).await.is_ok());

        let journal = backend.journal();
        assert!(!journal[0].is_success());
        assert!(journal[1].is_success());
    }

    #[tokio::test]
    async fn test_fail_when_matches_field_value() {
        let backend = MemoryBackend::new();
        backend.fail_when(CallKind::BulkCreate, "competitors", "name", json!("Rival"));

        let ok = backend
            .bulk_create("competitors", vec![record(json!({"name": "Other"}))])
            .await;
        assert_eq!(ok.unwrap().len(), 1);

        let err = backend
            .bulk_create(
                "competitors",
                vec![record(json!({"name": "Other"})), record(json!({"name": "Rival"}))],
            )
            .await;
        assert!(err.is_err());
        assert_eq!(backend.records("competitors").len(), 1);
    }

    #[tokio::test]
    async fn test_upload_stores_document_records() {
        let backend = MemoryBackend::new();
        let upload = DocumentUpload {
            file_name: "quote.pdf".into(),
            bytes: vec![1, 2, 3],
            note: "signed".into(),
        };
        backend.upload("l1", vec![upload]).await.unwrap();

        let docs = backend.records(DOCUMENTS_COLLECTION);
        assert_eq!(docs[0]["size"], json!(3));
        assert_eq!(
            backend.operations()[0].describe(),
            "POST /leads/l1/documents [quote.pdf]"
        );
    }
}
