//! HTTP implementation of the onboarding collaborators
//!
//! Talks to a REST backend:
//! - `POST /{collection}`, `PATCH /{collection}/{id}`, `DELETE /{collection}/{id}`
//! - `GET /{collection}?field=value`
//! - `POST /{collection}/bulk`
//! - multipart `POST /leads/{id}/documents`
//! - `POST /notifications` (fire-and-forget)
//!
//! Every call goes through the retry policy configured for its call kind.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, multipart};
use serde_json::{Value, json};
use std::time::Duration;

use super::operations::{CallKind, Operation};
use super::resilience::{ResilienceConfig, RetryPolicy};
use super::store::{
    BulkChildStore, DocumentStore, DocumentUpload, EntityStore, Filter, Notification,
    NotificationSink, StoreError, extract_id,
};
use crate::onboarding::types::Record;

const CORRELATION_HEADER: &str = "X-Correlation-Id";
/// Error bodies are cut to this many characters in messages
const MAX_ERROR_BODY: usize = 300;

/// REST client for the onboarding backend
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    resilience: ResilienceConfig,
    correlation_id: Option<String>,
}

impl BackendClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
        resilience: ResilienceConfig,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("onboarding-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            resilience,
            correlation_id: None,
        })
    }

    /// Attach a correlation id to every request
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut builder = self.http.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if self.resilience.monitoring.correlation_ids {
            if let Some(id) = &self.correlation_id {
                builder = builder.header(CORRELATION_HEADER, id);
            }
        }
        builder
    }

    /// Send a request built by `build` under the retry policy of `operation`'s call kind
    async fn execute<F>(&self, operation: &Operation, build: F) -> Result<Value, StoreError>
    where
        F: Fn() -> RequestBuilder,
    {
        let kind = operation.call_kind();
        let policy = RetryPolicy::new(self.resilience.retry_for(kind).clone());
        let description = operation.describe();
        let logging = self.resilience.monitoring.request_logging;

        policy
            .execute(&description, || {
                let request = build();
                let description = description.clone();
                async move {
                    if logging {
                        log::debug!("-> {}", description);
                    }
                    let response = request.send().await.map_err(map_reqwest_error)?;
                    let status = response.status();
                    if logging {
                        log::debug!("<- {} {}", status.as_u16(), description);
                    }

                    let body = response.text().await.map_err(map_reqwest_error)?;
                    if !status.is_success() {
                        let message: String = body.chars().take(MAX_ERROR_BODY).collect();
                        return Err(StoreError::status(status.as_u16(), message));
                    }
                    if body.trim().is_empty() {
                        return Ok(Value::Null);
                    }
                    serde_json::from_str(&body)
                        .map_err(|e| StoreError::decode(format!("invalid JSON response: {}", e)))
                }
            })
            .await
    }
}

fn map_reqwest_error(err: reqwest::Error) -> StoreError {
    if err.is_decode() {
        StoreError::decode(err.to_string())
    } else if let Some(status) = err.status() {
        StoreError::status(status.as_u16(), err.to_string())
    } else {
        StoreError::transport(err.to_string())
    }
}

/// Accept `[...]`, `{"items": [...]}` and `{"value": [...]}`
fn response_rows(body: Value) -> Result<Vec<Value>, StoreError> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut obj) => ["items", "value", "records"]
            .iter()
            .find_map(|key| match obj.remove(*key) {
                Some(Value::Array(rows)) => Some(rows),
                _ => None,
            })
            .ok_or_else(|| StoreError::decode("response has no record list")),
        Value::Null => Ok(Vec::new()),
        other => Err(StoreError::decode(format!("unexpected response: {}", other))),
    }
}

fn bulk_ids(body: Value, expected: usize) -> Result<Vec<String>, StoreError> {
    let rows = match body {
        Value::Object(mut obj) if obj.contains_key("ids") => match obj.remove("ids") {
            Some(Value::Array(ids)) => ids,
            _ => Vec::new(),
        },
        other => response_rows(other)?,
    };

    let ids: Vec<String> = rows.iter().filter_map(extract_id).collect();
    if ids.len() != expected {
        return Err(StoreError::decode(format!(
            "bulk insert returned {} ids for {} records",
            ids.len(),
            expected
        )));
    }
    Ok(ids)
}

#[async_trait]
impl EntityStore for BackendClient {
    async fn create(&self, collection: &str, record: Record) -> Result<String, StoreError> {
        let operation = Operation::create(collection, record.clone());
        let body = self
            .execute(&operation, || self.request(Method::POST, collection).json(&record))
            .await?;
        extract_id(&body).ok_or_else(|| StoreError::decode("create response has no id"))
    }

    async fn update(&self, collection: &str, id: &str, patch: Record) -> Result<(), StoreError> {
        let operation = Operation::update(collection, id, patch.clone());
        let path = format!("{}/{}", collection, id);
        self.execute(&operation, || self.request(Method::PATCH, &path).json(&patch))
            .await
            .map(|_| ())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let operation = Operation::delete(collection, id);
        let path = format!("{}/{}", collection, id);
        self.execute(&operation, || self.request(Method::DELETE, &path))
            .await
            .map(|_| ())
    }

    async fn list(&self, collection: &str, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        let operation = Operation::List {
            collection: collection.to_string(),
            filter: filter.conditions().to_vec(),
        };
        let body = self
            .execute(&operation, || {
                self.request(Method::GET, collection)
                    .query(filter.conditions())
            })
            .await?;

        response_rows(body)?
            .into_iter()
            .map(|row| match row {
                Value::Object(record) => Ok(record),
                other => Err(StoreError::decode(format!("expected a record, got {}", other))),
            })
            .collect()
    }
}

#[async_trait]
impl BulkChildStore for BackendClient {
    async fn bulk_create(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<String>, StoreError> {
        let expected = records.len();
        let path = format!("{}/bulk", collection);
        let payload = json!({ "records": records });
        let operation = Operation::BulkCreate {
            collection: collection.to_string(),
            records,
        };

        let body = self
            .execute(&operation, || self.request(Method::POST, &path).json(&payload))
            .await?;
        bulk_ids(body, expected)
    }
}

#[async_trait]
impl DocumentStore for BackendClient {
    async fn upload(&self, lead_id: &str, files: Vec<DocumentUpload>) -> Result<(), StoreError> {
        let operation = Operation::Upload {
            lead_id: lead_id.to_string(),
            files: files.iter().map(|f| f.file_name.clone()).collect(),
        };
        let path = format!("leads/{}/documents", lead_id);

        self.execute(&operation, || {
            let mut form = multipart::Form::new();
            for (index, file) in files.iter().enumerate() {
                let part = multipart::Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
                form = form
                    .part(format!("file_{}", index), part)
                    .text(format!("note_{}", index), file.note.clone());
            }
            self.request(Method::POST, &path).multipart(form)
        })
        .await
        .map(|_| ())
    }
}

impl NotificationSink for BackendClient {
    /// Sent on a background task; the result is only logged
    fn notify(&self, notification: Notification) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::debug!("No runtime available, dropping notification {}", notification.event);
            return;
        };

        let request = self.request(Method::POST, "notifications").json(&notification);
        handle.spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => log::debug!(
                    "Notification {} rejected with {}",
                    notification.event,
                    response.status()
                ),
                Ok(_) => {}
                Err(e) => log::debug!("Notification {} failed: {}", notification.event, e),
            }
        });
    }
}
