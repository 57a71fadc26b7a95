#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use steelvis::api::{DataSource, StatusReport};
use steelvis::error::TransportError;
use steelvis::model::{PageRequest, Record, ResourceKind};
use steelvis::storage::Store;
use steelvis::upload::UploadTable;
use tokio::sync::Mutex;

pub fn records(items: Value) -> Vec<Record> {
    items
        .as_array()
        .expect("array of records")
        .iter()
        .map(|v| v.as_object().cloned().expect("record object"))
        .collect()
}

pub fn unavailable() -> TransportError {
    TransportError::Status {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "backend down".into(),
    }
}

pub async fn temp_store(dir: &tempfile::TempDir) -> Store {
    let url = format!("sqlite://{}/client.db", dir.path().display());
    Store::open(&url).await.unwrap()
}

/// Fake backend answering from queued responses and recording every call.
#[derive(Clone, Default)]
pub struct RecordingSource {
    pages: Arc<Mutex<VecDeque<Result<Vec<Record>, TransportError>>>>,
    collections: Arc<Mutex<HashMap<ResourceKind, Vec<Record>>>>,
    fail_collections: Arc<Mutex<bool>>,
    statuses: Arc<Mutex<VecDeque<Result<StatusReport, TransportError>>>>,
    trigger_fails: Arc<Mutex<bool>>,
    page_calls: Arc<Mutex<Vec<(ResourceKind, PageRequest)>>>,
    status_calls: Arc<Mutex<usize>>,
    trigger_calls: Arc<Mutex<usize>>,
    uploads: Arc<Mutex<Vec<(UploadTable, String, usize)>>>,
    collection_calls: Arc<Mutex<usize>>,
    latency: Arc<Mutex<Duration>>,
}

impl RecordingSource {
    pub fn with_pages(pages: Vec<Result<Vec<Record>, TransportError>>) -> Self {
        Self {
            pages: Arc::new(Mutex::new(VecDeque::from(pages))),
            ..Default::default()
        }
    }

    pub fn with_statuses(statuses: Vec<Result<StatusReport, TransportError>>) -> Self {
        Self {
            statuses: Arc::new(Mutex::new(VecDeque::from(statuses))),
            ..Default::default()
        }
    }

    /// Every status and collection answer is delayed by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.lock().await = latency;
    }

    async fn wait(&self) {
        let latency = *self.latency.lock().await;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    pub async fn collection_calls(&self) -> usize {
        *self.collection_calls.lock().await
    }

    pub async fn push_page(&self, page: Result<Vec<Record>, TransportError>) {
        self.pages.lock().await.push_back(page);
    }

    pub async fn set_collection(&self, kind: ResourceKind, items: Vec<Record>) {
        self.collections.lock().await.insert(kind, items);
    }

    pub async fn fail_collections(&self, fail: bool) {
        *self.fail_collections.lock().await = fail;
    }

    pub async fn fail_trigger(&self, fail: bool) {
        *self.trigger_fails.lock().await = fail;
    }

    pub async fn page_calls(&self) -> Vec<(ResourceKind, PageRequest)> {
        self.page_calls.lock().await.clone()
    }

    pub async fn status_calls(&self) -> usize {
        *self.status_calls.lock().await
    }

    pub async fn trigger_calls(&self) -> usize {
        *self.trigger_calls.lock().await
    }

    pub async fn uploads(&self) -> Vec<(UploadTable, String, usize)> {
        self.uploads.lock().await.clone()
    }
}

#[async_trait]
impl DataSource for RecordingSource {
    async fn fetch_page(
        &self,
        resource: ResourceKind,
        page: PageRequest,
    ) -> Result<Vec<Record>, TransportError> {
        self.page_calls.lock().await.push((resource, page));
        self.pages.lock().await.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_all(&self, resource: ResourceKind) -> Result<Vec<Record>, TransportError> {
        *self.collection_calls.lock().await += 1;
        self.wait().await;
        if *self.fail_collections.lock().await {
            return Err(unavailable());
        }
        Ok(self
            .collections
            .lock()
            .await
            .get(&resource)
            .cloned()
            .unwrap_or_default())
    }

    async fn trigger_training(&self) -> Result<Value, TransportError> {
        *self.trigger_calls.lock().await += 1;
        if *self.trigger_fails.lock().await {
            return Err(unavailable());
        }
        Ok(json!({"message": "Training started"}))
    }

    async fn training_status(&self) -> Result<StatusReport, TransportError> {
        *self.status_calls.lock().await += 1;
        self.wait().await;
        self.statuses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(StatusReport::new("Idle", "")))
    }

    async fn upload_table(
        &self,
        table: UploadTable,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Value, TransportError> {
        self.uploads
            .lock()
            .await
            .push((table, file_name.to_string(), bytes.len()));
        Ok(json!({
            "message": format!("Excel file uploaded for table '{}'", table),
            "rows_uploaded": 2,
            "rows_failed": []
        }))
    }
}
