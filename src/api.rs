use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::model::{PageRequest, Record, ResourceKind};
use crate::upload::UploadTable;

const TRIGGER_PATH: &str = "trigger-training";
const STATUS_PATH: &str = "training-status";
const UPLOAD_PATH: &str = "data/upload-excel";

/// Body of `GET /training-status`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusReport {
    #[serde(default = "unknown_status")]
    pub status: String,
    #[serde(default = "checking_message")]
    pub message: String,
}

fn unknown_status() -> String {
    "Unknown".to_string()
}

fn checking_message() -> String {
    "Checking status...".to_string()
}

impl StatusReport {
    pub fn new(status: &str, message: &str) -> Self {
        Self {
            status: status.to_string(),
            message: message.to_string(),
        }
    }
}

/// The remote backend as seen by the controllers.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// `GET /data/{resource}?page=&limit=`.
    async fn fetch_page(
        &self,
        resource: ResourceKind,
        page: PageRequest,
    ) -> Result<Vec<Record>, TransportError>;

    /// `GET /data/{resource}` without paging parameters.
    async fn fetch_all(&self, resource: ResourceKind) -> Result<Vec<Record>, TransportError>;

    async fn trigger_training(&self) -> Result<Value, TransportError>;

    async fn training_status(&self) -> Result<StatusReport, TransportError>;

    async fn upload_table(
        &self,
        table: UploadTable,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Value, TransportError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// `base_url` should end in `/`; see `config::normalize_base_url`.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder()
            .user_agent(concat!("steelvis/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|_| TransportError::Endpoint(path.to_string()))
    }

    pub fn build_page_request(
        &self,
        resource: ResourceKind,
        page: Option<PageRequest>,
    ) -> Result<reqwest::Request, TransportError> {
        let mut url = self.endpoint(&resource.path())?;
        if let Some(page) = page {
            url.query_pairs_mut()
                .append_pair("page", &page.page.to_string())
                .append_pair("limit", &page.limit.to_string());
        }
        Ok(self.http.request(Method::GET, url).build()?)
    }

    pub fn build_trigger_request(&self) -> Result<reqwest::Request, TransportError> {
        let url = self.endpoint(TRIGGER_PATH)?;
        Ok(self.http.post(url).json(&json!({})).build()?)
    }

    pub fn build_status_request(&self) -> Result<reqwest::Request, TransportError> {
        let url = self.endpoint(STATUS_PATH)?;
        Ok(self.http.get(url).build()?)
    }

    async fn execute(&self, request: reqwest::Request) -> Result<Value, TransportError> {
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "sending backend request");

        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%method, %url, %status, "backend request failed");
            return Err(TransportError::Status { status, body });
        }

        let body = res.text().await?;
        debug!(%url, %status, bytes = body.len(), "backend response");
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_records(
        &self,
        resource: ResourceKind,
        page: Option<PageRequest>,
    ) -> Result<Vec<Record>, TransportError> {
        let request = self.build_page_request(resource, page)?;
        let payload = self.execute(request).await?;
        Ok(records_from_envelope(payload))
    }
}

/// Unwraps `{ data: [...] }`. Anything that is not an array of objects reads
/// as an empty page.
pub fn records_from_envelope(payload: Value) -> Vec<Record> {
    match payload {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[async_trait]
impl DataSource for ApiClient {
    async fn fetch_page(
        &self,
        resource: ResourceKind,
        page: PageRequest,
    ) -> Result<Vec<Record>, TransportError> {
        self.fetch_records(resource, Some(page)).await
    }

    async fn fetch_all(&self, resource: ResourceKind) -> Result<Vec<Record>, TransportError> {
        self.fetch_records(resource, None).await
    }

    async fn trigger_training(&self) -> Result<Value, TransportError> {
        let request = self.build_trigger_request()?;
        self.execute(request).await
    }

    async fn training_status(&self) -> Result<StatusReport, TransportError> {
        let request = self.build_status_request()?;
        let payload = self.execute(request).await?;
        Ok(serde_json::from_value(payload)?)
    }

    async fn upload_table(
        &self,
        table: UploadTable,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Value, TransportError> {
        let url = self.endpoint(UPLOAD_PATH)?;
        let form = Form::new()
            .text("table", table.as_str())
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()));
        let request = self.http.post(url).multipart(form).build()?;
        self.execute(request).await
    }
}
