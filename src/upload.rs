//! Bulk table load from a spreadsheet file.
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::api::DataSource;
use crate::error::TransportError;

const SPREADSHEET_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unsupported table '{0}'")]
    UnknownTable(String),
    #[error("'{0}' is not a spreadsheet (expected .xlsx or .xls)")]
    UnsupportedFile(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTable {
    Plants,
    Ports,
    Trains,
    Vessels,
    PortTariffs,
    VesselDelayHistory,
}

impl UploadTable {
    pub const ALL: [UploadTable; 6] = [
        UploadTable::Plants,
        UploadTable::Ports,
        UploadTable::Trains,
        UploadTable::Vessels,
        UploadTable::PortTariffs,
        UploadTable::VesselDelayHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadTable::Plants => "plants",
            UploadTable::Ports => "ports",
            UploadTable::Trains => "trains",
            UploadTable::Vessels => "vessels",
            UploadTable::PortTariffs => "port_tariffs",
            UploadTable::VesselDelayHistory => "vessel_delay_history",
        }
    }
}

impl fmt::Display for UploadTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadTable {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        UploadTable::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| UploadError::UnknownTable(s.to_string()))
    }
}

/// Backend summary of an upload. `raw` keeps the full body for display.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReport {
    pub message: Option<String>,
    pub rows_uploaded: Option<u64>,
    pub rows_failed: Vec<Value>,
    pub raw: Value,
}

#[derive(Deserialize, Default)]
struct ReportFields {
    message: Option<String>,
    rows_uploaded: Option<u64>,
    #[serde(default)]
    rows_failed: Vec<Value>,
}

impl UploadReport {
    pub fn from_body(raw: Value) -> Self {
        let fields: ReportFields = serde_json::from_value(raw.clone()).unwrap_or_default();
        Self {
            message: fields.message,
            rows_uploaded: fields.rows_uploaded,
            rows_failed: fields.rows_failed,
            raw,
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.rows_failed.is_empty()
    }
}

pub fn check_spreadsheet(path: &Path) -> Result<(), UploadError> {
    let ok = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| SPREADSHEET_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err(UploadError::UnsupportedFile(path.display().to_string()))
    }
}

/// Validate, read and send `path` as the contents of `table`.
#[instrument(skip(source))]
pub async fn upload_spreadsheet(
    source: &dyn DataSource,
    table: UploadTable,
    path: &Path,
) -> Result<UploadReport, UploadError> {
    check_spreadsheet(path)?;
    let bytes = tokio::fs::read(path).await.map_err(|err| UploadError::Io {
        path: path.display().to_string(),
        source: err,
    })?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.xlsx")
        .to_string();

    info!(%table, file = %file_name, bytes = bytes.len(), "uploading spreadsheet");
    let body = source.upload_table(table, &file_name, bytes).await?;
    let report = UploadReport::from_body(body);
    if report.is_partial() {
        warn!(%table, failed = report.rows_failed.len(), "upload partially failed");
    }
    Ok(report)
}
