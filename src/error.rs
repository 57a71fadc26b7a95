use reqwest::StatusCode;
use thiserror::Error;

/// Failure talking to the backend. Empty pages are not errors; see
/// `paginate::MergeOutcome::Exhausted`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to reach backend: {0}")]
    Network(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid backend response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid endpoint '{0}'")]
    Endpoint(String),
}

impl TransportError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Network(err) => err.status(),
            _ => None,
        }
    }
}
