//! Configuration loader and validator for the logistics dashboard client.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub api: Api,
    pub training: Training,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub request_timeout_secs: u64,
}

/// Backend REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    pub base_url: String,
    pub page_size: u32,
    pub refresh_interval_secs: u64,
}

/// Training job polling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Training {
    pub poll_interval_ms: u64,
}

impl App {
    /// `data_dir` with a leading `~/` expanded against `$HOME`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    /// Base URL of the backend, always ending in `/` so endpoint paths join
    /// underneath it instead of replacing its last segment.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        normalize_base_url(&self.api.base_url)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.api.refresh_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.training.poll_interval_ms)
    }

    /// SQLite URL of the durable client store. `DATABASE_URL` wins when set.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/steelvis.db", self.app.resolved_data_dir()))
    }
}

pub fn normalize_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };
    let url = Url::parse(&with_slash).map_err(|_| ConfigError::Invalid("api.base_url must be a valid URL"))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::Invalid("api.base_url must be a valid URL"));
    }
    Ok(url)
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("app.request_timeout_secs must be > 0"));
    }

    if cfg.api.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("api.base_url must be non-empty"));
    }
    cfg.base_url()?;
    if cfg.api.page_size == 0 {
        return Err(ConfigError::Invalid("api.page_size must be > 0"));
    }
    if cfg.api.refresh_interval_secs == 0 {
        return Err(ConfigError::Invalid("api.refresh_interval_secs must be > 0"));
    }

    if cfg.training.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("training.poll_interval_ms must be > 0"));
    }

    Ok(())
}

/// Returns the example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  request_timeout_secs: 15

api:
  base_url: "http://localhost:5000/api/main/v1/"
  page_size: 20
  refresh_interval_secs: 10

training:
  poll_interval_ms: 3000
"#
}
