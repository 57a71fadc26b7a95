//! Durable client-side key/value store backed by SQLite.
//!
//! Only two keys live here: the session flag and the last successful training
//! run. Values are read once at startup and written synchronously on change.
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::instrument;

pub const AUTH_KEY: &str = "isAuthenticated";
pub const LAST_TRAIN_RUN_KEY: &str = "lastAiTrainRunTime";

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the store at `database_url` and apply
    /// migrations. The parent directory of a file store must already exist;
    /// `Config::ensure_dirs` creates the default one.
    pub async fn open(database_url: &str) -> Result<Self> {
        let in_memory = database_url.starts_with("sqlite::memory");
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url {}", database_url))?
            .create_if_missing(true);
        // Every in-memory connection is its own database.
        let max_connections = if in_memory { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("failed to open client store")?;
        if !in_memory {
            sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
        }
        sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to migrate client store")?;
        Ok(Self { pool })
    }

    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    /// Overwrites any previous value.
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
