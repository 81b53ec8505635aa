//! Conversation state persistence boundary.
//!
//! The core only requires atomic read-then-write per conversation id and
//! never assumes a storage engine; the SQLite implementation below is the
//! one that ships, storing each state as a JSON payload row.

use crate::engage::state::ConversationState;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use uuid::Uuid;

/// Async conversation persistence contract.
pub trait StateStore: Send + Sync {
    fn load<'a>(
        &'a self,
        id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ConversationState>>> + Send + 'a>>;

    fn save<'a>(
        &'a self,
        state: &'a ConversationState,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn list_ids<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<Uuid>>> + Send + 'a>>;

    fn delete<'a>(&'a self, id: Uuid) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;
}

/// SQLite-backed store using an sqlx async pool.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

const SCHEMA_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS engagement_schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";
const SCHEMA_VERSION_KEY: &str = "engagement_schema_version";
const SCHEMA_VERSION: u32 = 1;

const CONVERSATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    id         TEXT PRIMARY KEY,
    status     TEXT NOT NULL,
    payload    TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

async fn ensure_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_META_TABLE)
        .execute(pool)
        .await
        .context("create engagement_schema_meta table")?;

    let stored: Option<(String,)> =
        sqlx::query_as("SELECT value FROM engagement_schema_meta WHERE key = $1")
            .bind(SCHEMA_VERSION_KEY)
            .fetch_optional(pool)
            .await
            .context("load engagement schema version")?;

    if let Some((value,)) = stored {
        let parsed = value
            .parse::<u32>()
            .with_context(|| format!("invalid engagement schema version value: {value}"))?;
        anyhow::ensure!(
            parsed == SCHEMA_VERSION,
            "incompatible engagement schema version: stored={parsed}, expected={SCHEMA_VERSION}. \
remove the engagement DB and restart."
        );
        return Ok(());
    }

    sqlx::query("INSERT INTO engagement_schema_meta (key, value) VALUES ($1, $2)")
        .bind(SCHEMA_VERSION_KEY)
        .bind(SCHEMA_VERSION.to_string())
        .execute(pool)
        .await
        .context("persist engagement schema version")?;

    Ok(())
}

impl SqliteStateStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        ensure_schema_version(&pool).await?;
        sqlx::query(CONVERSATIONS_TABLE)
            .execute(&pool)
            .await
            .context("create conversations table")?;
        Ok(Self { pool })
    }

    /// Open (creating if needed) a store at `path`. `:memory:` is accepted
    /// for ephemeral runs and pinned to a single connection, since every
    /// SQLite memory connection is its own database.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .context("parse sqlite path")?
            .create_if_missing(true);
        let in_memory = path.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .min_connections(u32::from(in_memory))
            .connect_with(options)
            .await
            .context("open engagement database")?;
        Self::new(pool).await
    }
}

impl StateStore for SqliteStateStore {
    fn load<'a>(
        &'a self,
        id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ConversationState>>> + Send + 'a>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT payload FROM conversations WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .context("load conversation")?;

            row.map(|row| {
                let payload: String = row.get("payload");
                serde_json::from_str(&payload)
                    .with_context(|| format!("decode conversation payload {id}"))
            })
            .transpose()
        })
    }

    fn save<'a>(
        &'a self,
        state: &'a ConversationState,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let payload = serde_json::to_string(state).context("encode conversation payload")?;
            sqlx::query(
                "INSERT INTO conversations (id, status, payload, updated_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT(id) DO UPDATE SET
                     status = excluded.status,
                     payload = excluded.payload,
                     updated_at = excluded.updated_at",
            )
            .bind(state.id.to_string())
            .bind(state.status().to_string())
            .bind(payload)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("save conversation")?;
            Ok(())
        })
    }

    fn list_ids<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<Uuid>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = sqlx::query("SELECT id FROM conversations ORDER BY updated_at DESC")
                .fetch_all(&self.pool)
                .await
                .context("list conversations")?;

            rows.iter()
                .map(|row| {
                    let id: String = row.get("id");
                    Uuid::parse_str(&id).with_context(|| format!("invalid conversation id {id}"))
                })
                .collect()
        })
    }

    fn delete<'a>(&'a self, id: Uuid) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .context("delete conversation")?;
            Ok(result.rows_affected() > 0)
        })
    }
}
