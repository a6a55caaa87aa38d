//! Memory Module
//!
//! Conversation threads persisted in SQLite through `sqlx`. A thread is keyed
//! by the owning resource (the agent id) together with the A2A `contextId`, so
//! two agents sharing a `contextId` never see each other's history. Agents
//! with memory enabled read the tail of the thread before calling the model
//! and append the new turn afterwards.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;

use crate::brain::provider::Role;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Memory database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to prepare memory directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt memory row: unknown role '{0}'")]
    UnknownRole(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

/// Handle to the memory database. Cheap to clone.
#[derive(Clone)]
pub struct MemoryStore {
    pool: SqlitePool,
}

impl MemoryStore {
    /// Open (creating if needed) the database at `db_path`.
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA busy_timeout = 3000")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA journal_mode = WAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA foreign_keys = ON")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.init_db().await?;

        tracing::info!("Memory database ready at {}", db_path.display());
        Ok(store)
    }

    /// Private in-memory database, used by tests and `ask` without memory.
    pub async fn in_memory() -> Result<Self> {
        // Every SQLite in-memory connection is its own database, so one connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_db().await?;
        Ok(store)
    }

    async fn init_db(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS threads (
                resource_id TEXT NOT NULL,
                id          TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (resource_id, id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_id TEXT NOT NULL,
                thread_id   TEXT NOT NULL,
                role        TEXT NOT NULL,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                FOREIGN KEY (resource_id, thread_id)
                    REFERENCES threads(resource_id, id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread
             ON messages(resource_id, thread_id, id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append messages to `resource_id`'s thread, creating it on first use.
    pub async fn append_messages(
        &self,
        resource_id: &str,
        thread_id: &str,
        messages: &[(Role, String)],
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO threads (resource_id, id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(resource_id, id) DO UPDATE SET updated_at = ?3",
        )
        .bind(resource_id)
        .bind(thread_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for (role, content) in messages {
            sqlx::query(
                "INSERT INTO messages (resource_id, thread_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(resource_id)
            .bind(thread_id)
            .bind(role_str(*role))
            .bind(content)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(
            "Appended {} messages to thread {}/{}",
            messages.len(),
            resource_id,
            thread_id
        );
        Ok(())
    }

    /// The last `limit` messages of `resource_id`'s thread, oldest first.
    pub async fn recent_messages(
        &self,
        resource_id: &str,
        thread_id: &str,
        limit: u32,
    ) -> Result<Vec<StoredMessage>> {
        if limit == 0 {
            return Ok(vec![]);
        }

        let rows = sqlx::query(
            "SELECT role, content, created_at FROM (
                SELECT id, role, content, created_at FROM messages
                WHERE resource_id = ?1 AND thread_id = ?2
                ORDER BY id DESC
                LIMIT ?3
             ) ORDER BY id ASC",
        )
        .bind(resource_id)
        .bind(thread_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let role: String = r.get("role");
                Ok(StoredMessage {
                    role: parse_role(&role)?,
                    content: r.get("content"),
                    created_at: r.get("created_at"),
                })
            })
            .collect()
    }

    pub async fn thread_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM threads")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn parse_role(s: &str) -> Result<Role> {
    match s {
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        other => Err(MemoryError::UnknownRole(other.to_string())),
    }
}
