//! SQLite session store.
//!
//! One `sessions` table keyed by conversation id. Every write is a single
//! statement; conditional writes (`claim_root_span`, `update_thread_id`)
//! put the guard in the `WHERE` clause so concurrent turns converge on one
//! value without an explicit transaction. Transcript appends happen inside
//! SQLite (`json_insert`), never as a read followed by an overwrite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depo_core::error::{Result, SessionError};
use depo_core::session::{SessionRecord, SessionStore, TranscriptEntry};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

fn is_memory_path(path: &str) -> bool {
    path.contains(":memory:") || path.contains("mode=memory")
}

fn query_failed(context: &str) -> impl Fn(sqlx::Error) -> SessionError + '_ {
    move |e| SessionError::QueryFailed(format!("{context}: {e}"))
}

impl SqliteSessionStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// `"sqlite::memory:"` gives an ephemeral database on a single
    /// connection.
    pub async fn new(path: &str) -> Result<Self> {
        let memory = is_memory_path(path);
        if !memory {
            let file = path.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(file).parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SessionError::Storage(format!("Cannot create {}: {e}", parent.display())))?;
            }
        }

        let mut options = SqliteConnectOptions::from_str(path)
            .map_err(|e| SessionError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal);
        if !memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to connect: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(path, "SQLite session store initialized");
        Ok(store)
    }

    /// Wrap an existing pool. Migrations are run.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                conversation_id  TEXT PRIMARY KEY,
                root_span_id     TEXT,
                root_span_export TEXT,
                thread_id        TEXT,
                document_path    TEXT,
                transcript_json  TEXT NOT NULL DEFAULT '[]',
                created_at       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::MigrationFailed(format!("sessions table: {e}")))?;

        debug!("Session migrations complete");
        Ok(())
    }

    async fn ensure_row(&self, conversation_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (conversation_id, created_at) VALUES (?1, ?2)
             ON CONFLICT(conversation_id) DO NOTHING",
        )
        .bind(conversation_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(query_failed("insert session"))?;
        Ok(())
    }

    async fn fetch(&self, conversation_id: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(
            "SELECT conversation_id, root_span_id, root_span_export, thread_id,
                    document_path, transcript_json, created_at
             FROM sessions WHERE conversation_id = ?1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("select session"))?;

        row.map(|r| row_to_record(&r)).transpose()
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord> {
    let col = |name: &str| SessionError::QueryFailed(format!("column {name}"));

    let transcript_json: String = row.try_get("transcript_json").map_err(|_| col("transcript_json"))?;
    let transcript: Vec<TranscriptEntry> = serde_json::from_str(&transcript_json)
        .map_err(|e| SessionError::Storage(format!("Corrupt transcript: {e}")))?;

    let created_at: String = row.try_get("created_at").map_err(|_| col("created_at"))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SessionError::Storage(format!("Bad created_at: {e}")))?;

    Ok(SessionRecord {
        conversation_id: row.try_get("conversation_id").map_err(|_| col("conversation_id"))?,
        root_span_id: row.try_get("root_span_id").map_err(|_| col("root_span_id"))?,
        root_span_export: row.try_get("root_span_export").map_err(|_| col("root_span_export"))?,
        thread_id: row.try_get("thread_id").map_err(|_| col("thread_id"))?,
        document_ref: row.try_get("document_path").map_err(|_| col("document_path"))?,
        transcript,
        created_at,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_or_create(&self, conversation_id: &str) -> Result<SessionRecord> {
        self.ensure_row(conversation_id).await?;
        self.fetch(conversation_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(conversation_id.to_string()).into())
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<SessionRecord>> {
        self.fetch(conversation_id).await
    }

    async fn update_root_span(&self, conversation_id: &str, span_id: &str, export: &str) -> Result<()> {
        self.ensure_row(conversation_id).await?;
        sqlx::query("UPDATE sessions SET root_span_id = ?1, root_span_export = ?2 WHERE conversation_id = ?3")
            .bind(span_id)
            .bind(export)
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(query_failed("update root span"))?;
        Ok(())
    }

    async fn claim_root_span(&self, conversation_id: &str, span_id: &str, export: &str) -> Result<SessionRecord> {
        self.ensure_row(conversation_id).await?;
        let claimed = sqlx::query(
            "UPDATE sessions SET root_span_id = ?1, root_span_export = ?2
             WHERE conversation_id = ?3 AND root_span_export IS NULL",
        )
        .bind(span_id)
        .bind(export)
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(query_failed("claim root span"))?;
        debug!(conversation_id, won = claimed.rows_affected() == 1, "Root span claim");

        self.fetch(conversation_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(conversation_id.to_string()).into())
    }

    async fn update_thread_id(&self, conversation_id: &str, thread_id: &str) -> Result<()> {
        self.ensure_row(conversation_id).await?;
        sqlx::query("UPDATE sessions SET thread_id = ?1 WHERE conversation_id = ?2 AND thread_id IS NULL")
            .bind(thread_id)
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(query_failed("update thread id"))?;
        Ok(())
    }

    async fn update_document_ref(&self, conversation_id: &str, document_ref: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (conversation_id, document_path, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(conversation_id) DO UPDATE SET document_path = excluded.document_path",
        )
        .bind(conversation_id)
        .bind(document_ref)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(query_failed("update document"))?;
        Ok(())
    }

    async fn append_transcript(
        &self,
        conversation_id: &str,
        entries: &[TranscriptEntry],
    ) -> Result<Vec<TranscriptEntry>> {
        self.ensure_row(conversation_id).await?;
        let sql = append_statement(entries.len());
        let mut query = sqlx::query(&sql);
        for entry in entries {
            query = query.bind(serde_json::to_string(entry)?);
        }
        let row = query
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("append transcript"))?
            .ok_or_else(|| SessionError::NotFound(conversation_id.to_string()))?;

        let json: String = row
            .try_get("transcript_json")
            .map_err(|_| SessionError::QueryFailed("column transcript_json".into()))?;
        serde_json::from_str(&json).map_err(|e| SessionError::Storage(format!("Corrupt transcript: {e}")).into())
    }
}

/// One `UPDATE` that appends `count` bound entries (`?1..?count`) to the
/// stored array. `json_insert` applies its edits left to right, so each
/// `$[#]` lands after the previous one.
fn append_statement(count: usize) -> String {
    let edits: String = (1..=count).map(|i| format!(", '$[#]', json(?{i})")).collect();
    format!(
        "UPDATE sessions SET transcript_json = json_insert(transcript_json{edits})
         WHERE conversation_id = ?{} RETURNING transcript_json",
        count + 1
    )
}
