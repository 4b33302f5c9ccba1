//! SQLite note store
//!
//! Persists notes in a local SQLite file and broadcasts a change event
//! for every mutation made through this store (or a clone of it).
//! Writes from other processes sharing the file are not observed.

use super::{NoteStore, Subscription};
use crate::config::CHANGE_CHANNEL_CAPACITY;
use crate::error::{BoardError, Result};
use crate::model::{sort_for_board, ChangeEvent, ChangeKind, NewNote, Note, NoteColor, PositionUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Layout version stored in `PRAGMA user_version`
const SCHEMA_VERSION: i64 = 1;

/// Row as stored; color is kept as its hex string
#[derive(Debug, FromRow)]
struct NoteRow {
    id: String,
    content: String,
    author_name: String,
    color: String,
    position_x: f64,
    position_y: f64,
    created_at: DateTime<Utc>,
}

impl TryFrom<NoteRow> for Note {
    type Error = BoardError;

    fn try_from(row: NoteRow) -> Result<Self> {
        Ok(Note {
            color: NoteColor::from_str(&row.color)?,
            id: row.id,
            content: row.content,
            author_name: row.author_name,
            position_x: row.position_x,
            position_y: row.position_y,
            created_at: row.created_at,
        })
    }
}

/// Create the `sticky_notes` table and its ordering index on a fresh
/// database. A file written by a newer build is refused rather than
/// guessed at.
async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;

    if version == SCHEMA_VERSION {
        return Ok(());
    }
    if version > SCHEMA_VERSION {
        return Err(BoardError::Config(format!(
            "Note database has schema version {}, this build understands up to {}",
            version, SCHEMA_VERSION
        )));
    }

    tracing::info!("Creating sticky_notes schema (version {})", SCHEMA_VERSION);

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sticky_notes (
            id TEXT PRIMARY KEY NOT NULL,
            content TEXT NOT NULL,
            author_name TEXT NOT NULL DEFAULT '',
            color TEXT NOT NULL,
            position_x REAL NOT NULL DEFAULT 0,
            position_y REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sticky_notes_created_at ON sticky_notes(created_at)",
    )
    .execute(&mut *tx)
    .await?;
    // PRAGMA takes no bind parameters.
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}

/// Note store backed by SQLite
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    changes: broadcast::Sender<ChangeEvent>,
}

impl SqliteStore {
    /// Open the note file at `db_path`, creating it and its parent
    /// directory on first use.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        tracing::info!("Opened note store at {:?}", db_path);
        Self::with_pool(pool).await
    }

    /// Private in-memory database, gone when the store is dropped
    pub async fn in_memory() -> Result<Self> {
        // One connection: every connection to :memory: is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        ensure_schema(&pool).await?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self { pool, changes })
    }

    /// Get a note by ID
    pub async fn get_note(&self, id: &str) -> Result<Note> {
        let row = sqlx::query_as::<_, NoteRow>("SELECT * FROM sticky_notes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| BoardError::NoteNotFound(id.to_string()))?;

        row.try_into()
    }

    fn notify(&self, event: ChangeEvent) {
        let _ = self.changes.send(event);
    }
}

#[async_trait]
impl NoteStore for SqliteStore {
    async fn select_all(&self) -> Result<Vec<Note>> {
        let rows = sqlx::query_as::<_, NoteRow>(
            r#"
            SELECT * FROM sticky_notes
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut notes = rows
            .into_iter()
            .map(Note::try_from)
            .collect::<Result<Vec<_>>>()?;
        // Text timestamps with varying precision do not always sort lexically.
        sort_for_board(&mut notes);

        Ok(notes)
    }

    async fn insert(&self, req: NewNote) -> Result<Note> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let row = sqlx::query_as::<_, NoteRow>(
            r#"
            INSERT INTO sticky_notes (id, content, author_name, color, position_x, position_y, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&req.content)
        .bind(&req.author_name)
        .bind(req.color.hex())
        .bind(req.position_x)
        .bind(req.position_y)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Created note: {}", id);
        self.notify(ChangeEvent::new(ChangeKind::Insert, &id));

        row.try_into()
    }

    async fn update_position(&self, id: &str, update: PositionUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let rows = sqlx::query(
            r#"
            UPDATE sticky_notes
            SET position_x = COALESCE(?, position_x),
                position_y = COALESCE(?, position_y)
            WHERE id = ?
            "#,
        )
        .bind(update.position_x)
        .bind(update.position_y)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(BoardError::NoteNotFound(id.to_string()));
        }

        tracing::debug!("Moved note: {}", id);
        self.notify(ChangeEvent::new(ChangeKind::Update, id));
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let rows = sqlx::query("DELETE FROM sticky_notes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(BoardError::NoteNotFound(id.to_string()));
        }

        tracing::debug!("Deleted note: {}", id);
        self.notify(ChangeEvent::new(ChangeKind::Delete, id));
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        Ok(Subscription::new(self.changes.subscribe()))
    }
}
