//! Session Log - durable storage of each session's encoded history.
//!
//! One row per session in the `memory` table:
//!
//! ```text
//! sessionKey TEXT PRIMARY KEY | messages TEXT | created INTEGER | lastAccessed INTEGER
//! version INTEGER | messageCount INTEGER | totalTokens INTEGER | lastModel TEXT
//! ```
//!
//! The schema generation is tracked in `PRAGMA user_version` and upgraded
//! once, in a single transaction, when the log is opened. Columns added by an
//! upgrade carry neutral defaults so existing rows keep their meaning.
//!
//! All SQLite work runs on the blocking pool; the async API never blocks the
//! runtime. The single connection is shared behind a mutex.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{MemoryError, Result};
use crate::sqlite_util::open_secure_db;

/// Current schema generation written to `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 2;

/// Record generation stamped into the `version` column on every write.
/// Rows written before the column existed default to 1.
const RECORD_VERSION: i64 = 2;

const CREATE_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS memory (
        sessionKey TEXT PRIMARY KEY,
        messages TEXT,
        created INTEGER,
        lastAccessed INTEGER
    );
";

/// Bookkeeping columns introduced by schema generation 2.
const V2_COLUMNS: [(&str, &str); 4] = [
    (
        "version",
        "ALTER TABLE memory ADD COLUMN version INTEGER NOT NULL DEFAULT 1",
    ),
    (
        "messageCount",
        "ALTER TABLE memory ADD COLUMN messageCount INTEGER NOT NULL DEFAULT 0",
    ),
    (
        "totalTokens",
        "ALTER TABLE memory ADD COLUMN totalTokens INTEGER NOT NULL DEFAULT 0",
    ),
    ("lastModel", "ALTER TABLE memory ADD COLUMN lastModel TEXT"),
];

/// One write of a session's retained history.
#[derive(Debug, Clone)]
pub struct SessionWrite {
    pub session_key: String,
    /// Encoded message sequence.
    pub messages: String,
    /// Only used when the row is new.
    pub created_at: i64,
    pub last_accessed_at: i64,
    /// Length of the retained sequence after trimming.
    pub message_count: usize,
    /// Estimated tokens of the appended message, added to the running total.
    pub added_tokens: u64,
    /// Model that produced the appended message, if known.
    pub model: Option<String>,
}

/// Bookkeeping columns of one session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub created: i64,
    pub last_accessed: i64,
    pub version: i64,
    pub message_count: i64,
    pub total_tokens: i64,
    pub last_model: Option<String>,
}

/// Durable key-value table: session key -> encoded history.
#[derive(Clone)]
pub struct SessionLog {
    db: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SessionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLog").finish_non_exhaustive()
    }
}

impl SessionLog {
    /// Open or create the session log database at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let db = tokio::task::spawn_blocking(move || {
            let db = open_secure_db(&path)?;
            tracing::debug!(path = %path.display(), "Opened session log");
            Self::initialize(db)
        })
        .await
        .map_err(|e| MemoryError::StorageTask(format!("failed to open session log: {e}")))??;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Open an in-memory session log (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()
            .map_err(MemoryError::storage("Failed to open in-memory session log"))?;
        let db = Self::initialize(db)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn initialize(mut db: Connection) -> Result<Connection> {
        db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .map_err(MemoryError::storage("Failed to set session log pragmas"))?;
        migrate(&mut db)?;
        Ok(db)
    }

    async fn run_blocking<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|_| MemoryError::StorageTask("session log connection poisoned".into()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| MemoryError::StorageTask(format!("session log task failed: {e}")))?
    }

    /// The encoded history for `session_key`, or `None` if no row exists.
    ///
    /// A row whose `messages` column is NULL reads as an empty blob.
    pub async fn fetch(&self, session_key: &str) -> Result<Option<String>> {
        let session_key = session_key.to_string();
        self.run_blocking(move |db| {
            let row: Option<Option<String>> = db
                .query_row(
                    "SELECT messages FROM memory WHERE sessionKey = ?1",
                    params![session_key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(MemoryError::storage("Failed to fetch session"))?;
            Ok(row.map(Option::unwrap_or_default))
        })
        .await
    }

    /// Insert a new row, or replace the history of an existing one.
    ///
    /// An existing row keeps its `created` time. The statement is a single
    /// SQLite upsert, so concurrent writes to one key resolve last-writer-wins.
    pub async fn upsert(&self, write: SessionWrite) -> Result<()> {
        self.run_blocking(move |db| {
            db.execute(
                "INSERT INTO memory
                    (sessionKey, messages, created, lastAccessed,
                     version, messageCount, totalTokens, lastModel)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(sessionKey) DO UPDATE SET
                    messages = excluded.messages,
                    lastAccessed = excluded.lastAccessed,
                    version = excluded.version,
                    messageCount = excluded.messageCount,
                    totalTokens = memory.totalTokens + excluded.totalTokens,
                    lastModel = COALESCE(excluded.lastModel, memory.lastModel)",
                params![
                    write.session_key,
                    write.messages,
                    write.created_at,
                    write.last_accessed_at,
                    RECORD_VERSION,
                    i64::try_from(write.message_count).unwrap_or(i64::MAX),
                    i64::try_from(write.added_tokens).unwrap_or(i64::MAX),
                    write.model,
                ],
            )
            .map_err(MemoryError::storage("Failed to upsert session"))?;
            Ok(())
        })
        .await
    }

    /// Remove the row for `session_key`. Returns whether a row existed.
    pub async fn delete(&self, session_key: &str) -> Result<bool> {
        let session_key = session_key.to_string();
        self.run_blocking(move |db| {
            let removed = db
                .execute(
                    "DELETE FROM memory WHERE sessionKey = ?1",
                    params![session_key],
                )
                .map_err(MemoryError::storage("Failed to delete session"))?;
            Ok(removed > 0)
        })
        .await
    }

    /// Bookkeeping for `session_key`, or `None` if no row exists.
    pub async fn stats(&self, session_key: &str) -> Result<Option<SessionStats>> {
        let session_key = session_key.to_string();
        self.run_blocking(move |db| {
            db.query_row(
                "SELECT created, lastAccessed, version, messageCount, totalTokens, lastModel
                 FROM memory WHERE sessionKey = ?1",
                params![session_key],
                |row| {
                    Ok(SessionStats {
                        created: row.get::<_, Option<i64>>(0)?.unwrap_or_default(),
                        last_accessed: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
                        version: row.get(2)?,
                        message_count: row.get(3)?,
                        total_tokens: row.get(4)?,
                        last_model: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(MemoryError::storage("Failed to read session stats"))
        })
        .await
    }

    /// The schema generation recorded in the database.
    pub async fn schema_version(&self) -> Result<i64> {
        self.run_blocking(|db| read_user_version(db)).await
    }
}

fn read_user_version(db: &Connection) -> Result<i64> {
    db.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(MemoryError::storage("Failed to read schema version"))
}

/// Bring the schema up to `SCHEMA_VERSION`. Idempotent.
///
/// Each step checks the live column list first, so databases that already
/// gained some columns without a version bump upgrade cleanly.
fn migrate(db: &mut Connection) -> Result<()> {
    let current = read_user_version(db)?;
    if current >= SCHEMA_VERSION {
        if current > SCHEMA_VERSION {
            tracing::warn!(
                found = current,
                supported = SCHEMA_VERSION,
                "Session log schema is newer than this build"
            );
        }
        return Ok(());
    }

    let tx = db
        .transaction()
        .map_err(MemoryError::storage("Failed to start schema migration"))?;

    if current < 1 {
        tx.execute_batch(CREATE_TABLE)
            .map_err(MemoryError::storage("Failed to create memory table"))?;
    }

    if current < 2 {
        for (column, ddl) in V2_COLUMNS {
            if !has_column(&tx, column)? {
                tx.execute(ddl, [])
                    .map_err(MemoryError::storage(format!("Failed to add {column} column")))?;
            }
        }
    }

    tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))
        .map_err(MemoryError::storage("Failed to record schema version"))?;
    tx.commit()
        .map_err(MemoryError::storage("Failed to commit schema migration"))?;

    tracing::info!(from = current, to = SCHEMA_VERSION, "Upgraded session log schema");
    Ok(())
}

fn has_column(db: &Connection, column: &str) -> Result<bool> {
    let mut stmt = db
        .prepare("PRAGMA table_info(memory)")
        .map_err(MemoryError::storage("Failed to inspect memory schema"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(MemoryError::storage("Failed to query memory columns"))?;
    for name in rows {
        if name.map_err(MemoryError::storage("Failed to read memory column"))? == column {
            return Ok(true);
        }
    }
    Ok(false)
}
