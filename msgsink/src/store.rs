//! SQLite storage layer for ingested messages.
//!
//! A single `messages` table keyed by `message_id` is the only durable
//! state. Uniqueness of the idempotency key rides on the PRIMARY KEY
//! constraint, so concurrent inserts of the same id resolve inside SQLite
//! rather than in a check-then-insert race here.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

/// Storage-layer failure. Never produced for a duplicate insert, which is
/// a normal outcome, not an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message as received on the wire, before the store assigns `received_at`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    pub sent_at: String,
    pub text: String,
}

/// Persisted message row.
///
/// Serializes with the wire field names (`from`/`to`/`ts`) so handlers can
/// return rows directly. `received_at` is server-assigned epoch
/// milliseconds; `sent_at` is the caller's timestamp string, stored
/// verbatim and never validated against the wall clock.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub message_id: String,
    #[serde(rename = "from")]
    pub sender: String,
    #[serde(rename = "to")]
    pub recipient: String,
    #[serde(rename = "ts")]
    pub sent_at: String,
    pub text: String,
    pub received_at: i64,
}

/// Result of an idempotent insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Filters for listing messages. `limit`/`offset` shape only the returned
/// slice; the reported total is computed from the other fields alone.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    /// Exact match on the sender address.
    pub sender: Option<String>,
    /// Lexical lower bound on the caller-supplied `sent_at` string.
    pub since: Option<String>,
    /// Case-insensitive literal substring match on the message text.
    pub text_contains: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

/// One page of list results plus the filter-wide row count.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub items: Vec<Message>,
    pub total: u64,
}

/// Aggregates over the full store, read in one consistent snapshot.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total_messages: u64,
    pub unique_senders: u64,
    pub per_sender_counts: BTreeMap<String, u64>,
    pub first_received_at: Option<i64>,
    pub last_received_at: Option<i64>,
}

/// Cloneable handle over a single SQLite connection.
///
/// All access serializes on the connection mutex, which keeps reads from
/// ever observing a partially-written row.
#[derive(Clone)]
pub struct MessageStore {
    conn: Arc<Mutex<Connection>>,
}

impl MessageStore {
    /// Open or create a database at the given path. Creates the parent
    /// directory and schema if needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a message unless a row with its `message_id` already exists.
    ///
    /// Uses a plain INSERT and maps the primary-key constraint violation
    /// to `AlreadyExists`; the existing row is never touched, so
    /// `received_at` keeps its first-insert value. Any other SQLite
    /// failure surfaces as a `StoreError`.
    pub async fn insert_if_absent(&self, message: &NewMessage) -> Result<InsertOutcome, StoreError> {
        let received_at = now_epoch_ms();
        let conn = self.conn.lock().await;
        let result = conn.execute(
            "INSERT INTO messages (message_id, sender, recipient, sent_at, text, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.message_id,
                message.sender,
                message.recipient,
                message.sent_at,
                message.text,
                received_at
            ],
        );
        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(InsertOutcome::AlreadyExists)
            }
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// List messages matching the filter, ordered by `received_at` with
    /// `message_id` breaking ties.
    ///
    /// The count and the page run under one lock acquisition, so `total`
    /// and `items` come from the same snapshot.
    pub async fn list(&self, filter: &MessageFilter) -> Result<MessagePage, StoreError> {
        let mut where_sql = String::from(" WHERE 1=1");
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql + Send>> = Vec::new();

        if let Some(sender) = &filter.sender {
            where_sql.push_str(" AND sender = ?");
            bind_values.push(Box::new(sender.clone()));
        }
        if let Some(since) = &filter.since {
            where_sql.push_str(" AND sent_at >= ?");
            bind_values.push(Box::new(since.clone()));
        }
        if let Some(term) = &filter.text_contains {
            where_sql.push_str(" AND LOWER(text) LIKE ? ESCAPE '\\'");
            bind_values.push(Box::new(format!(
                "%{}%",
                escape_like(&term.to_lowercase())
            )));
        }

        let conn = self.conn.lock().await;

        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref() as &dyn rusqlite::types::ToSql).collect();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM messages{where_sql}"),
            bind_refs.as_slice(),
            |row| row.get(0),
        )?;

        let page_sql = format!(
            "SELECT message_id, sender, recipient, sent_at, text, received_at
             FROM messages{where_sql}
             ORDER BY received_at ASC, message_id ASC
             LIMIT ? OFFSET ?"
        );
        bind_values.push(Box::new(filter.limit as i64));
        bind_values.push(Box::new(filter.offset as i64));
        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref() as &dyn rusqlite::types::ToSql).collect();

        let mut stmt = conn.prepare(&page_sql)?;
        let rows = stmt.query_map(bind_refs.as_slice(), |row| {
            Ok(Message {
                message_id: row.get(0)?,
                sender: row.get(1)?,
                recipient: row.get(2)?,
                sent_at: row.get(3)?,
                text: row.get(4)?,
                received_at: row.get(5)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(MessagePage {
            items,
            total: total as u64,
        })
    }

    /// Aggregate statistics over the full, unfiltered store.
    ///
    /// All queries run under the same lock acquisition, so the counts and
    /// timestamps describe one snapshot and the per-sender counts always
    /// sum to the total.
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn.lock().await;

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;

        let mut stmt =
            conn.prepare("SELECT sender, COUNT(*) FROM messages GROUP BY sender")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut per_sender_counts = BTreeMap::new();
        for row in rows {
            let (sender, count) = row?;
            per_sender_counts.insert(sender, count as u64);
        }

        let (first, last): (Option<i64>, Option<i64>) = conn.query_row(
            "SELECT MIN(received_at), MAX(received_at) FROM messages",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(StoreStats {
            total_messages: total as u64,
            unique_senders: per_sender_counts.len() as u64,
            per_sender_counts,
            first_received_at: first,
            last_received_at: last,
        })
    }

    /// Cheap reachability probe used by the readiness endpoint.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            message_id  TEXT PRIMARY KEY,
            sender      TEXT NOT NULL,
            recipient   TEXT NOT NULL,
            sent_at     TEXT NOT NULL,
            text        TEXT NOT NULL,
            received_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_sender
            ON messages(sender, received_at);
        CREATE INDEX IF NOT EXISTS idx_messages_received
            ON messages(received_at, message_id);
        ",
    )?;
    Ok(())
}

/// Escape `%`, `_` and `\` so a search term matches as a literal
/// substring under `LIKE ... ESCAPE '\'`.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
