//! SQLite persistence for ingested mail.
//!
//! One database holds the four record kinds (messages, addresses, headers,
//! attachments) plus an FTS5 mirror of the searchable message columns,
//! maintained by triggers. Uniqueness constraints on `original_path` and
//! `message_id` are the dedup backstop; each message's ingestion runs in
//! one transaction so a failure leaves no partial rows behind.
//!
//! Row-level operations are free functions over [`rusqlite::Connection`] so
//! they work identically on a plain connection and inside a
//! [`rusqlite::Transaction`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::limits::Limit;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{IndexError, Result};
use crate::model::{AddressRecord, AttachmentRecord, MessageRecord, RecipientKind};

/// Schema DDL run on open.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS addresses (
    id            INTEGER PRIMARY KEY,
    kind          INTEGER NOT NULL DEFAULT 2,
    email         TEXT NOT NULL UNIQUE COLLATE NOCASE,
    display_names TEXT,
    created_at    TEXT NOT NULL,
    indexing_log  TEXT
);

CREATE TABLE IF NOT EXISTS messages (
    id            INTEGER PRIMARY KEY,
    kind          INTEGER NOT NULL DEFAULT 1,
    message_id    TEXT NOT NULL UNIQUE,
    original_path TEXT NOT NULL UNIQUE,
    subject       TEXT,
    in_reply_to   TEXT,
    date          TEXT,
    author_id     INTEGER REFERENCES addresses(id),
    content_text  TEXT,
    content_html  TEXT,
    created_at    TEXT NOT NULL,
    indexing_log  TEXT
);

CREATE TABLE IF NOT EXISTS headers (
    id           INTEGER PRIMARY KEY,
    kind         INTEGER NOT NULL DEFAULT 4,
    message_id   INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    name         TEXT NOT NULL,
    value        TEXT,
    created_at   TEXT NOT NULL,
    indexing_log TEXT
);

CREATE TABLE IF NOT EXISTS attachments (
    id           INTEGER PRIMARY KEY,
    kind         INTEGER NOT NULL DEFAULT 3,
    message_id   INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    file_name    TEXT,
    content_type TEXT,
    content      BLOB,
    created_at   TEXT NOT NULL,
    indexing_log TEXT
);

CREATE TABLE IF NOT EXISTS recipients (
    message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    address_id INTEGER NOT NULL REFERENCES addresses(id),
    list_kind  TEXT NOT NULL CHECK (list_kind IN ('to', 'cc')),
    position   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_headers_message ON headers(message_id);
CREATE INDEX IF NOT EXISTS idx_attachments_message ON attachments(message_id);
CREATE INDEX IF NOT EXISTS idx_recipients_message
    ON recipients(message_id, list_kind, position);

CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
    subject,
    content_text,
    content_html,
    content='messages',
    content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS messages_ai AFTER INSERT ON messages BEGIN
    INSERT INTO messages_fts(rowid, subject, content_text, content_html)
    VALUES (new.id, new.subject, new.content_text, new.content_html);
END;

CREATE TRIGGER IF NOT EXISTS messages_ad AFTER DELETE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, subject, content_text, content_html)
    VALUES ('delete', old.id, old.subject, old.content_text, old.content_html);
END;

CREATE TRIGGER IF NOT EXISTS messages_au AFTER UPDATE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, subject, content_text, content_html)
    VALUES ('delete', old.id, old.subject, old.content_text, old.content_html);
    INSERT INTO messages_fts(rowid, subject, content_text, content_html)
    VALUES (new.id, new.subject, new.content_text, new.content_html);
END;
";

/// Handle to the mail database.
pub struct MailStore {
    conn: Connection,
    path: PathBuf,
}

impl MailStore {
    /// Open (or create) the database at `path`, creating parent
    /// directories and running the schema DDL.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;
        }
        let conn = Connection::open(&path)?;
        Self::init(conn, path)
    }

    /// Open an ephemeral in-memory store (tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.display(), "Opened mail store");
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lower the engine-enforced per-record byte ceiling.
    ///
    /// Writes of any single string or blob beyond this length fail with
    /// the size-limit error that drives the adaptive shrink-and-retry
    /// path. The engine clamps the value to its compiled-in maximum.
    pub fn set_record_size_limit(&self, bytes: i32) {
        let previous = self.conn.set_limit(Limit::SQLITE_LIMIT_LENGTH, bytes);
        debug!(bytes, previous, "Adjusted record size limit");
    }

    /// Begin a transaction covering one message's ingestion.
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Read-only access for lookups outside a transaction.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Record counts and on-disk size, for the stats report.
    pub fn stats(&self) -> Result<StoreStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };
        let db_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(StoreStats {
            messages: count("SELECT COUNT(*) FROM messages")?,
            addresses: count("SELECT COUNT(*) FROM addresses")?,
            headers: count("SELECT COUNT(*) FROM headers")?,
            attachments: count("SELECT COUNT(*) FROM attachments")?,
            db_bytes,
        })
    }

    /// Thin full-text lookup over subject and bodies.
    ///
    /// The query string is passed to the engine's MATCH as-is; ranking is
    /// whatever the engine does by default. Consumers needing real ranking
    /// live outside this crate.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.id, m.message_id, m.subject, m.original_path
             FROM messages_fts f
             JOIN messages m ON m.id = f.rowid
             WHERE messages_fts MATCH ?1
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![query, limit as i64], |row| {
                Ok(SearchHit {
                    id: row.get(0)?,
                    message_id: row.get(1)?,
                    subject: row.get(2)?,
                    original_path: row.get(3)?,
                })
            })
            .map_err(|e| IndexError::Query(e.to_string()))?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row.map_err(|e| IndexError::Query(e.to_string()))?);
        }
        Ok(hits)
    }

    /// Fetch a message by id.
    pub fn message(&self, id: i64) -> Result<MessageRecord> {
        get_message(&self.conn, id)
    }

    /// Fetch an attachment with its raw bytes (the retrieval endpoint's
    /// backing lookup).
    pub fn attachment(&self, id: i64) -> Result<AttachmentRecord> {
        self.conn
            .query_row(
                "SELECT id, message_id, file_name, content_type, content, created_at
                 FROM attachments WHERE id = ?1",
                [id],
                |row| {
                    Ok(AttachmentRecord {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        file_name: row.get(2)?,
                        content_type: row.get(3)?,
                        content: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?
            .ok_or(IndexError::RecordNotFound {
                kind: "attachment",
                id,
            })
    }
}

/// One full-text search result.
#[derive(Debug, serde::Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub message_id: String,
    pub subject: Option<String>,
    pub original_path: String,
}

/// Record counts for the stats report.
#[derive(Debug, serde::Serialize)]
pub struct StoreStats {
    pub messages: i64,
    pub addresses: i64,
    pub headers: i64,
    pub attachments: i64,
    pub db_bytes: u64,
}

// ── Row-level operations (usable inside a transaction) ──────────

/// Whether a message with this source path already exists.
pub fn message_exists_by_path(conn: &Connection, path: &str) -> Result<bool> {
    exists(conn, "SELECT 1 FROM messages WHERE original_path = ?1", path)
}

/// Whether a message with this Message-ID already exists.
pub fn message_exists_by_message_id(conn: &Connection, message_id: &str) -> Result<bool> {
    exists(conn, "SELECT 1 FROM messages WHERE message_id = ?1", message_id)
}

fn exists(conn: &Connection, sql: &str, key: &str) -> Result<bool> {
    Ok(conn
        .query_row(sql, [key], |_| Ok(()))
        .optional()?
        .is_some())
}

/// Insert the partial message row (no bodies yet). Returns the new id.
#[allow(clippy::too_many_arguments)]
pub fn insert_message(
    conn: &Connection,
    message_id: &str,
    original_path: &str,
    subject: Option<&str>,
    in_reply_to: Option<&str>,
    date: Option<DateTime<Utc>>,
    author_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO messages
            (message_id, original_path, subject, in_reply_to, date, author_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            message_id,
            original_path,
            subject,
            in_reply_to,
            date,
            author_id,
            Utc::now()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Write the message bodies and the rendered diagnostic log.
///
/// The engine's record size limit bounds the whole row, not one column,
/// so bodies and log land in a single statement and this is the only
/// write that can be rejected with the size-limit error. Callers own the
/// shrink-and-retry policy.
pub fn update_message_content(
    conn: &Connection,
    id: i64,
    content_text: Option<&str>,
    content_html: Option<&str>,
    indexing_log: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE messages
         SET content_text = ?2, content_html = ?3, indexing_log = ?4
         WHERE id = ?1",
        params![id, content_text, content_html, indexing_log],
    )?;
    Ok(())
}

/// Insert one attachment row. Returns the new id.
pub fn insert_attachment(
    conn: &Connection,
    message_id: i64,
    file_name: Option<&str>,
    content_type: Option<&str>,
    content: &[u8],
) -> Result<i64> {
    conn.execute(
        "INSERT INTO attachments (message_id, file_name, content_type, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![message_id, file_name, content_type, content, Utc::now()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert one header row.
pub fn insert_header(
    conn: &Connection,
    message_id: i64,
    name: &str,
    value: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO headers (message_id, name, value, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![message_id, name, value, Utc::now()],
    )?;
    Ok(())
}

/// Attach one recipient at its position on the given list.
pub fn insert_recipient(
    conn: &Connection,
    message_id: i64,
    address_id: i64,
    kind: RecipientKind,
    position: usize,
) -> Result<()> {
    conn.execute(
        "INSERT INTO recipients (message_id, address_id, list_kind, position)
         VALUES (?1, ?2, ?3, ?4)",
        params![message_id, address_id, kind.as_str(), position as i64],
    )?;
    Ok(())
}

/// Look up an address by case-folded email.
pub fn find_address(conn: &Connection, email: &str) -> Result<Option<AddressRecord>> {
    Ok(conn
        .query_row(
            "SELECT id, email, display_names, created_at, indexing_log
             FROM addresses WHERE email = ?1 COLLATE NOCASE",
            [email],
            |row| {
                Ok(AddressRecord {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    display_names: row.get(2)?,
                    created_at: row.get(3)?,
                    indexing_log: row.get(4)?,
                })
            },
        )
        .optional()?)
}

/// Create an address on first sighting. Returns the new id.
pub fn insert_address(
    conn: &Connection,
    email: &str,
    display_name: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO addresses (email, display_names, created_at) VALUES (?1, ?2, ?3)",
        params![email, display_name, Utc::now()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Replace the comma-joined display-name list of an address.
pub fn update_address_names(conn: &Connection, id: i64, joined: &str) -> Result<()> {
    conn.execute(
        "UPDATE addresses SET display_names = ?2 WHERE id = ?1",
        params![id, joined],
    )?;
    Ok(())
}

/// Append one diagnostic note to an address's log.
pub fn append_address_note(conn: &Connection, id: i64, note: &str) -> Result<()> {
    conn.execute(
        "UPDATE addresses
         SET indexing_log = CASE
             WHEN indexing_log IS NULL THEN ?2
             ELSE indexing_log || char(10) || ?2
         END
         WHERE id = ?1",
        params![id, note],
    )?;
    Ok(())
}

/// Fetch a message by id.
pub fn get_message(conn: &Connection, id: i64) -> Result<MessageRecord> {
    conn.query_row(
        "SELECT id, message_id, original_path, subject, in_reply_to, date, author_id,
                content_text, content_html, created_at, indexing_log
         FROM messages WHERE id = ?1",
        [id],
        |row| {
            Ok(MessageRecord {
                id: row.get(0)?,
                message_id: row.get(1)?,
                original_path: row.get(2)?,
                subject: row.get(3)?,
                in_reply_to: row.get(4)?,
                date: row.get(5)?,
                author_id: row.get(6)?,
                content_text: row.get(7)?,
                content_html: row.get(8)?,
                created_at: row.get(9)?,
                indexing_log: row.get(10)?,
            })
        },
    )
    .optional()?
    .ok_or(IndexError::RecordNotFound {
        kind: "message",
        id,
    })
}
