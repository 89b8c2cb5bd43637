//! Document store backed by SQLite
//!
//! Holds the owner-scoped documents the CLI indexes and doubles as the
//! lexical matcher (case-insensitive substring search on title and content).

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use super::document::{Document, DocumentId, DocumentStore, LexicalMatcher, OwnerId};
use crate::error::{IndexError, Result};

pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Open or create database at path
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                content TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a document and return its new id
    pub fn insert(&self, owner: OwnerId, title: &str, content: Option<&str>) -> Result<DocumentId> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO documents (owner_id, title, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![owner, title, content, chrono::Utc::now().timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Delete a document, returning whether it existed
    pub fn delete(&self, owner: OwnerId, id: DocumentId) -> Result<bool> {
        let removed = self.conn.lock().execute(
            "DELETE FROM documents WHERE id = ?1 AND owner_id = ?2",
            params![id, owner],
        )?;
        Ok(removed > 0)
    }

    /// All documents of an owner, including ones without content
    pub fn list(&self, owner: OwnerId) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, title, content FROM documents WHERE owner_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![owner], row_to_document)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(IndexError::from)
    }
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
    })
}

/// Escape LIKE wildcards so the query is matched literally
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl DocumentStore for SqliteDocumentStore {
    fn indexable_documents(&self, owner: OwnerId) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, owner_id, title, content FROM documents
            WHERE owner_id = ?1 AND content IS NOT NULL AND content != ''
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![owner], row_to_document)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(IndexError::from)
    }

    fn document(&self, owner: OwnerId, id: DocumentId) -> Result<Option<Document>> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, owner_id, title, content FROM documents WHERE id = ?1 AND owner_id = ?2",
                params![id, owner],
                row_to_document,
            )
            .optional()
            .map_err(|e| e.into())
    }
}

impl LexicalMatcher for SqliteDocumentStore {
    fn matching_ids(&self, owner: OwnerId, query: &str, limit: usize) -> Result<Vec<DocumentId>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        // SQLite's LIKE is case-insensitive for ASCII only; fold both sides.
        let pattern = like_pattern(&query.to_lowercase());
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id FROM documents
            WHERE owner_id = ?1
              AND (lower(title) LIKE ?2 ESCAPE '\' OR lower(coalesce(content, '')) LIKE ?2 ESCAPE '\')
            ORDER BY id
            LIMIT ?3
            "#,
        )?;
        let rows = stmt.query_map(params![owner, pattern, limit as i64], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(IndexError::from)
    }
}
