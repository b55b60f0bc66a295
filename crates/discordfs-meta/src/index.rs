//! SQLite-backed metadata index.
//!
//! Single-writer embedded store mapping virtual paths to file records and
//! their ordered chunk references. Every mutation runs inside a transaction
//! and the connection sits behind one process-wide mutex; the expected
//! operation rate is low enough that finer locking buys nothing.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;

use crate::error::{MetaError, MetaResult};
use crate::types::{file_name, ChunkRef, FileRecord, SEPARATOR};

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS files (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    virtual_path  TEXT NOT NULL UNIQUE,
    file_name     TEXT NOT NULL,
    size_bytes    INTEGER NOT NULL,
    created_at    TEXT NOT NULL,
    modified_at   TEXT NOT NULL,
    is_directory  INTEGER NOT NULL DEFAULT 0
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_files_virtual_path ON files(virtual_path);

CREATE TABLE IF NOT EXISTS chunks (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id         INTEGER NOT NULL,
    chunk_index     INTEGER NOT NULL,
    message_id      INTEGER NOT NULL,
    attachment_url  TEXT NOT NULL,
    size_bytes      INTEGER NOT NULL,
    crc32           INTEGER NOT NULL,
    FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_chunks_file_id ON chunks(file_id);
";

/// Durable map from virtual path to [`FileRecord`].
pub struct MetadataIndex {
    conn: Mutex<Connection>,
}

impl MetadataIndex {
    /// Opens (or creates) the index database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> MetaResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory index (tests and dry runs).
    pub fn in_memory() -> MetaResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Upserts a record and replaces its chunk list in one transaction.
    ///
    /// An existing row keyed by the same virtual path keeps its id and
    /// `created_at`; name, size, directory flag and `modified_at` are taken
    /// from `record`. Returns the row id.
    pub fn save(&self, record: &FileRecord) -> MetaResult<i64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM files WHERE virtual_path = ?1",
                params![record.virtual_path],
                |row| row.get(0),
            )
            .optional()?;

        let file_id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE files SET file_name = ?1, size_bytes = ?2, modified_at = ?3,
                            is_directory = ?4
                     WHERE id = ?5",
                    params![
                        record.file_name,
                        record.size_bytes as i64,
                        record.modified_at.to_rfc3339(),
                        record.is_directory as i64,
                        id
                    ],
                )?;
                tx.execute("DELETE FROM chunks WHERE file_id = ?1", params![id])?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO files (virtual_path, file_name, size_bytes, created_at,
                                        modified_at, is_directory)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        record.virtual_path,
                        record.file_name,
                        record.size_bytes as i64,
                        record.created_at.to_rfc3339(),
                        record.modified_at.to_rfc3339(),
                        record.is_directory as i64
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        for chunk in &record.chunks {
            tx.execute(
                "INSERT INTO chunks (file_id, chunk_index, message_id, attachment_url,
                                     size_bytes, crc32)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    file_id,
                    chunk.chunk_index as i64,
                    chunk.message_id as i64,
                    chunk.attachment_url,
                    chunk.size_bytes as i64,
                    chunk.crc32 as i64
                ],
            )?;
        }

        tx.commit()?;
        debug!(
            file_id,
            chunks = record.chunks.len(),
            size = record.size_bytes,
            "saved file record"
        );
        Ok(file_id)
    }

    /// Fetches a record with its chunks in ascending `chunk_index` order.
    pub fn get(&self, virtual_path: &str) -> MetaResult<Option<FileRecord>> {
        let conn = self.conn.lock();

        let record = conn
            .query_row(
                "SELECT id, virtual_path, file_name, size_bytes, created_at, modified_at,
                        is_directory
                 FROM files WHERE virtual_path = ?1",
                params![virtual_path],
                row_to_record,
            )
            .optional()?;

        let mut record = match record {
            Some(r) => r?,
            None => return Ok(None),
        };

        let mut stmt = conn.prepare(
            "SELECT chunk_index, message_id, attachment_url, size_bytes, crc32
             FROM chunks WHERE file_id = ?1 ORDER BY chunk_index ASC",
        )?;
        let chunks = stmt
            .query_map(params![record.id], |row| {
                Ok(ChunkRef {
                    chunk_index: row.get::<_, i64>(0)? as u32,
                    message_id: row.get::<_, i64>(1)? as u64,
                    attachment_url: row.get(2)?,
                    size_bytes: row.get::<_, i64>(3)? as u64,
                    crc32: row.get::<_, i64>(4)? as u32,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        record.chunks = chunks;
        Ok(Some(record))
    }

    /// Removes a record; its chunks go with it (cascade).
    ///
    /// Returns `true` if a row was actually deleted.
    pub fn delete(&self, virtual_path: &str) -> MetaResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let affected = tx.execute(
            "DELETE FROM files WHERE virtual_path = ?1",
            params![virtual_path],
        )?;
        tx.commit()?;
        debug!(affected, "deleted file record");
        Ok(affected > 0)
    }

    /// Returns `true` if a record exists for the path.
    pub fn exists(&self, virtual_path: &str) -> MetaResult<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM files WHERE virtual_path = ?1",
            params![virtual_path],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Lists the immediate children of a directory path.
    ///
    /// A child is any record whose path is `dir/<x>` with `<x>` containing no
    /// separator; the empty path lists top-level entries. Chunk lists are not
    /// materialized for listings.
    pub fn list(&self, dir_path: &str) -> MetaResult<Vec<FileRecord>> {
        let conn = self.conn.lock();

        let (direct, nested) = if dir_path.is_empty() {
            ("%".to_string(), format!("%{SEPARATOR}%"))
        } else {
            let prefix = escape_like(dir_path);
            (
                format!("{prefix}{SEPARATOR}%"),
                format!("{prefix}{SEPARATOR}%{SEPARATOR}%"),
            )
        };

        let mut stmt = conn.prepare(
            "SELECT id, virtual_path, file_name, size_bytes, created_at, modified_at,
                    is_directory
             FROM files
             WHERE virtual_path LIKE ?1 ESCAPE '\\'
               AND virtual_path NOT LIKE ?2 ESCAPE '\\'
             ORDER BY virtual_path ASC",
        )?;

        let rows = stmt
            .query_map(params![direct, nested], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().collect()
    }

    /// Renames a single record in place, refreshing `modified_at`.
    ///
    /// Descendant paths are not rewritten, so renaming a non-empty directory
    /// would orphan its children; callers must reject that case first.
    pub fn rename(&self, old_path: &str, new_path: &str) -> MetaResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let affected = tx.execute(
            "UPDATE files SET virtual_path = ?1, file_name = ?2, modified_at = ?3
             WHERE virtual_path = ?4",
            params![
                new_path,
                file_name(new_path),
                Utc::now().to_rfc3339(),
                old_path
            ],
        )?;
        if affected == 0 {
            return Err(MetaError::NotFound {
                path: old_path.to_string(),
            });
        }
        tx.commit()?;
        debug!("renamed file record");
        Ok(())
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MetaResult<FileRecord>> {
    let virtual_path: String = row.get(1)?;
    let created_at: String = row.get(4)?;
    let modified_at: String = row.get(5)?;
    Ok(build_record(
        row.get(0)?,
        virtual_path,
        row.get(2)?,
        row.get::<_, i64>(3)?,
        created_at,
        modified_at,
        row.get::<_, i64>(6)? != 0,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_record(
    id: i64,
    virtual_path: String,
    file_name: String,
    size_bytes: i64,
    created_at: String,
    modified_at: String,
    is_directory: bool,
) -> MetaResult<FileRecord> {
    let parse = |field: &str, value: &str| -> MetaResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| MetaError::CorruptRow {
                path: virtual_path.clone(),
                reason: format!("bad {field} timestamp: {e}"),
            })
    };
    let created_at = parse("created_at", &created_at)?;
    let modified_at = parse("modified_at", &modified_at)?;
    Ok(FileRecord {
        id: Some(id),
        file_name,
        size_bytes: size_bytes as u64,
        created_at,
        modified_at,
        is_directory,
        chunks: Vec::new(),
        virtual_path,
    })
}

/// Escapes SQL LIKE wildcards so stored paths match literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
