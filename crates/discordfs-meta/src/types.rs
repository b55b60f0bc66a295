//! Core record types and virtual-path helpers.
//!
//! A virtual path is a `/`-separated, case-preserving string with no leading
//! separator; the empty string names the root directory. Paths are compared
//! byte-for-byte (case-sensitive) and used as the primary key of the index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical path separator inside the index.
pub const SEPARATOR: char = '/';

/// Normalizes a path coming from the kernel bridge: backslashes become the
/// canonical separator, and leading/trailing separators are stripped.
pub fn normalize_path(raw: &str) -> String {
    raw.replace('\\', "/")
        .trim_matches('/')
        .to_string()
}

/// Returns the final segment of a normalized path, or `""` for the root.
pub fn file_name(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or(path)
}

/// Returns the parent of a normalized path, or `""` when the path is a
/// top-level entry or the root itself.
pub fn parent(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Durable handle to one uploaded chunk of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Position of this chunk within the file, starting at 0.
    pub chunk_index: u32,
    /// Message id assigned by the chat service.
    pub message_id: u64,
    /// Attachment retrieval URL.
    pub attachment_url: String,
    /// Transmitted (ciphertext) byte count.
    pub size_bytes: u64,
    /// CRC-32 (ISO/HDLC) of the transmitted bytes.
    pub crc32: u32,
}

/// One entry in the index: a file or a directory, keyed by virtual path.
///
/// A directory record has no chunks and `size_bytes == 0`. A regular file's
/// chunks carry contiguous indices from 0 and their sizes sum to the stored
/// ciphertext length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Row id, populated once the record has been persisted.
    pub id: Option<i64>,
    /// Primary key: the normalized virtual path.
    pub virtual_path: String,
    /// Final path segment, denormalized for listings.
    pub file_name: String,
    /// Plaintext length as observed by the OS.
    pub size_bytes: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
    /// Whether this record is a directory.
    pub is_directory: bool,
    /// Ordered chunk references (ascending `chunk_index`).
    pub chunks: Vec<ChunkRef>,
}

impl FileRecord {
    /// Builds a fresh file record with both timestamps set to now.
    pub fn new_file(virtual_path: impl Into<String>, size_bytes: u64, chunks: Vec<ChunkRef>) -> Self {
        let virtual_path = virtual_path.into();
        let now = Utc::now();
        Self {
            id: None,
            file_name: file_name(&virtual_path).to_string(),
            virtual_path,
            size_bytes,
            created_at: now,
            modified_at: now,
            is_directory: false,
            chunks,
        }
    }

    /// Builds a fresh directory record.
    pub fn new_directory(virtual_path: impl Into<String>) -> Self {
        let virtual_path = virtual_path.into();
        let now = Utc::now();
        Self {
            id: None,
            file_name: file_name(&virtual_path).to_string(),
            virtual_path,
            size_bytes: 0,
            created_at: now,
            modified_at: now,
            is_directory: true,
            chunks: Vec::new(),
        }
    }

    /// Total transmitted bytes across all chunks.
    pub fn stored_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.size_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_leading_separator() {
        assert_eq!(normalize_path("/docs/a.txt"), "docs/a.txt");
        assert_eq!(normalize_path("\\docs\\a.txt"), "docs/a.txt");
        assert_eq!(normalize_path("docs/a.txt"), "docs/a.txt");
    }

    #[test]
    fn normalize_empty_is_root() {
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path("\\"), "");
    }

    #[test]
    fn file_name_takes_last_segment() {
        assert_eq!(file_name("docs/a.txt"), "a.txt");
        assert_eq!(file_name("a.txt"), "a.txt");
        assert_eq!(file_name(""), "");
    }

    #[test]
    fn parent_of_nested_and_top_level() {
        assert_eq!(parent("docs/sub/a.txt"), "docs/sub");
        assert_eq!(parent("a.txt"), "");
        assert_eq!(parent(""), "");
    }

    #[test]
    fn new_file_populates_name_and_times() {
        let rec = FileRecord::new_file("docs/a.txt", 12, Vec::new());
        assert_eq!(rec.file_name, "a.txt");
        assert_eq!(rec.size_bytes, 12);
        assert!(!rec.is_directory);
        assert_eq!(rec.created_at, rec.modified_at);
    }

    #[test]
    fn new_directory_has_no_chunks() {
        let rec = FileRecord::new_directory("docs");
        assert!(rec.is_directory);
        assert_eq!(rec.size_bytes, 0);
        assert!(rec.chunks.is_empty());
    }

    #[test]
    fn stored_bytes_sums_chunks() {
        let rec = FileRecord::new_file(
            "a.bin",
            100,
            vec![
                ChunkRef {
                    chunk_index: 0,
                    message_id: 1,
                    attachment_url: "u0".into(),
                    size_bytes: 64,
                    crc32: 0,
                },
                ChunkRef {
                    chunk_index: 1,
                    message_id: 2,
                    attachment_url: "u1".into(),
                    size_bytes: 64,
                    crc32: 0,
                },
            ],
        );
        assert_eq!(rec.stored_bytes(), 128);
    }
}
