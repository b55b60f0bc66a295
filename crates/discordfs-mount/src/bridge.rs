//! Types of the kernel bridge callback contract.
//!
//! The user-mode bridge itself lives outside this crate; these are the values
//! that cross the seam.

use chrono::{DateTime, Utc};
use discordfs_meta::FileRecord;
use serde::{Deserialize, Serialize};

/// Reported volume capacity: 1 TiB.
pub const VOLUME_TOTAL_BYTES: u64 = 1024 * 1024 * 1024 * 1024;
/// Reported free space: 999 GiB.
pub const VOLUME_FREE_BYTES: u64 = 999 * 1024 * 1024 * 1024;
/// Reported filesystem name.
pub const VOLUME_FS_NAME: &str = "NTFS";

/// How the caller wants a path opened or created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create; fail if the path exists.
    CreateNew,
    /// Create or overwrite.
    Create,
    /// Overwrite; fail if the path does not exist.
    Truncate,
    /// Open existing; fail if the path does not exist.
    Open,
    /// Open existing or create.
    OpenOrCreate,
    /// Open for appending, preloading the current body.
    Append,
}

/// What `open` reports back to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOutcome {
    /// Whether the opened path is a directory.
    pub is_directory: bool,
}

/// Directory-entry view of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Entry name (final path segment).
    pub file_name: String,
    /// Plaintext size in bytes.
    pub size_bytes: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
    /// Whether the entry is a directory.
    pub is_directory: bool,
}

impl From<&FileRecord> for FileInfo {
    fn from(record: &FileRecord) -> Self {
        Self {
            file_name: record.file_name.clone(),
            size_bytes: record.size_bytes,
            created_at: record.created_at,
            modified_at: record.modified_at,
            is_directory: record.is_directory,
        }
    }
}

/// Volume identity and feature flags reported to the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Total capacity in bytes.
    pub total_bytes: u64,
    /// Free capacity in bytes.
    pub free_bytes: u64,
    /// Filesystem name string.
    pub filesystem_name: String,
    /// Names keep the case they were created with.
    pub case_preserving: bool,
    /// Name comparison is case-sensitive.
    pub case_sensitive: bool,
    /// Names are Unicode.
    pub unicode: bool,
}

impl Default for VolumeInfo {
    fn default() -> Self {
        Self {
            total_bytes: VOLUME_TOTAL_BYTES,
            free_bytes: VOLUME_FREE_BYTES,
            filesystem_name: VOLUME_FS_NAME.to_string(),
            case_preserving: true,
            case_sensitive: true,
            unicode: true,
        }
    }
}
