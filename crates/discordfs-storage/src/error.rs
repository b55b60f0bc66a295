//! Error types for the storage engine.

use thiserror::Error;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error variants for encryption, chunking and key handling.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Wraps standard I/O errors (key file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cipher construction failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// The blob is not a valid encryption frame: too short, or the
    /// authentication tag does not verify.
    #[error("corrupted ciphertext: {reason}")]
    Corrupted {
        /// What failed during decryption.
        reason: String,
    },

    /// A chunk's bytes did not match its recorded checksum during reassembly.
    #[error("integrity failure on chunk {chunk_index}: expected crc 0x{expected:08X}, computed 0x{actual:08X}")]
    IntegrityFailure {
        /// Index of the offending chunk.
        chunk_index: u32,
        /// The checksum recorded at upload time.
        expected: u32,
        /// The checksum computed over the downloaded bytes.
        actual: u32,
    },

    /// A chunk could not be fetched from the remote store.
    #[error("chunk fetch failed: {0}")]
    Fetch(String),

    /// The master-key file or configured key string is not usable.
    #[error("invalid master key: {reason}")]
    InvalidKey {
        /// Why the key material was rejected.
        reason: String,
    },
}
