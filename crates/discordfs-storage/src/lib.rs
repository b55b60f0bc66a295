#![warn(missing_docs)]

//! DiscordFS storage engine: encryption, chunking and content caching.
//!
//! The write path runs whole buffers through [`crypto::FileCipher`] and
//! [`chunker::prepare`]; the read path reverses it with
//! [`chunker::reassemble_from_refs`]. Reassembled bodies live in the
//! [`cache::ContentCache`] until evicted.

/// Bounded LRU cache of reassembled plaintext bodies.
pub mod cache;
/// Deterministic chunking and integrity-checked reassembly.
pub mod chunker;
/// AES-256-GCM whole-buffer encryption with per-file HKDF subkeys.
pub mod crypto;
/// Error types and result handling.
pub mod error;
/// Master-key file persistence.
pub mod keyfile;

pub use cache::ContentCache;
pub use chunker::{chunk_count, fragment, prepare, reassemble_from_refs, Chunk, CHUNK_MAX};
pub use crypto::{FileCipher, MasterKey, ENCRYPTION_OVERHEAD};
pub use error::{StorageError, StorageResult};
