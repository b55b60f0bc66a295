#![warn(missing_docs)]

//! DiscordFS filesystem adapter.
//!
//! Bridges kernel file-op callbacks to the storage engine: buffered writes,
//! cached reads, detached close-time uploads, and the session lifecycle that
//! wires configuration, key material, index, store and cache together.

/// Callback-surface types (open modes, file info, volume identity).
pub mod bridge;
/// Process configuration loading and validation.
pub mod config;
/// Error types and kernel status mapping.
pub mod error;
/// The filesystem adapter.
pub mod filesystem;
/// Search-pattern matching for listings.
pub mod pattern;
/// Session wiring and teardown.
pub mod session;
/// Tracked detached work.
pub mod tasks;
/// Per-path write buffers.
pub mod writebuf;

pub use bridge::{FileInfo, OpenMode, OpenOutcome, VolumeInfo};
pub use config::FsConfig;
pub use error::{MountError, MountResult};
pub use filesystem::DiscordFs;
pub use session::FsSession;
