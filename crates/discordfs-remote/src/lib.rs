#![warn(missing_docs)]

//! DiscordFS remote object store.
//!
//! Moves chunk bytes to and from the chat service: obfuscated attachment
//! uploads gated by an adaptive throttle, direct CDN downloads with their own
//! retry schedule, and best-effort deletes.

/// Chat-service transport contract and in-memory mock.
pub mod chat;
/// Error types and result handling.
pub mod error;
/// CDN download seam (reqwest-backed and mock clients).
pub mod http;
/// Attachment filename synthesis.
pub mod obfuscate;
/// Upload/download/delete pipeline.
pub mod store;
/// Adaptive delay oracle.
pub mod throttle;

pub use chat::{AttachmentReceipt, ChatTransport, MockChatTransport};
pub use error::{RemoteError, RemoteResult};
pub use http::{HttpClient, MockHttpClient, ReqwestClient};
pub use store::{RemoteStore, StoreConfig};
pub use throttle::{AdaptiveThrottle, ThrottleConfig};
