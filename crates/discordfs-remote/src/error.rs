//! Error types for the remote object store.

use thiserror::Error;

/// Result type alias for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Error variants for uploads, downloads and deletes.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The chat service reported a rate limit. Handled internally; callers
    /// outside the store never see this.
    #[error("rate limited by the chat service (retry after {retry_after_secs:?}s)")]
    RateLimited {
        /// Server-suggested wait, when one was supplied.
        retry_after_secs: Option<f64>,
    },

    /// Non-success HTTP status from the CDN.
    #[error("HTTP status {status}")]
    Http {
        /// The response status code.
        status: u16,
    },

    /// Transport/SDK failure talking to the chat service.
    #[error("chat transport error: {0}")]
    Transport(String),

    /// HTTP client failure (connect, timeout, body read).
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Operation attempted before the chat client finished connecting.
    #[error("chat client is not connected")]
    NotConnected,

    /// All upload attempts were spent.
    #[error("upload failed after {attempts} attempts")]
    UploadExhausted {
        /// How many attempts were made.
        attempts: u32,
    },

    /// All download attempts were spent.
    #[error("download failed after {attempts} attempts")]
    DownloadExhausted {
        /// How many attempts were made.
        attempts: u32,
    },

    /// The operation was aborted by the caller's cancellation signal.
    #[error("operation cancelled")]
    Cancelled,
}
