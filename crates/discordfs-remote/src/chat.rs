//! Chat-service transport contract.
//!
//! The real SDK binding lives outside this crate; the store only needs the
//! verbs below. An in-memory mock with operation stats ships here so the
//! upload/download pipeline can be exercised end to end without a network.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};

/// How long a connecting client may take to become ready.
pub const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Boxed future type for trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the chat service hands back for a posted attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentReceipt {
    /// Message id assigned by the service.
    pub message_id: u64,
    /// CDN URL of the attachment.
    pub attachment_url: String,
}

/// The verbs the engine requires from the chat service.
///
/// Implementations must surface the service's typed rate-limit signal as
/// [`RemoteError::RateLimited`] so the store can distinguish it from generic
/// transport failures, and must fail with [`RemoteError::NotConnected`] when
/// used before the connection is ready.
pub trait ChatTransport: Send + Sync {
    /// Posts `data` as an attachment named `filename` with `note` as the
    /// message body.
    fn send_attachment(
        &self,
        data: Vec<u8>,
        filename: String,
        note: String,
    ) -> BoxFuture<'_, RemoteResult<AttachmentReceipt>>;

    /// Deletes the message carrying an attachment.
    fn delete_message(&self, message_id: u64) -> BoxFuture<'_, RemoteResult<()>>;
}

/// Counters kept by [`MockChatTransport`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockChatStats {
    /// Successful attachment posts.
    pub sends: u64,
    /// Delete calls observed.
    pub deletes: u64,
    /// Scripted failures served.
    pub failures_served: u64,
    /// Total attachment bytes accepted.
    pub bytes_accepted: u64,
}

struct MockMessage {
    filename: String,
    url: String,
}

/// In-memory chat service for tests and dry runs.
///
/// Attachments land in a URL-keyed body map that the paired
/// [`crate::http::MockHttpClient`] reads, so a store wired to both behaves
/// like the real write/read pipeline.
pub struct MockChatTransport {
    messages: Mutex<HashMap<u64, MockMessage>>,
    bodies: std::sync::Arc<Mutex<HashMap<String, Vec<u8>>>>,
    next_id: Mutex<u64>,
    fail_queue: Mutex<VecDeque<RemoteError>>,
    stats: Mutex<MockChatStats>,
}

impl MockChatTransport {
    /// Creates an empty mock service.
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(HashMap::new()),
            bodies: std::sync::Arc::new(Mutex::new(HashMap::new())),
            next_id: Mutex::new(1_000_000),
            fail_queue: Mutex::new(VecDeque::new()),
            stats: Mutex::new(MockChatStats::default()),
        }
    }

    /// Queues an error to be served before the next successful send.
    pub fn push_failure(&self, error: RemoteError) {
        self.fail_queue.lock().push_back(error);
    }

    /// Shared URL-keyed body map for the paired HTTP mock.
    pub fn body_map(&self) -> std::sync::Arc<Mutex<HashMap<String, Vec<u8>>>> {
        std::sync::Arc::clone(&self.bodies)
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> MockChatStats {
        self.stats.lock().clone()
    }

    /// Number of messages currently held.
    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }

    /// Filename of a stored message, if present.
    pub fn filename_of(&self, message_id: u64) -> Option<String> {
        self.messages
            .lock()
            .get(&message_id)
            .map(|m| m.filename.clone())
    }

    /// Corrupts one byte of a stored attachment body (tamper tests).
    pub fn corrupt_body(&self, url: &str, offset: usize) {
        if let Some(body) = self.bodies.lock().get_mut(url) {
            body[offset] ^= 0xFF;
        }
    }
}

impl Default for MockChatTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatTransport for MockChatTransport {
    fn send_attachment(
        &self,
        data: Vec<u8>,
        filename: String,
        _note: String,
    ) -> BoxFuture<'_, RemoteResult<AttachmentReceipt>> {
        let result = (|| {
            if let Some(err) = self.fail_queue.lock().pop_front() {
                self.stats.lock().failures_served += 1;
                return Err(err);
            }

            let mut next_id = self.next_id.lock();
            let message_id = *next_id;
            *next_id += 1;
            drop(next_id);

            let url = format!("https://cdn.example.invalid/attachments/{message_id}/{filename}");

            let mut stats = self.stats.lock();
            stats.sends += 1;
            stats.bytes_accepted += data.len() as u64;
            drop(stats);

            self.bodies.lock().insert(url.clone(), data);
            self.messages.lock().insert(
                message_id,
                MockMessage {
                    filename,
                    url: url.clone(),
                },
            );

            Ok(AttachmentReceipt {
                message_id,
                attachment_url: url,
            })
        })();

        Box::pin(async move {
            debug!("mock send_attachment");
            result
        })
    }

    fn delete_message(&self, message_id: u64) -> BoxFuture<'_, RemoteResult<()>> {
        let removed = self.messages.lock().remove(&message_id);
        if let Some(message) = &removed {
            self.bodies.lock().remove(&message.url);
        }
        self.stats.lock().deletes += 1;

        Box::pin(async move {
            debug!(message_id, "mock delete_message");
            match removed {
                Some(_) => Ok(()),
                None => Err(RemoteError::Transport(format!(
                    "unknown message {message_id}"
                ))),
            }
        })
    }
}
