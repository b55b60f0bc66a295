//! Remote object store over the chat service.
//!
//! Uploads post chunk bytes as attachments to the configured channel, gated
//! by a small semaphore and the adaptive throttle so traffic stays inside the
//! service's comfort zone. Downloads go straight to the CDN with their own
//! retry schedule and a User-Agent rotated from a fixed pool before every
//! attempt. Deletes are best effort.

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use discordfs_meta::ChunkRef;

use crate::chat::ChatTransport;
use crate::error::{RemoteError, RemoteResult};
use crate::http::HttpClient;
use crate::obfuscate::{attachment_name, hash_file_name};
use crate::throttle::{AdaptiveThrottle, ThrottleConfig};

/// Message body posted with every chunk: a single paper clip.
const ATTACHMENT_NOTE: &str = "\u{1F4CE}";

/// Browser strings rotated into the CDN User-Agent header.
const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0",
];

/// Tuning knobs for the store. Defaults are the production values; semantics
/// never change, only magnitudes.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Attempt ceiling for uploads and downloads.
    pub max_attempts: u32,
    /// Concurrent upload permits.
    pub upload_permits: usize,
    /// Upload retry step: attempt `n` sleeps `retry_step × n`.
    pub retry_step: Duration,
    /// First download backoff; doubles per failed attempt.
    pub download_backoff: Duration,
    /// Unconditional pause after a rate-limit hit.
    pub rate_limit_pause: Duration,
    /// Lower bound of the pre-download jitter sleep.
    pub download_jitter_min: Duration,
    /// Upper bound of the pre-download jitter sleep.
    pub download_jitter_max: Duration,
    /// Throttle tuning.
    pub throttle: ThrottleConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            upload_permits: 3,
            retry_step: Duration::from_secs(5),
            download_backoff: Duration::from_secs(2),
            rate_limit_pause: Duration::from_secs(60),
            download_jitter_min: Duration::from_millis(200),
            download_jitter_max: Duration::from_millis(800),
            throttle: ThrottleConfig::default(),
        }
    }
}

/// Uploads, downloads and deletes attachments for the engine.
pub struct RemoteStore<T: ChatTransport, H: HttpClient> {
    transport: T,
    http: H,
    config: StoreConfig,
    throttle: AdaptiveThrottle,
    gate: tokio::sync::Semaphore,
    ua_index: AtomicUsize,
    cancel: CancellationToken,
}

impl<T: ChatTransport, H: HttpClient> RemoteStore<T, H> {
    /// Builds a store over a transport and an HTTP client. The starting
    /// User-Agent is picked at random; retries rotate through the pool.
    pub fn new(transport: T, http: H, config: StoreConfig, cancel: CancellationToken) -> Self {
        let throttle = AdaptiveThrottle::new(config.throttle.clone());
        let gate = tokio::sync::Semaphore::new(config.upload_permits);
        let ua_index = AtomicUsize::new(rand::thread_rng().gen_range(0..USER_AGENTS.len()));
        Self {
            transport,
            http,
            config,
            throttle,
            gate,
            ua_index,
            cancel,
        }
    }

    /// The shared throttle, for observability.
    pub fn throttle(&self) -> &AdaptiveThrottle {
        &self.throttle
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn current_user_agent(&self) -> &'static str {
        USER_AGENTS[self.ua_index.load(Ordering::Relaxed) % USER_AGENTS.len()]
    }

    fn rotate_user_agent(&self) -> &'static str {
        let next = self.ua_index.fetch_add(1, Ordering::Relaxed) + 1;
        USER_AGENTS[next % USER_AGENTS.len()]
    }

    /// Uploads one chunk and returns its durable reference.
    ///
    /// Rate limits pause the pipeline and retry without spending an attempt;
    /// any other failure spends one and sleeps a growing fixed step. The
    /// upload gate is held for the whole ladder.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        original_name: &str,
        chunk_index: u32,
        crc32: u32,
    ) -> RemoteResult<ChunkRef> {
        let filename = attachment_name(original_name, chunk_index);
        let size_bytes = bytes.len() as u64;

        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(RemoteError::Cancelled),
            permit = self.gate.acquire() => permit.map_err(|_| RemoteError::Cancelled)?,
        };

        let mut attempts = 0u32;
        loop {
            self.throttle.wait(&self.cancel).await?;

            match self
                .transport
                .send_attachment(bytes.clone(), filename.clone(), ATTACHMENT_NOTE.to_string())
                .await
            {
                Ok(receipt) => {
                    self.throttle.register_success();
                    debug!(
                        name_hash = %hash_file_name(original_name),
                        chunk_index,
                        size_bytes,
                        message_id = receipt.message_id,
                        "uploaded chunk"
                    );
                    return Ok(ChunkRef {
                        chunk_index,
                        message_id: receipt.message_id,
                        attachment_url: receipt.attachment_url,
                        size_bytes,
                        crc32,
                    });
                }
                Err(RemoteError::RateLimited { .. }) | Err(RemoteError::Http { status: 429 }) => {
                    self.throttle.register_error(Some(429));
                    self.throttle
                        .rate_limit_pause(self.config.rate_limit_pause, &self.cancel)
                        .await?;
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.config.max_attempts {
                        warn!(
                            name_hash = %hash_file_name(original_name),
                            chunk_index,
                            attempts,
                            error = %e,
                            "upload attempts exhausted"
                        );
                        return Err(RemoteError::UploadExhausted { attempts });
                    }
                    self.throttle.register_error(None);
                    let backoff = self.config.retry_step * attempts;
                    debug!(
                        chunk_index,
                        attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "upload attempt failed, retrying"
                    );
                    self.sleep_cancellable(backoff).await?;
                }
            }
        }
    }

    /// Downloads raw chunk bytes from the CDN.
    ///
    /// Exponential backoff starting at the configured base, doubling per
    /// failed attempt. Before every attempt the User-Agent rotates and a
    /// short jitter sleep spaces the hit. A 429 pauses for the rate-limit
    /// interval without spending an attempt or advancing the backoff.
    pub async fn download(&self, url: &str) -> RemoteResult<Vec<u8>> {
        let mut attempts = 0u32;
        let mut backoff = self.config.download_backoff;
        let mut first_attempt = true;

        loop {
            // The startup User-Agent serves the first hit; retries rotate.
            let ua = if first_attempt {
                self.current_user_agent()
            } else {
                self.rotate_user_agent()
            };
            first_attempt = false;
            let jitter = rand::thread_rng().gen_range(
                self.config.download_jitter_min.as_millis() as u64
                    ..=self.config.download_jitter_max.as_millis() as u64,
            );
            self.sleep_cancellable(Duration::from_millis(jitter)).await?;

            let failure = match self.http.get(url, ua).await {
                Ok(response) if (200..300).contains(&response.status) => {
                    debug!(bytes = response.body.len(), "downloaded chunk");
                    return Ok(response.body);
                }
                Ok(response) if response.status == 429 => {
                    warn!("CDN rate limit, pausing download");
                    self.sleep_cancellable(self.config.rate_limit_pause).await?;
                    continue;
                }
                Ok(response) => RemoteError::Http {
                    status: response.status,
                },
                Err(e) => e,
            };

            attempts += 1;
            if attempts >= self.config.max_attempts {
                warn!(attempts, error = %failure, "download attempts exhausted");
                return Err(RemoteError::DownloadExhausted { attempts });
            }
            debug!(
                attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %failure,
                "download attempt failed, retrying"
            );
            self.sleep_cancellable(backoff).await?;
            backoff *= 2;
        }
    }

    /// Best-effort delete of one attachment message. Failures are logged and
    /// swallowed.
    pub async fn delete(&self, message_id: u64) {
        if self.throttle.wait(&self.cancel).await.is_err() {
            return;
        }
        match self.transport.delete_message(message_id).await {
            Ok(()) => debug!(message_id, "deleted attachment message"),
            Err(e) => warn!(message_id, error = %e, "failed to delete attachment message"),
        }
    }

    /// Sequentially deletes a batch of attachment messages, best effort.
    pub async fn delete_many(&self, message_ids: &[u64]) {
        for &id in message_ids {
            self.delete(id).await;
        }
    }

    async fn sleep_cancellable(&self, duration: Duration) -> RemoteResult<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(RemoteError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MockChatTransport;
    use crate::http::MockHttpClient;

    fn fast_config() -> StoreConfig {
        StoreConfig {
            max_attempts: 5,
            upload_permits: 3,
            retry_step: Duration::from_millis(1),
            download_backoff: Duration::from_millis(1),
            rate_limit_pause: Duration::from_millis(2),
            download_jitter_min: Duration::from_millis(0),
            download_jitter_max: Duration::from_millis(1),
            throttle: ThrottleConfig {
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                backoff_multiplier: 1.5,
            },
        }
    }

    fn test_store() -> RemoteStore<MockChatTransport, MockHttpClient> {
        let chat = MockChatTransport::new();
        let http = MockHttpClient::new(chat.body_map());
        RemoteStore::new(chat, http, fast_config(), CancellationToken::new())
    }

    #[tokio::test]
    async fn upload_returns_complete_chunk_ref() {
        let store = test_store();
        let bytes = vec![7u8; 1024];
        let crc = 0xABCD_1234;

        let chunk_ref = store.upload(bytes, "docs/a.txt", 2, crc).await.unwrap();

        assert_eq!(chunk_ref.chunk_index, 2);
        assert_eq!(chunk_ref.size_bytes, 1024);
        assert_eq!(chunk_ref.crc32, crc);
        assert!(chunk_ref.attachment_url.contains(&chunk_ref.message_id.to_string()));
        assert_eq!(store.transport().stats().sends, 1);
    }

    #[tokio::test]
    async fn uploaded_filename_is_obfuscated() {
        let store = test_store();
        let chunk_ref = store.upload(vec![1], "payroll.xlsx", 0, 0).await.unwrap();

        let filename = store
            .transport()
            .filename_of(chunk_ref.message_id)
            .unwrap();
        assert!(!filename.contains("payroll"));
        assert!(filename.len() > 16);
    }

    #[tokio::test]
    async fn rate_limit_storm_recovers_and_stays_cautious() {
        let store = test_store();
        for _ in 0..3 {
            store.transport().push_failure(RemoteError::RateLimited {
                retry_after_secs: None,
            });
        }

        let chunk_ref = store.upload(vec![5u8; 16], "a.bin", 0, 7).await.unwrap();
        assert_eq!(chunk_ref.size_bytes, 16);
        assert_eq!(store.transport().stats().failures_served, 3);
        assert!(store.throttle().current_multiplier() >= 3.0);
    }

    #[tokio::test]
    async fn http_429_is_treated_as_rate_limit() {
        let store = test_store();
        store
            .transport()
            .push_failure(RemoteError::Http { status: 429 });

        store.upload(vec![1], "a.bin", 0, 0).await.unwrap();
        // 429 tripled the multiplier; the pause halved it, success decayed it.
        assert!(store.throttle().current_multiplier() > 1.0);
    }

    #[tokio::test]
    async fn transient_errors_consume_attempts_then_succeed() {
        let store = test_store();
        store
            .transport()
            .push_failure(RemoteError::Transport("socket closed".into()));
        store
            .transport()
            .push_failure(RemoteError::Transport("socket closed".into()));

        store.upload(vec![1], "a.bin", 0, 0).await.unwrap();
        assert_eq!(store.transport().stats().sends, 1);
        assert_eq!(store.transport().stats().failures_served, 2);
    }

    #[tokio::test]
    async fn upload_exhausts_after_max_attempts() {
        let store = test_store();
        for _ in 0..5 {
            store
                .transport()
                .push_failure(RemoteError::Transport("down".into()));
        }

        let err = store.upload(vec![1], "a.bin", 0, 0).await.unwrap_err();
        assert!(matches!(err, RemoteError::UploadExhausted { attempts: 5 }));
    }

    #[tokio::test]
    async fn cancelled_upload_aborts() {
        let chat = MockChatTransport::new();
        let http = MockHttpClient::new(chat.body_map());
        let cancel = CancellationToken::new();
        let store = RemoteStore::new(chat, http, fast_config(), cancel.clone());

        cancel.cancel();
        let err = store.upload(vec![1], "a.bin", 0, 0).await.unwrap_err();
        assert!(matches!(err, RemoteError::Cancelled));
    }

    #[tokio::test]
    async fn download_roundtrips_uploaded_bytes() {
        let store = test_store();
        let bytes = vec![0xEE; 512];
        let chunk_ref = store.upload(bytes.clone(), "a.bin", 0, 1).await.unwrap();

        let fetched = store.download(&chunk_ref.attachment_url).await.unwrap();
        assert_eq!(fetched, bytes);
    }

    #[tokio::test]
    async fn download_of_missing_url_exhausts() {
        let store = test_store();
        let err = store
            .download("https://cdn.example.invalid/attachments/0/ghost.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::DownloadExhausted { attempts: 5 }));
    }

    #[tokio::test]
    async fn download_429_does_not_spend_attempts() {
        let chat = MockChatTransport::new();
        let http = MockHttpClient::new(chat.body_map());
        let store = RemoteStore::new(chat, http, fast_config(), CancellationToken::new());

        let chunk_ref = store.upload(vec![3u8; 8], "a.bin", 0, 0).await.unwrap();
        for _ in 0..6 {
            // More scripted 429s than the attempt ceiling; all must be absorbed.
            store.http.push_status(429);
        }

        let fetched = store.download(&chunk_ref.attachment_url).await.unwrap();
        assert_eq!(fetched, vec![3u8; 8]);
    }

    #[tokio::test]
    async fn delete_many_swallows_failures() {
        let store = test_store();
        let chunk_ref = store.upload(vec![1], "a.bin", 0, 0).await.unwrap();

        // One real id, one bogus; neither may panic or error.
        store.delete_many(&[chunk_ref.message_id, 424242]).await;
        assert_eq!(store.transport().message_count(), 0);
    }

    #[tokio::test]
    async fn user_agent_rotates_through_pool() {
        let store = test_store();
        let first = store.current_user_agent();
        let mut saw_different = false;
        for _ in 0..USER_AGENTS.len() {
            if store.rotate_user_agent() != first {
                saw_different = true;
            }
        }
        assert!(saw_different);
    }
}
