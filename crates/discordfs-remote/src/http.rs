//! CDN download seam.
//!
//! Attachment bodies come straight from the CDN over plain HTTP GET, not
//! through the chat SDK. The trait exists so the retry schedule in the store
//! can be tested against an in-memory client.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::chat::BoxFuture;
use crate::error::RemoteResult;

/// Minimal response view the store needs.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

/// Plain GET with a caller-chosen User-Agent.
pub trait HttpClient: Send + Sync {
    /// Fetches `url`, sending `user_agent` as the UA header.
    fn get(&self, url: &str, user_agent: &str) -> BoxFuture<'_, RemoteResult<HttpResponse>>;
}

/// Production client backed by `reqwest`.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Builds the client with the given request timeout.
    pub fn new(timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, user_agent: &str) -> BoxFuture<'_, RemoteResult<HttpResponse>> {
        let request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent);
        Box::pin(async move {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?.to_vec();
            Ok(HttpResponse { status, body })
        })
    }
}

/// In-memory client reading the body map shared with
/// [`crate::chat::MockChatTransport`].
pub struct MockHttpClient {
    bodies: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    status_queue: Mutex<VecDeque<u16>>,
}

impl MockHttpClient {
    /// Creates a client over a shared body map.
    pub fn new(bodies: Arc<Mutex<HashMap<String, Vec<u8>>>>) -> Self {
        Self {
            bodies,
            status_queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues a status code to be served instead of the next real lookup.
    pub fn push_status(&self, status: u16) {
        self.status_queue.lock().push_back(status);
    }
}

impl HttpClient for MockHttpClient {
    fn get(&self, url: &str, _user_agent: &str) -> BoxFuture<'_, RemoteResult<HttpResponse>> {
        let scripted = self.status_queue.lock().pop_front();
        let body = self.bodies.lock().get(url).cloned();
        Box::pin(async move {
            if let Some(status) = scripted {
                return Ok(HttpResponse {
                    status,
                    body: Vec::new(),
                });
            }
            match body {
                Some(body) => Ok(HttpResponse { status: 200, body }),
                None => Ok(HttpResponse {
                    status: 404,
                    body: Vec::new(),
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_serves_shared_bodies() {
        let bodies = Arc::new(Mutex::new(HashMap::new()));
        bodies
            .lock()
            .insert("https://cdn.example.invalid/a".to_string(), vec![1, 2]);

        let client = MockHttpClient::new(bodies);
        let response = client
            .get("https://cdn.example.invalid/a", "ua")
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, vec![1, 2]);
    }

    #[tokio::test]
    async fn mock_missing_body_is_404() {
        let client = MockHttpClient::new(Arc::new(Mutex::new(HashMap::new())));
        let response = client.get("https://nowhere.invalid/x", "ua").await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn scripted_statuses_take_priority() {
        let client = MockHttpClient::new(Arc::new(Mutex::new(HashMap::new())));
        client.push_status(429);
        let response = client.get("https://nowhere.invalid/x", "ua").await.unwrap();
        assert_eq!(response.status, 429);
    }
}
