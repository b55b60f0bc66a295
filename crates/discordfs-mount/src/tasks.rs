//! Tracked detached work.
//!
//! Close-time uploads and unlink-time deletes run detached from the kernel
//! callback, but the handles are kept so teardown and tests can drain them
//! instead of silently dropping in-flight work.

use parking_lot::Mutex;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::warn;

/// Registry of spawned background tasks.
#[derive(Default)]
pub struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a future and tracks its handle.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.handles.lock().push(handle);
    }

    /// Awaits every tracked task, including ones spawned while draining.
    pub async fn wait_idle(&self) {
        loop {
            let batch: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        warn!(error = %e, "background task panicked");
                    }
                }
            }
        }
    }

    /// Number of tracked (possibly finished) tasks.
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    /// Whether no tasks are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
