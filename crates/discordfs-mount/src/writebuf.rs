//! Per-path write buffers.
//!
//! Bytes written through the kernel accumulate here until the close callback
//! hands the whole buffer to the upload pipeline. Each path has at most one
//! buffer; writes to one buffer serialize on its own mutex so the outer map
//! lock stays short.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type Buffer = Arc<Mutex<Vec<u8>>>;

/// Growable write buffers keyed by normalized virtual path.
#[derive(Default)]
pub struct WriteBuffers {
    buffers: Mutex<HashMap<String, Buffer>>,
}

impl WriteBuffers {
    /// Creates an empty buffer map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh, empty buffer for the path, dropping any previous one.
    pub fn create(&self, path: &str) {
        self.buffers
            .lock()
            .insert(path.to_string(), Arc::new(Mutex::new(Vec::new())));
    }

    /// Starts a buffer preloaded with `body` (append mode).
    pub fn seed(&self, path: &str, body: Vec<u8>) {
        self.buffers
            .lock()
            .insert(path.to_string(), Arc::new(Mutex::new(body)));
    }

    /// Whether the path has an active buffer.
    pub fn contains(&self, path: &str) -> bool {
        self.buffers.lock().contains_key(path)
    }

    /// Writes `data` at `offset`, creating the buffer on demand. Gaps beyond
    /// the current end are zero-filled. Returns the number of bytes written.
    pub fn write(&self, path: &str, offset: u64, data: &[u8]) -> usize {
        let buffer = {
            let mut buffers = self.buffers.lock();
            Arc::clone(
                buffers
                    .entry(path.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(Vec::new()))),
            )
        };

        let mut bytes = buffer.lock();
        let offset = offset as usize;
        let end = offset + data.len();
        if end > bytes.len() {
            bytes.resize(end, 0);
        }
        bytes[offset..end].copy_from_slice(data);
        debug!(offset, len = data.len(), total = bytes.len(), "buffered write");
        data.len()
    }

    /// Removes the buffer for the path and returns its bytes.
    pub fn take(&self, path: &str) -> Option<Vec<u8>> {
        let buffer = self.buffers.lock().remove(path)?;
        let bytes = std::mem::take(&mut *buffer.lock());
        Some(bytes)
    }

    /// Drops the buffer for the path without returning it.
    pub fn discard(&self, path: &str) {
        self.buffers.lock().remove(path);
    }

    /// Number of active buffers.
    pub fn len(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Whether no buffers are active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_writes_concatenate() {
        let buffers = WriteBuffers::new();
        buffers.write("a.txt", 0, b"hello ");
        buffers.write("a.txt", 6, b"world");

        assert_eq!(buffers.take("a.txt").unwrap(), b"hello world");
    }

    #[test]
    fn write_creates_buffer_on_demand() {
        let buffers = WriteBuffers::new();
        assert!(!buffers.contains("a.txt"));
        buffers.write("a.txt", 0, b"x");
        assert!(buffers.contains("a.txt"));
    }

    #[test]
    fn gap_writes_zero_fill() {
        let buffers = WriteBuffers::new();
        buffers.write("a.bin", 4, b"zz");

        assert_eq!(buffers.take("a.bin").unwrap(), vec![0, 0, 0, 0, b'z', b'z']);
    }

    #[test]
    fn overlapping_writes_overwrite_in_place() {
        let buffers = WriteBuffers::new();
        buffers.write("a.bin", 0, b"aaaa");
        buffers.write("a.bin", 2, b"bb");

        assert_eq!(buffers.take("a.bin").unwrap(), b"aabb");
    }

    #[test]
    fn create_resets_existing_buffer() {
        let buffers = WriteBuffers::new();
        buffers.write("a.txt", 0, b"old");
        buffers.create("a.txt");

        assert_eq!(buffers.take("a.txt").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn seed_preloads_content() {
        let buffers = WriteBuffers::new();
        buffers.seed("a.txt", b"existing".to_vec());
        buffers.write("a.txt", 8, b"+more");

        assert_eq!(buffers.take("a.txt").unwrap(), b"existing+more");
    }

    #[test]
    fn take_removes_the_buffer() {
        let buffers = WriteBuffers::new();
        buffers.write("a.txt", 0, b"x");
        buffers.take("a.txt");

        assert!(buffers.take("a.txt").is_none());
        assert!(buffers.is_empty());
    }

    #[test]
    fn buffers_are_independent_per_path() {
        let buffers = WriteBuffers::new();
        buffers.write("a.txt", 0, b"aaa");
        buffers.write("b.txt", 0, b"bbb");
        buffers.discard("a.txt");

        assert!(!buffers.contains("a.txt"));
        assert_eq!(buffers.take("b.txt").unwrap(), b"bbb");
    }
}
