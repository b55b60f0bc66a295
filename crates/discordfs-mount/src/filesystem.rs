//! The filesystem adapter.
//!
//! Translates kernel file-op callbacks into engine operations: writes buffer
//! until close, reads come from a per-session body cache backed by the shared
//! content cache, and close-time uploads run as tracked background tasks so
//! the kernel callback returns immediately.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use discordfs_meta::types::normalize_path;
use discordfs_meta::{FileRecord, MetadataIndex};
use discordfs_remote::obfuscate::hash_file_name;
use discordfs_remote::{ChatTransport, HttpClient, RemoteStore};
use discordfs_storage::{prepare, reassemble_from_refs, ContentCache, FileCipher, StorageError};

use crate::bridge::{FileInfo, OpenMode, OpenOutcome, VolumeInfo, VOLUME_FREE_BYTES, VOLUME_TOTAL_BYTES};
use crate::error::{MountError, MountResult};
use crate::pattern;
use crate::tasks::BackgroundTasks;
use crate::writebuf::WriteBuffers;

/// Bodies kept in the per-session read cache.
const READ_CACHE_FILES: usize = 128;

fn cache_key(path: &str) -> String {
    format!("file:{path}")
}

/// Engine-facing implementation of the kernel bridge callbacks.
pub struct DiscordFs<T: ChatTransport + 'static, H: HttpClient + 'static> {
    index: Arc<MetadataIndex>,
    store: Arc<RemoteStore<T, H>>,
    cache: Arc<ContentCache>,
    cipher: Option<Arc<FileCipher>>,
    write_buffers: WriteBuffers,
    read_cache: Mutex<LruCache<String, Arc<Vec<u8>>>>,
    tasks: Arc<BackgroundTasks>,
}

impl<T: ChatTransport + 'static, H: HttpClient + 'static> DiscordFs<T, H> {
    /// Wires the adapter over its collaborators.
    pub fn new(
        index: Arc<MetadataIndex>,
        store: Arc<RemoteStore<T, H>>,
        cache: Arc<ContentCache>,
        cipher: Option<Arc<FileCipher>>,
    ) -> Self {
        Self {
            index,
            store,
            cache,
            cipher,
            write_buffers: WriteBuffers::new(),
            read_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(READ_CACHE_FILES).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
            tasks: Arc::new(BackgroundTasks::new()),
        }
    }

    /// The background-task registry (teardown and tests drain it).
    pub fn tasks(&self) -> Arc<BackgroundTasks> {
        Arc::clone(&self.tasks)
    }

    /// Open/create. Existing directories and the root open as directories
    /// regardless of mode; files honor the caller's open disposition.
    pub async fn open(&self, raw_path: &str, mode: OpenMode) -> MountResult<OpenOutcome> {
        let path = normalize_path(raw_path);
        debug!(name_hash = %hash_file_name(&path), ?mode, "open");

        if path.is_empty() {
            return Ok(OpenOutcome { is_directory: true });
        }

        let existing = self.index.get(&path)?;
        if let Some(record) = &existing {
            if record.is_directory {
                return Ok(OpenOutcome { is_directory: true });
            }
        }
        let exists = existing.is_some();

        match mode {
            OpenMode::CreateNew => {
                if exists {
                    return Err(MountError::AlreadyExists);
                }
                self.write_buffers.create(&path);
            }
            OpenMode::Create => {
                self.write_buffers.create(&path);
            }
            OpenMode::Truncate => {
                if !exists {
                    return Err(MountError::NotFound);
                }
                self.write_buffers.create(&path);
            }
            OpenMode::Open => {
                if !exists {
                    return Err(MountError::NotFound);
                }
            }
            OpenMode::OpenOrCreate => {
                if !exists {
                    self.write_buffers.create(&path);
                }
            }
            OpenMode::Append => {
                if exists {
                    let body = self.load_file_data(&path).await?;
                    self.write_buffers.seed(&path, (*body).clone());
                } else {
                    self.write_buffers.create(&path);
                }
            }
        }

        Ok(OpenOutcome {
            is_directory: false,
        })
    }

    /// Creates a directory record.
    pub fn create_directory(&self, raw_path: &str) -> MountResult<()> {
        let path = normalize_path(raw_path);
        if path.is_empty() || self.index.exists(&path)? {
            return Err(MountError::AlreadyExists);
        }
        self.index.save(&FileRecord::new_directory(path))?;
        Ok(())
    }

    /// Offset read. Reads past end of file return empty with success.
    pub async fn read(&self, raw_path: &str, offset: u64, size: usize) -> MountResult<Vec<u8>> {
        let path = normalize_path(raw_path);

        let body = {
            let cached = self.read_cache.lock().get(&path).cloned();
            match cached {
                Some(body) => body,
                None => {
                    let body = self.load_file_data(&path).await?;
                    self.read_cache.lock().put(path.clone(), Arc::clone(&body));
                    body
                }
            }
        };

        let offset = offset as usize;
        if offset >= body.len() {
            return Ok(Vec::new());
        }
        let end = (offset + size).min(body.len());
        Ok(body[offset..end].to_vec())
    }

    /// Offset write into the path's buffer. No upload happens here.
    pub fn write(&self, raw_path: &str, offset: u64, data: &[u8]) -> MountResult<usize> {
        let path = normalize_path(raw_path);
        Ok(self.write_buffers.write(&path, offset, data))
    }

    /// Close-time flush: hands the buffered bytes to a detached upload task
    /// and returns immediately. Upload failures are logged, never surfaced.
    pub fn cleanup(&self, raw_path: &str) {
        let path = normalize_path(raw_path);
        let Some(buffer) = self.write_buffers.take(&path) else {
            return;
        };
        // Later reads must see the post-upload truth, not the session copy.
        self.read_cache.lock().pop(&path);

        let index = Arc::clone(&self.index);
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let cipher = self.cipher.clone();
        self.tasks.spawn(async move {
            let name_hash = hash_file_name(&path);
            match flush_buffer(&index, &store, &cache, cipher.as_deref(), &path, buffer).await {
                Ok(chunks) => info!(name_hash = %name_hash, chunks, "file uploaded"),
                Err(e) => warn!(name_hash = %name_hash, error = %e, "background upload failed"),
            }
        });
    }

    /// Final handle close. All work happened in cleanup.
    pub fn close(&self, _raw_path: &str) {}

    /// Removes a file: record now, attachments best-effort in the background.
    pub fn delete_file(&self, raw_path: &str) -> MountResult<()> {
        let path = normalize_path(raw_path);
        let record = self.index.get(&path)?.ok_or(MountError::NotFound)?;
        if record.is_directory {
            return Err(MountError::IsDirectory);
        }

        let message_ids: Vec<u64> = record.chunks.iter().map(|c| c.message_id).collect();
        self.index.delete(&path)?;
        self.cache.evict_by_prefix(&cache_key(&path));
        self.read_cache.lock().pop(&path);

        if !message_ids.is_empty() {
            let store = Arc::clone(&self.store);
            self.tasks.spawn(async move {
                store.delete_many(&message_ids).await;
            });
        }
        debug!(name_hash = %hash_file_name(&path), "deleted file");
        Ok(())
    }

    /// Removes an empty directory.
    pub fn delete_directory(&self, raw_path: &str) -> MountResult<()> {
        let path = normalize_path(raw_path);
        if !self.index.exists(&path)? {
            return Err(MountError::NotFound);
        }
        if !self.index.list(&path)?.is_empty() {
            return Err(MountError::NotEmpty);
        }
        self.index.delete(&path)?;
        Ok(())
    }

    /// Renames a file (or childless directory) in the index.
    pub fn move_file(&self, raw_old: &str, raw_new: &str, replace: bool) -> MountResult<()> {
        let old_path = normalize_path(raw_old);
        let new_path = normalize_path(raw_new);

        let record = self.index.get(&old_path)?.ok_or(MountError::NotFound)?;
        if record.is_directory && !self.index.list(&old_path)?.is_empty() {
            // The index never rewrites descendant paths.
            return Err(MountError::DirectoryRenameUnsupported);
        }

        if let Some(dest) = self.index.get(&new_path)? {
            if !replace {
                return Err(MountError::AlreadyExists);
            }
            let message_ids: Vec<u64> = dest.chunks.iter().map(|c| c.message_id).collect();
            self.index.delete(&new_path)?;
            self.cache.evict_by_prefix(&cache_key(&new_path));
            if !message_ids.is_empty() {
                let store = Arc::clone(&self.store);
                self.tasks.spawn(async move {
                    store.delete_many(&message_ids).await;
                });
            }
        }

        self.index.rename(&old_path, &new_path)?;
        self.cache.evict(&cache_key(&old_path));
        self.read_cache.lock().pop(&old_path);
        debug!(
            from_hash = %hash_file_name(&old_path),
            to_hash = %hash_file_name(&new_path),
            "moved file"
        );
        Ok(())
    }

    /// Lists a directory, optionally filtered by a `*`/`?` pattern.
    pub fn find_files(&self, raw_dir: &str, search_pattern: Option<&str>) -> MountResult<Vec<FileInfo>> {
        let dir = normalize_path(raw_dir);
        let records = self.index.list(&dir)?;
        Ok(records
            .iter()
            .filter(|r| search_pattern.map_or(true, |p| pattern::matches(p, &r.file_name)))
            .map(FileInfo::from)
            .collect())
    }

    /// Attribute lookup for one path.
    pub fn get_file_info(&self, raw_path: &str) -> MountResult<FileInfo> {
        let path = normalize_path(raw_path);
        if path.is_empty() {
            let now = chrono::Utc::now();
            return Ok(FileInfo {
                file_name: String::new(),
                size_bytes: 0,
                created_at: now,
                modified_at: now,
                is_directory: true,
            });
        }
        let record = self.index.get(&path)?.ok_or(MountError::NotFound)?;
        Ok(FileInfo::from(&record))
    }

    /// Fixed volume identity.
    pub fn volume_info(&self) -> VolumeInfo {
        VolumeInfo::default()
    }

    /// Fixed capacity figures: `(total, free)`.
    pub fn disk_free(&self) -> (u64, u64) {
        (VOLUME_TOTAL_BYTES, VOLUME_FREE_BYTES)
    }

    /// Bridge attached.
    pub fn mounted(&self) {
        info!("filesystem mounted");
    }

    /// Bridge detached.
    pub fn unmounted(&self) {
        info!("filesystem unmounted");
    }

    /// Trivial success: the engine has no lock table.
    pub fn lock_file(&self, _raw_path: &str) -> MountResult<()> {
        Ok(())
    }

    /// Trivial success: attributes are not modeled.
    pub fn set_file_attributes(&self, _raw_path: &str) -> MountResult<()> {
        Ok(())
    }

    /// Trivial success: times are owned by the index.
    pub fn set_file_times(&self, _raw_path: &str) -> MountResult<()> {
        Ok(())
    }

    /// Trivial success: allocation is implicit in the write buffer.
    pub fn set_allocation_size(&self, _raw_path: &str, _size: u64) -> MountResult<()> {
        Ok(())
    }

    /// Trivial success: nothing to flush before cleanup runs.
    pub fn flush(&self, _raw_path: &str) -> MountResult<()> {
        Ok(())
    }

    /// Alternate data streams are not modeled.
    pub fn find_streams(&self, _raw_path: &str) -> MountResult<Vec<FileInfo>> {
        Err(MountError::NotImplemented {
            op: "find_streams".to_string(),
        })
    }

    /// Security descriptors are not modeled.
    pub fn get_file_security(&self, _raw_path: &str) -> MountResult<Vec<u8>> {
        Err(MountError::NotImplemented {
            op: "get_file_security".to_string(),
        })
    }

    async fn load_file_data(&self, path: &str) -> MountResult<Arc<Vec<u8>>> {
        let key = cache_key(path);
        if let Some(body) = self.cache.get(&key) {
            return Ok(body);
        }

        let record = self.index.get(path)?.ok_or(MountError::NotFound)?;
        if record.is_directory {
            return Err(MountError::IsDirectory);
        }

        let store = Arc::clone(&self.store);
        let body = reassemble_from_refs(
            &record.chunks,
            |chunk_ref| {
                let store = Arc::clone(&store);
                let url = chunk_ref.attachment_url.clone();
                async move {
                    store
                        .download(&url)
                        .await
                        .map_err(|e| StorageError::Fetch(e.to_string()))
                }
            },
            self.cipher.as_deref(),
        )
        .await?;

        debug!(name_hash = %hash_file_name(path), bytes = body.len(), "loaded file body");
        let body = Arc::new(body);
        self.cache.add_shared(key, Arc::clone(&body));
        Ok(body)
    }
}

async fn flush_buffer<T: ChatTransport, H: HttpClient>(
    index: &MetadataIndex,
    store: &RemoteStore<T, H>,
    cache: &ContentCache,
    cipher: Option<&FileCipher>,
    path: &str,
    buffer: Vec<u8>,
) -> MountResult<usize> {
    let size_bytes = buffer.len() as u64;
    let chunks = if buffer.is_empty() {
        Vec::new()
    } else {
        prepare(&buffer, cipher)?
    };

    let mut refs = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let chunk_ref = store
            .upload(chunk.data, path, chunk.index, chunk.crc32)
            .await?;
        refs.push(chunk_ref);
    }

    let chunk_count = refs.len();
    let record = FileRecord::new_file(path, size_bytes, refs);
    index.save(&record)?;
    // Drop any stale body so the next read reassembles the uploaded truth.
    cache.evict(&cache_key(path));
    Ok(chunk_count)
}
