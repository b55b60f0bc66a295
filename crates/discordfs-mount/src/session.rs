//! Session wiring and teardown.
//!
//! Builds the engine out of its parts in dependency order and tears it down
//! the same way backwards: stop accepting work, drain tracked tasks, close
//! the index, zero the master key, drop the store. The kernel bridge and the
//! real chat SDK binding attach from outside.

use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use discordfs_meta::MetadataIndex;
use discordfs_remote::{ChatTransport, HttpClient, RemoteStore, StoreConfig};
use discordfs_storage::{keyfile, ContentCache, FileCipher};

use crate::config::FsConfig;
use crate::error::MountResult;
use crate::filesystem::DiscordFs;

/// File name of the metadata database inside the data directory.
pub const INDEX_FILE: &str = "metadata.db";
/// File name of the master-key file inside the data directory.
pub const KEY_FILE: &str = "master.key";

/// A running engine instance.
pub struct FsSession<T: ChatTransport + 'static, H: HttpClient + 'static> {
    fs: Arc<DiscordFs<T, H>>,
    cancel: CancellationToken,
}

impl<T: ChatTransport + 'static, H: HttpClient + 'static> FsSession<T, H> {
    /// Validates the config and wires the engine. `data_dir` holds the
    /// metadata database and the key file.
    pub fn start(
        config: &FsConfig,
        transport: T,
        http: H,
        store_config: StoreConfig,
        data_dir: &Path,
    ) -> MountResult<Self> {
        config.validate()?;

        let cipher = if config.security.enable_encryption {
            let master = match &config.security.master_key {
                Some(encoded) => keyfile::decode_master_key(encoded)?,
                None => keyfile::load_or_generate(&data_dir.join(KEY_FILE))?,
            };
            Some(Arc::new(FileCipher::new(master)))
        } else {
            None
        };

        let index = Arc::new(MetadataIndex::open(data_dir.join(INDEX_FILE))?);
        let cache = Arc::new(ContentCache::new(config.cache_size_bytes()));

        let cancel = CancellationToken::new();
        let store = Arc::new(RemoteStore::new(
            transport,
            http,
            store_config,
            cancel.child_token(),
        ));

        let fs = Arc::new(DiscordFs::new(index, store, cache, cipher));
        info!(
            drive = %config.file_system.drive_letter,
            encryption = config.security.enable_encryption,
            "engine started"
        );
        Ok(Self { fs, cancel })
    }

    /// The adapter the bridge drives.
    pub fn filesystem(&self) -> Arc<DiscordFs<T, H>> {
        Arc::clone(&self.fs)
    }

    /// Token that aborts in-flight waits when the session shuts down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Orderly teardown. In-flight uploads are cancelled and abandoned; the
    /// index only records completed uploads, so abandonment leaves at worst
    /// orphan attachments.
    pub async fn shutdown(self) {
        info!("engine shutting down");
        self.cancel.cancel();
        self.fs.tasks().wait_idle().await;
        // Dropping the adapter drops the index connection, zeroes the master
        // key and releases the HTTP client, in that order.
        drop(self.fs);
        info!("engine stopped");
    }
}
