//! Deterministic chunking and integrity-checked reassembly.
//!
//! The write path encrypts the whole buffer first (when a cipher is
//! configured) and splits the result into chunks of at most [`CHUNK_MAX`]
//! bytes, each carrying the CRC-32 of its own bytes. The read path downloads
//! the chunks in index order, verifies every CRC, concatenates and decrypts.
//! Successive downloads are spaced by a short random sleep to avoid hitting
//! the CDN in a burst; that spacing is deliberately separate from the upload
//! throttler, which models the uploader's rate budget instead.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use discordfs_meta::ChunkRef;

use crate::crypto::{FileCipher, ENCRYPTION_OVERHEAD};
use crate::error::{StorageError, StorageResult};

/// Maximum chunk payload: 9 MiB, the attachment ceiling of the chat service.
pub const CHUNK_MAX: usize = 9 * 1024 * 1024;

/// Spacing between successive chunk downloads.
const DOWNLOAD_GAP_MS: std::ops::RangeInclusive<u64> = 100..=400;

/// One outbound fragment of a (possibly encrypted) file body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position within the file, starting at 0.
    pub index: u32,
    /// The fragment bytes.
    pub data: Vec<u8>,
    /// CRC-32 (ISO/HDLC) over `data`.
    pub crc32: u32,
}

/// Lazily splits a buffer into chunks of at most [`CHUNK_MAX`] bytes with
/// ascending indices from 0. The final chunk carries the remainder; an empty
/// buffer yields no chunks.
pub fn fragment(data: &[u8]) -> impl Iterator<Item = Chunk> + '_ {
    data.chunks(CHUNK_MAX).enumerate().map(|(i, piece)| Chunk {
        index: i as u32,
        crc32: crc32fast::hash(piece),
        data: piece.to_vec(),
    })
}

/// Number of chunks a plaintext of `plain_size` bytes produces once the
/// encryption overhead is added.
pub fn chunk_count(plain_size: u64) -> u64 {
    (plain_size + ENCRYPTION_OVERHEAD as u64).div_ceil(CHUNK_MAX as u64)
}

/// Write-path entry: encrypts the buffer when a cipher is configured, then
/// collects its fragments.
pub fn prepare(data: &[u8], cipher: Option<&FileCipher>) -> StorageResult<Vec<Chunk>> {
    let payload = match cipher {
        Some(c) => c.encrypt(data)?,
        None => data.to_vec(),
    };
    Ok(fragment(&payload).collect())
}

/// Downloads, verifies and concatenates the chunks of a file, then decrypts.
///
/// Refs are processed in ascending `chunk_index` order regardless of input
/// order. Every downloaded chunk must match its recorded CRC-32 or the read
/// fails with [`StorageError::IntegrityFailure`].
///
/// When a cipher is configured and the reassembled blob is at least the frame
/// header long, a failed decryption is read as "this file was stored
/// unencrypted" and the raw bytes are returned; that fallback keeps bodies
/// written before encryption was enabled readable and must be preserved.
pub async fn reassemble_from_refs<F, Fut>(
    refs: &[ChunkRef],
    mut fetch: F,
    cipher: Option<&FileCipher>,
) -> StorageResult<Vec<u8>>
where
    F: FnMut(&ChunkRef) -> Fut,
    Fut: Future<Output = StorageResult<Vec<u8>>>,
{
    let mut ordered: Vec<&ChunkRef> = refs.iter().collect();
    ordered.sort_by_key(|r| r.chunk_index);

    let total: usize = ordered.iter().map(|r| r.size_bytes as usize).sum();
    let mut blob = Vec::with_capacity(total);

    for (i, chunk_ref) in ordered.iter().enumerate() {
        if i > 0 {
            let gap = rand::thread_rng().gen_range(DOWNLOAD_GAP_MS);
            tokio::time::sleep(Duration::from_millis(gap)).await;
        }

        let bytes = fetch(chunk_ref).await?;
        let actual = crc32fast::hash(&bytes);
        if actual != chunk_ref.crc32 {
            return Err(StorageError::IntegrityFailure {
                chunk_index: chunk_ref.chunk_index,
                expected: chunk_ref.crc32,
                actual,
            });
        }
        blob.extend_from_slice(&bytes);
    }

    match cipher {
        Some(c) if blob.len() >= ENCRYPTION_OVERHEAD => match c.decrypt(&blob) {
            Ok(plaintext) => Ok(plaintext),
            Err(StorageError::Corrupted { .. }) => {
                debug!(
                    bytes = blob.len(),
                    "blob does not decrypt, treating as stored unencrypted"
                );
                Ok(blob)
            }
            Err(e) => Err(e),
        },
        _ => Ok(blob),
    }
}
