//! Attachment filename synthesis.
//!
//! Uploaded chunks must not look like filesystem fragments, so every chunk
//! gets an innocuous-looking name: a random prefix from a small pool, eight
//! hash bytes in hex, and a random media extension. The hash input mixes the
//! original path, chunk index, clock and a random word, so names never repeat
//! and never reveal the path. A second helper hashes names for log lines so
//! real names stay out of process output.

use rand::Rng;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix pool for synthesized attachment names.
const PREFIXES: [&str; 10] = [
    "img_", "cache_", "tmp_", "data_", "asset_", "thumb_", "preview_", "backup_", "sync_",
    "media_",
];

/// Extension pool: images, audio and generic cache formats.
const EXTENSIONS: [&str; 12] = [
    ".jpg", ".png", ".gif", ".webp", ".bmp", ".mp3", ".ogg", ".wav", ".dat", ".bin", ".cache",
    ".tmp",
];

const LOG_NAME_SALT: &str = "salt_discordfs";

/// Builds the uploaded filename for one chunk:
/// `<prefix><hash_hex8><extension>`.
pub fn attachment_name(original_path: &str, chunk_index: u32) -> String {
    let ticks = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let random: u64 = rand::thread_rng().gen();

    let digest = Sha256::digest(format!("{original_path}:{chunk_index}:{ticks}:{random}"));
    let hash_hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();

    let mut rng = rand::thread_rng();
    let prefix = PREFIXES[rng.gen_range(0..PREFIXES.len())];
    let extension = EXTENSIONS[rng.gen_range(0..EXTENSIONS.len())];

    format!("{prefix}{hash_hex}{extension}")
}

/// Short stable hash of a real name for log lines.
pub fn hash_file_name(name: &str) -> String {
    let digest = Sha256::digest(format!("{name}{LOG_NAME_SALT}"));
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}
