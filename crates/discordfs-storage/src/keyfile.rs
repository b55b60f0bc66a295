//! Master-key persistence.
//!
//! The key lives as a single base64 line in a process-local file. It is
//! generated on first run and loaded on every subsequent start; a key
//! supplied through configuration bypasses the file entirely.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::crypto::MasterKey;
use crate::error::{StorageError, StorageResult};

/// Decodes a base64 master-key string (for the config override).
pub fn decode_master_key(encoded: &str) -> StorageResult<MasterKey> {
    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| StorageError::InvalidKey {
            reason: format!("bad base64: {e}"),
        })?;
    let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| StorageError::InvalidKey {
        reason: format!("expected 32 bytes, got {}", v.len()),
    })?;
    Ok(MasterKey(bytes))
}

/// Loads the master key from `path`, generating and persisting a fresh one if
/// the file does not exist yet.
pub fn load_or_generate(path: &Path) -> StorageResult<MasterKey> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let key = decode_master_key(&contents)?;
        debug!("loaded master key from key file");
        return Ok(key);
    }

    let key = MasterKey::generate();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{}\n", BASE64_STANDARD.encode(key.0)))?;
    restrict_permissions(path)?;
    info!("generated new master key");
    Ok(key)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> StorageResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> StorageResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_once_then_reloads_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.key");

        let first = load_or_generate(&path).unwrap();
        let second = load_or_generate(&path).unwrap();
        assert_eq!(first.0, second.0);
    }

    #[test]
    fn key_file_is_one_base64_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.key");

        let key = load_or_generate(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert_eq!(
            BASE64_STANDARD.decode(contents.trim()).unwrap(),
            key.0.to_vec()
        );
    }

    #[test]
    fn decode_rejects_bad_base64() {
        assert!(matches!(
            decode_master_key("not!!base64"),
            Err(StorageError::InvalidKey { .. })
        ));
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let short = BASE64_STANDARD.encode([1u8; 16]);
        assert!(matches!(
            decode_master_key(&short),
            Err(StorageError::InvalidKey { .. })
        ));
    }

    #[test]
    fn decode_accepts_surrounding_whitespace() {
        let encoded = format!("  {}\n", BASE64_STANDARD.encode([9u8; 32]));
        let key = decode_master_key(&encoded).unwrap();
        assert_eq!(key.0, [9u8; 32]);
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.key");
        load_or_generate(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
