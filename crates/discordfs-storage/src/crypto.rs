//! Whole-file authenticated encryption with per-file key derivation.
//!
//! Every encryption draws a fresh 12-byte IV which doubles as the HKDF salt
//! for a per-file AES-256-GCM subkey, so a leaked subkey exposes one file and
//! IV uniqueness never has to be tracked at the master-key level. The output
//! frame is `IV(12) || TAG(16) || CIPHERTEXT(n)` and is self-describing:
//! decryption needs only the blob and the master key.

use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{StorageError, StorageResult};

/// IV length of the frame header.
pub const IV_LEN: usize = 12;
/// GCM authentication tag length.
pub const TAG_LEN: usize = 16;
/// Fixed per-file overhead: `|encrypt(b)| == |b| + ENCRYPTION_OVERHEAD`.
pub const ENCRYPTION_OVERHEAD: usize = IV_LEN + TAG_LEN;

const SUBKEY_INFO: &[u8] = b"DiscordFS-FileKey-v1";

/// 256-bit master key. Zeroed on drop; never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(pub [u8; 32]);

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

impl MasterKey {
    /// Generates 32 cryptographically random bytes.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

/// Whole-buffer cipher owning the master key exclusively.
pub struct FileCipher {
    master: MasterKey,
}

impl FileCipher {
    /// Takes ownership of the master key; it is zeroed when the cipher drops.
    pub fn new(master: MasterKey) -> Self {
        Self { master }
    }

    /// Derives the per-file subkey for the given IV. The subkey is zeroed as
    /// soon as the caller's `Zeroizing` wrapper drops.
    fn subkey(&self, iv: &[u8]) -> Zeroizing<[u8; 32]> {
        let hk = Hkdf::<Sha256>::new(Some(iv), &self.master.0);
        let mut okm = Zeroizing::new([0u8; 32]);
        hk.expand(SUBKEY_INFO, okm.as_mut())
            .expect("HKDF expand failed");
        okm
    }

    /// Encrypts a buffer of any length. The result is exactly
    /// `plaintext.len() + ENCRYPTION_OVERHEAD` bytes.
    pub fn encrypt(&self, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let subkey = self.subkey(&iv);
        let cipher = Aes256Gcm::new_from_slice(subkey.as_ref())
            .map_err(|e| StorageError::EncryptionFailed(e.to_string()))?;

        // The AEAD appends the tag; the frame wants it ahead of the ciphertext.
        let ct_and_tag = cipher
            .encrypt(aes_gcm::Nonce::from_slice(&iv), plaintext)
            .map_err(|e| StorageError::EncryptionFailed(e.to_string()))?;
        let (ciphertext, tag) = ct_and_tag.split_at(ct_and_tag.len() - TAG_LEN);

        let mut out = Vec::with_capacity(plaintext.len() + ENCRYPTION_OVERHEAD);
        out.extend_from_slice(&iv);
        out.extend_from_slice(tag);
        out.extend_from_slice(ciphertext);
        Ok(out)
    }

    /// Decrypts an `IV || TAG || CIPHERTEXT` frame.
    ///
    /// Fails with [`StorageError::Corrupted`] when the blob is shorter than
    /// the framing header or the authentication tag does not verify.
    pub fn decrypt(&self, blob: &[u8]) -> StorageResult<Vec<u8>> {
        if blob.len() < ENCRYPTION_OVERHEAD {
            return Err(StorageError::Corrupted {
                reason: format!(
                    "blob of {} bytes is shorter than the {} byte frame header",
                    blob.len(),
                    ENCRYPTION_OVERHEAD
                ),
            });
        }

        let iv = &blob[..IV_LEN];
        let tag = &blob[IV_LEN..ENCRYPTION_OVERHEAD];
        let ciphertext = &blob[ENCRYPTION_OVERHEAD..];

        let subkey = self.subkey(iv);
        let cipher = Aes256Gcm::new_from_slice(subkey.as_ref())
            .map_err(|e| StorageError::EncryptionFailed(e.to_string()))?;

        let mut ct_and_tag = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        ct_and_tag.extend_from_slice(ciphertext);
        ct_and_tag.extend_from_slice(tag);

        cipher
            .decrypt(aes_gcm::Nonce::from_slice(iv), ct_and_tag.as_slice())
            .map_err(|_| StorageError::Corrupted {
                reason: "authentication tag mismatch".to_string(),
            })
    }
}
