//! [`KeyStore`]: thread-safe holder for the decoded field encryption key.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::crypto::KEY_LEN;

/// Errors produced by the key layer.
#[derive(Debug, Error)]
pub enum KeyError {
    /// No key has been stored yet.
    #[error("encryption key not yet initialised")]
    NotInitialised,

    /// The key material has an unexpected length.
    #[error("encryption key has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// When this type is dropped, the memory is overwritten with zeroes to
/// minimise the window during which plaintext key material lives in RAM.
pub struct KeyBytes(Box<[u8; KEY_LEN]>);

impl KeyBytes {
    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }

    /// Short, non-reversible identifier for logs and diagnostics.
    ///
    /// First eight bytes of the SHA-256 digest of the key, hex-encoded.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_slice());
        digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl Drop for KeyBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("KeyBytes([REDACTED])")
    }
}

/// Thread-safe store for the current field encryption key.
///
/// Readers (every encrypt/decrypt call) take a lock-free snapshot; a rotation
/// atomically swaps in a new key. Snapshots taken before a rotation keep the
/// old key alive until they are dropped.
#[derive(Clone, Debug, Default)]
pub struct KeyStore {
    inner: Arc<ArcSwapOption<KeyBytes>>,
}

impl KeyStore {
    /// Create a new, empty [`KeyStore`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a key is currently loaded.
    pub fn is_ready(&self) -> bool {
        self.inner.load().is_some()
    }

    /// Store (or replace) the current key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidLength`] if the slice is not [`KEY_LEN`] bytes.
    pub fn store(&self, key_bytes: &[u8]) -> Result<(), KeyError> {
        if key_bytes.len() != KEY_LEN {
            return Err(KeyError::InvalidLength(key_bytes.len()));
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(key_bytes);
        self.inner.store(Some(Arc::new(KeyBytes(buf))));
        Ok(())
    }

    /// Snapshot of the current key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotInitialised`] if no key has been stored yet.
    pub fn current(&self) -> Result<Arc<KeyBytes>, KeyError> {
        self.inner.load_full().ok_or(KeyError::NotInitialised)
    }

    /// Fingerprint of the current key, if one is loaded.
    pub fn fingerprint(&self) -> Option<String> {
        self.inner.load().as_ref().map(|k| k.fingerprint())
    }
}
