//! Field encryption key decoding and storage.
//!
//! # Lifecycle
//!
//! 1. At startup the key is read once from `FIELD_ENCRYPTION_KEY` as standard
//!    base64 of exactly [`KEY_LEN`](crate::crypto::KEY_LEN) bytes.
//! 2. [`load_encoded`] decodes it and seeds the [`KeyStore`].
//! 3. Every encrypt/decrypt takes a lock-free snapshot via [`KeyStore::current`].
//! 4. Rotation is another [`load_encoded`] call; callers re-run the self-test
//!    afterwards.
//!
//! # Security invariants
//!
//! - Key bytes are never written to disk, logged, or included in traces. Only
//!   the SHA-256 fingerprint is logged.

pub mod store;

pub use store::{KeyBytes, KeyError, KeyStore};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::info;

use crate::crypto::KEY_LEN;

/// Reasons an encoded key cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyDecodeError {
    /// The key is absent or blank.
    #[error("FIELD_ENCRYPTION_KEY is not set")]
    Missing,

    /// The key is not valid standard base64.
    #[error("FIELD_ENCRYPTION_KEY is not valid base64")]
    Encoding,

    /// The key decodes to the wrong number of bytes.
    #[error("FIELD_ENCRYPTION_KEY must decode to {KEY_LEN} bytes, got {0}")]
    Length(usize),
}

/// Decode a base64 key, checking presence, encoding, and size.
///
/// # Errors
///
/// Returns the first [`KeyDecodeError`] that applies.
pub fn decode_key(encoded: Option<&str>) -> Result<Vec<u8>, KeyDecodeError> {
    let encoded = encoded
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(KeyDecodeError::Missing)?;
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|_| KeyDecodeError::Encoding)?;
    if bytes.len() != KEY_LEN {
        return Err(KeyDecodeError::Length(bytes.len()));
    }
    Ok(bytes)
}

/// Decode `encoded` and store it in `store`, replacing any previous key.
///
/// # Errors
///
/// Returns a [`KeyDecodeError`] if the key is missing or malformed; the store
/// is left untouched in that case.
pub fn load_encoded(store: &KeyStore, encoded: Option<&str>) -> Result<(), KeyDecodeError> {
    let mut bytes = decode_key(encoded)?;
    let stored = store
        .store(&bytes)
        .map_err(|_| KeyDecodeError::Length(bytes.len()));
    bytes.iter_mut().for_each(|b| *b = 0);
    stored?;

    if let Some(fingerprint) = store.fingerprint() {
        info!(key_fingerprint = %fingerprint, "field encryption key loaded");
    }
    Ok(())
}
