//! Boot-time configuration checks and the cipher self-test.

use serde::Serialize;
use tracing::{error, warn};

use crate::crypto::FieldCipher;
use crate::keys::{decode_key, KeyDecodeError, KeyStore};
use crate::registry::FieldRegistry;

/// Known plaintext round-tripped by [`self_test`].
const SELF_TEST_PLAINTEXT: &str = "fieldguard self-test \u{2713} {\"sample\": [1, 2, 3]}";

/// Structured result of [`validate_setup`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetupReport {
    /// `true` when there are no errors. Warnings do not affect validity.
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check the encoded key and the registry without failing.
///
/// Errors (the process must not serve traffic):
/// - key missing, not base64, or not 32 bytes.
///
/// Warnings:
/// - no entity/field pair registered (every operation is a passthrough);
/// - key bytes are all identical (placeholder key).
pub fn validate_setup(encoded_key: Option<&str>, registry: &dyn FieldRegistry) -> SetupReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    match decode_key(encoded_key) {
        Ok(mut key) => {
            warnings.extend(placeholder_key_warning(&key));
            key.iter_mut().for_each(|b| *b = 0);
        }
        Err(e) => errors.push(e.to_string()),
    }
    warnings.extend(empty_registry_warning(registry));

    SetupReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Same checks as [`validate_setup`], run against the key already loaded in
/// `keys` instead of its encoded form.
///
/// The store only accepts keys of the right length, so the one possible key
/// error is that none is loaded.
pub fn validate_loaded(keys: &KeyStore, registry: &dyn FieldRegistry) -> SetupReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    match keys.current() {
        Ok(key) => warnings.extend(placeholder_key_warning(key.as_bytes())),
        Err(_) => errors.push(KeyDecodeError::Missing.to_string()),
    }
    warnings.extend(empty_registry_warning(registry));

    SetupReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn placeholder_key_warning(key: &[u8]) -> Option<String> {
    key.windows(2).all(|w| w[0] == w[1]).then(|| {
        "FIELD_ENCRYPTION_KEY consists of a single repeated byte; use a random key".to_owned()
    })
}

fn empty_registry_warning(registry: &dyn FieldRegistry) -> Option<String> {
    registry.list_all().values().all(Vec::is_empty).then(|| {
        "no encrypted fields are registered; all operations pass through unencrypted".to_owned()
    })
}

/// Round-trip a known plaintext through `cipher`.
///
/// Returns `false` (and logs why) if encryption fails, the output is not
/// recognised as an envelope, decryption fails, or the plaintext differs.
pub fn self_test(cipher: &dyn FieldCipher) -> bool {
    let envelope = match cipher.encrypt(SELF_TEST_PLAINTEXT) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!(error = %e, "self-test: encryption failed");
            return false;
        }
    };
    if !cipher.is_encrypted(&envelope) {
        error!("self-test: ciphertext is not recognised as encrypted");
        return false;
    }
    match cipher.decrypt(&envelope) {
        Ok(plaintext) if plaintext == SELF_TEST_PLAINTEXT => true,
        Ok(_) => {
            warn!("self-test: decrypted plaintext does not match");
            false
        }
        Err(e) => {
            error!(error = %e, "self-test: decryption failed");
            false
        }
    }
}
