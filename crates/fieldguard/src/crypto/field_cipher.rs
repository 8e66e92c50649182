//! String-in, string-out cipher seam used by the field transformer.

use super::cipher::{self, decrypt_field, encrypt_field, CipherError, EncryptedField};
use crate::keys::KeyStore;

/// Encryption primitive the transformer is written against.
///
/// Implementations must keep [`FieldCipher::is_encrypted`] total: it is called
/// on arbitrary stored strings and must never fail or need the key.
pub trait FieldCipher: Send + Sync {
    /// Encrypt `plaintext` into a self-describing envelope string.
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;

    /// Decrypt an envelope string back to plaintext.
    fn decrypt(&self, envelope: &str) -> Result<String, CipherError>;

    /// Whether `value` already carries a ciphertext envelope.
    fn is_encrypted(&self, value: &str) -> bool {
        cipher::is_encrypted(value)
    }
}

/// [`FieldCipher`] backed by AES-256-GCM-SIV and the process [`KeyStore`].
#[derive(Clone, Debug)]
pub struct AesFieldCipher {
    keys: KeyStore,
}

impl AesFieldCipher {
    /// Create a cipher reading its key from `keys` on every call.
    pub fn new(keys: KeyStore) -> Self {
        Self { keys }
    }

    /// The key store this cipher reads from.
    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }
}

impl FieldCipher for AesFieldCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let key = self.keys.current().map_err(|_| CipherError::KeyUnavailable)?;
        let field = encrypt_field(plaintext.as_bytes(), key.as_bytes())?;
        Ok(field.to_string())
    }

    fn decrypt(&self, envelope: &str) -> Result<String, CipherError> {
        let field: EncryptedField = envelope.parse()?;
        let key = self.keys.current().map_err(|_| CipherError::KeyUnavailable)?;
        let plaintext = decrypt_field(&field, key.as_bytes())?;
        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }
}
