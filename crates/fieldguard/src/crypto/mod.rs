//! AES-256-GCM-SIV field encryption primitives.
//!
//! This module is free of storage and HTTP dependencies. It provides the
//! low-level encrypt/decrypt operations and the [`FieldCipher`] seam the
//! transformer and interceptor are written against.
//!
//! # Ciphertext format
//!
//! ```text
//! v1.<base64url-no-pad(nonce)>.<base64url-no-pad(ciphertext+tag)>
//! ```
//!
//! The `v1` prefix enables future algorithm or key-version migration without
//! breaking existing ciphertext.

pub mod cipher;
pub mod field_cipher;

pub use cipher::{is_encrypted, CipherError, EncryptedField, KEY_LEN};
pub use field_cipher::{AesFieldCipher, FieldCipher};
