//! Per-record encryption and decryption of registered fields.
//!
//! All functions are synchronous and work on owned records, so a pre-hook has
//! fully produced its payload before any storage call is made.
//!
//! Write path (fail closed):
//! - null and absent values pass through untouched and never reach the cipher;
//! - JSON objects and arrays are serialised, then encrypted;
//! - strings are encrypted unless they already carry an envelope, which makes
//!   a second pass over encrypted data a no-op;
//! - numbers and booleans are rejected, since storing them as ciphertext would
//!   silently change their type on the way back.
//!
//! Read path (fail open, per field): envelopes are decrypted, JSON containers
//! are parsed back, and a field that fails to decrypt is resolved by the
//! deployment's [`DecryptFailurePolicy`] without affecting other fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::crypto::{CipherError, FieldCipher};
use crate::engine::Record;

/// Keys that mark an update value as an operator object rather than a plain
/// JSON value. Only `set` carries a value worth encrypting.
pub const UPDATE_OPERATORS: &[&str] = &[
    "set",
    "increment",
    "decrement",
    "multiply",
    "divide",
    "push",
    "unset",
];

/// What to return for a field whose ciphertext cannot be decrypted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptFailurePolicy {
    /// Return the stored envelope unchanged.
    ///
    /// A caller that writes the record back re-persists the envelope as is,
    /// because it is already encrypted.
    #[default]
    KeepCiphertext,
    /// Return `null` for the field.
    Null,
}

impl DecryptFailurePolicy {
    /// Configuration spelling of the policy.
    pub fn as_str(self) -> &'static str {
        match self {
            DecryptFailurePolicy::KeepCiphertext => "keep_ciphertext",
            DecryptFailurePolicy::Null => "null",
        }
    }

    /// Log label of the degraded value a failing field ends up with.
    pub fn outcome(self) -> &'static str {
        match self {
            DecryptFailurePolicy::KeepCiphertext => "kept_ciphertext",
            DecryptFailurePolicy::Null => "nulled",
        }
    }
}

/// Write-path failures. Any of these aborts the write.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to encrypt field `{field}`: {source}")]
    Encrypt { field: String, source: CipherError },

    #[error("failed to serialise JSON field `{field}`: {source}")]
    Serialize {
        field: String,
        source: serde_json::Error,
    },

    #[error("field `{field}` holds a {kind}; only strings and JSON objects or arrays can be encrypted")]
    UnsupportedValue { field: String, kind: &'static str },
}

/// A registered field that failed to decrypt on the read path.
#[derive(Debug)]
pub struct DecryptFailure {
    pub field: String,
    /// Policy that decided the field's returned value.
    pub policy: DecryptFailurePolicy,
    pub error: CipherError,
}

/// Encrypt the registered `fields` of `record`.
///
/// # Errors
///
/// Returns a [`TransformError`] for the first field that cannot be encrypted;
/// the partially transformed record is dropped.
pub fn encrypt_record(
    cipher: &dyn FieldCipher,
    mut record: Record,
    fields: &[String],
) -> Result<Record, TransformError> {
    for field in fields {
        if let Some(value) = record.get_mut(field.as_str()) {
            let plain = value.take();
            *value = encrypt_value(cipher, field, plain)?;
        }
    }
    Ok(record)
}

/// Encrypt the registered `fields` of an update payload.
///
/// A field given as an operator object (every key in [`UPDATE_OPERATORS`],
/// e.g. `{ "set": "x", "increment": 1 }`) has only its `set` value encrypted;
/// the other operators are left as they are. Any other value is encrypted
/// exactly as [`encrypt_record`] would.
///
/// # Errors
///
/// Same as [`encrypt_record`].
pub fn process_update_payload(
    cipher: &dyn FieldCipher,
    mut data: Record,
    fields: &[String],
) -> Result<Record, TransformError> {
    for field in fields {
        let Some(value) = data.get_mut(field.as_str()) else {
            continue;
        };
        match value {
            Value::Object(ops) if is_update_operator(ops) => {
                if let Some(set) = ops.get_mut("set") {
                    let plain = set.take();
                    *set = encrypt_value(cipher, field, plain)?;
                }
            }
            _ => {
                let plain = value.take();
                *value = encrypt_value(cipher, field, plain)?;
            }
        }
    }
    Ok(data)
}

/// Decrypt the registered `fields` of a record returned by storage.
///
/// Never fails: each field that cannot be decrypted is resolved by `policy`
/// and logged once, naming the entity, field, and outcome.
pub fn decrypt_record(
    cipher: &dyn FieldCipher,
    entity: &str,
    mut record: Record,
    fields: &[String],
    policy: DecryptFailurePolicy,
) -> Record {
    for failure in decrypt_in_place(cipher, &mut record, fields, policy) {
        error!(
            entity,
            field = %failure.field,
            outcome = failure.policy.outcome(),
            error = %failure.error,
            "field decryption failed; returning degraded value"
        );
    }
    record
}

/// Decrypt the registered `fields` of `record` in place, returning the
/// fields that failed.
///
/// Values that are not envelope strings (null, legacy plaintext, numbers)
/// are left unchanged.
pub fn decrypt_in_place(
    cipher: &dyn FieldCipher,
    record: &mut Record,
    fields: &[String],
    policy: DecryptFailurePolicy,
) -> Vec<DecryptFailure> {
    let mut failures = Vec::new();
    for field in fields {
        let Some(value) = record.get_mut(field.as_str()) else {
            continue;
        };
        let decrypted = match &*value {
            Value::String(stored) if cipher.is_encrypted(stored) => cipher.decrypt(stored),
            _ => continue,
        };
        match decrypted {
            Ok(plaintext) => *value = restore_json(field, plaintext),
            Err(error) => {
                if policy == DecryptFailurePolicy::Null {
                    *value = Value::Null;
                }
                failures.push(DecryptFailure {
                    field: field.clone(),
                    policy,
                    error,
                });
            }
        }
    }
    failures
}

/// Whether `map` is an update-operator object such as `{ "set": .. }`.
pub fn is_update_operator(map: &serde_json::Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| UPDATE_OPERATORS.contains(&k.as_str()))
}

fn encrypt_value(
    cipher: &dyn FieldCipher,
    field: &str,
    value: Value,
) -> Result<Value, TransformError> {
    let plaintext = match value {
        Value::Null => return Ok(Value::Null),
        Value::String(s) if cipher.is_encrypted(&s) => return Ok(Value::String(s)),
        Value::String(s) => s,
        json @ (Value::Object(_) | Value::Array(_)) => {
            serde_json::to_string(&json).map_err(|source| TransformError::Serialize {
                field: field.to_owned(),
                source,
            })?
        }
        Value::Bool(_) => return Err(unsupported(field, "boolean")),
        Value::Number(_) => return Err(unsupported(field, "number")),
    };

    cipher
        .encrypt(&plaintext)
        .map(Value::String)
        .map_err(|source| TransformError::Encrypt {
            field: field.to_owned(),
            source,
        })
}

fn unsupported(field: &str, kind: &'static str) -> TransformError {
    TransformError::UnsupportedValue {
        field: field.to_owned(),
        kind,
    }
}

fn restore_json(field: &str, plaintext: String) -> Value {
    if !(plaintext.starts_with('{') || plaintext.starts_with('[')) {
        return Value::String(plaintext);
    }
    match serde_json::from_str::<Value>(&plaintext) {
        Ok(json) => json,
        Err(_) => {
            debug!(field, "plaintext looks like JSON but does not parse; keeping string");
            Value::String(plaintext)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::{record, test_cipher, tamper, CountingCipher, FailingCipher};
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn encrypts_only_registered_fields() {
        let cipher = test_cipher();
        let input = record(json!({"id": 1, "name": "Ada", "phone": "+1-555-0100"}));
        let out = encrypt_record(&cipher, input, &fields(&["phone"])).unwrap();
        assert_eq!(out["name"], "Ada");
        assert_eq!(out["id"], 1);
        let phone = out["phone"].as_str().unwrap();
        assert_ne!(phone, "+1-555-0100");
        assert!(cipher.is_encrypted(phone));
    }

    #[test]
    fn round_trip_restores_plaintext() {
        let cipher = test_cipher();
        let f = fields(&["phone", "email"]);
        let input = record(json!({"phone": "+1-555-0100", "email": "ada@example.com"}));
        let encrypted = encrypt_record(&cipher, input.clone(), &f).unwrap();
        let decrypted =
            decrypt_record(&cipher, "Client", encrypted, &f, DecryptFailurePolicy::default());
        assert_eq!(decrypted, input);
    }

    #[test]
    fn encrypting_twice_is_a_no_op() {
        let cipher = test_cipher();
        let f = fields(&["phone", "profile"]);
        let input = record(json!({"phone": "+1-555-0100", "profile": {"dob": "1990-01-01"}}));
        let once = encrypt_record(&cipher, input, &f).unwrap();
        let twice = encrypt_record(&cipher, once.clone(), &f).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_field_list_is_passthrough() {
        let cipher = CountingCipher::new();
        let input = record(json!({"phone": "+1-555-0100", "meta": {"a": [1, 2]}}));
        let encrypted = encrypt_record(&cipher, input.clone(), &[]).unwrap();
        assert_eq!(encrypted, input);
        let decrypted =
            decrypt_record(&cipher, "Client", input.clone(), &[], DecryptFailurePolicy::Null);
        assert_eq!(decrypted, input);
        assert_eq!(cipher.encrypts.load(Ordering::SeqCst), 0);
        assert_eq!(cipher.decrypts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn null_and_absent_values_never_reach_the_cipher() {
        let cipher = CountingCipher::new();
        let f = fields(&["phone", "email"]);
        let input = record(json!({"phone": null, "name": "Ada"}));
        let encrypted = encrypt_record(&cipher, input.clone(), &f).unwrap();
        assert_eq!(encrypted, input);
        let decrypted =
            decrypt_record(&cipher, "Client", encrypted, &f, DecryptFailurePolicy::default());
        assert_eq!(decrypted, input);
        assert!(!decrypted.contains_key("email"));
        assert_eq!(cipher.encrypts.load(Ordering::SeqCst), 0);
        assert_eq!(cipher.decrypts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn json_fields_round_trip_to_equal_values() {
        let cipher = test_cipher();
        let f = fields(&["address", "tags"]);
        let input = record(json!({
            "address": {"street": "1 Main St", "zip": "90210", "geo": [34.1, -118.4]},
            "tags": ["vip", {"since": 2020}]
        }));
        let encrypted = encrypt_record(&cipher, input.clone(), &f).unwrap();
        assert!(encrypted["address"].is_string());
        assert!(encrypted["tags"].is_string());
        let decrypted =
            decrypt_record(&cipher, "Lead", encrypted, &f, DecryptFailurePolicy::default());
        assert_eq!(decrypted, input);
    }

    #[test]
    fn bracketed_text_that_is_not_json_stays_a_string() {
        let cipher = test_cipher();
        let f = fields(&["note"]);
        let input = record(json!({"note": "[draft] call back {after 5pm"}));
        let encrypted = encrypt_record(&cipher, input.clone(), &f).unwrap();
        let decrypted =
            decrypt_record(&cipher, "Lead", encrypted, &f, DecryptFailurePolicy::default());
        assert_eq!(decrypted, input);
    }

    #[test]
    fn numbers_and_booleans_are_rejected() {
        let cipher = test_cipher();
        let err = encrypt_record(&cipher, record(json!({"pin": 1234})), &fields(&["pin"]))
            .unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedValue { kind: "number", .. }));
        let err = encrypt_record(&cipher, record(json!({"pin": true})), &fields(&["pin"]))
            .unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedValue { kind: "boolean", .. }));
    }

    #[test]
    fn cipher_failure_aborts_encryption() {
        let err = encrypt_record(
            &FailingCipher,
            record(json!({"phone": "+1-555-0100"})),
            &fields(&["phone"]),
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::Encrypt { ref field, .. } if field == "phone"));
    }

    #[test]
    fn update_operator_only_encrypts_set() {
        let cipher = test_cipher();
        let data = record(json!({"balance": {"set": "secret", "increment": 1}}));
        let out = process_update_payload(&cipher, data, &fields(&["balance"])).unwrap();
        let ops = out["balance"].as_object().unwrap();
        assert!(cipher.is_encrypted(ops["set"].as_str().unwrap()));
        assert_eq!(cipher.decrypt(ops["set"].as_str().unwrap()).unwrap(), "secret");
        assert_eq!(ops["increment"], 1);
    }

    #[test]
    fn update_operators_without_set_are_untouched() {
        let cipher = CountingCipher::new();
        let data = record(json!({"phone": {"unset": true}, "tags": {"push": "x"}}));
        let out =
            process_update_payload(&cipher, data.clone(), &fields(&["phone", "tags"])).unwrap();
        assert_eq!(out, data);
        assert_eq!(cipher.encrypts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn update_set_null_passes_through() {
        let cipher = test_cipher();
        let data = record(json!({"phone": {"set": null}}));
        let out = process_update_payload(&cipher, data.clone(), &fields(&["phone"])).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn update_plain_values_and_json_objects_are_encrypted_whole() {
        let cipher = test_cipher();
        let data = record(json!({
            "phone": "+1-555-0199",
            "address": {"street": "2 Side St"},
            "status": "active"
        }));
        let out =
            process_update_payload(&cipher, data, &fields(&["phone", "address"])).unwrap();
        assert!(cipher.is_encrypted(out["phone"].as_str().unwrap()));
        assert!(cipher.is_encrypted(out["address"].as_str().unwrap()));
        assert_eq!(out["status"], "active");
    }

    #[test]
    fn update_payload_is_idempotent() {
        let cipher = test_cipher();
        let f = fields(&["phone", "email"]);
        let data = record(json!({"phone": {"set": "+1"}, "email": "a@b.c"}));
        let once = process_update_payload(&cipher, data, &f).unwrap();
        let twice = process_update_payload(&cipher, once.clone(), &f).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn operator_detection_requires_operator_keys_only() {
        let op = json!({"set": 1, "increment": 2});
        let mixed = json!({"set": 1, "street": "x"});
        assert!(is_update_operator(op.as_object().unwrap()));
        assert!(!is_update_operator(mixed.as_object().unwrap()));
        assert!(!is_update_operator(&serde_json::Map::new()));
    }

    #[test]
    fn corrupt_field_keeps_ciphertext_under_default_policy() {
        let cipher = test_cipher();
        let f = fields(&["phone", "email"]);
        let mut stored = encrypt_record(
            &cipher,
            record(json!({"phone": "+1-555-0100", "email": "ada@example.com"})),
            &f,
        )
        .unwrap();
        let corrupted = tamper(stored["phone"].as_str().unwrap());
        stored.insert("phone".into(), Value::String(corrupted.clone()));

        let failures =
            decrypt_in_place(&cipher, &mut stored, &f, DecryptFailurePolicy::KeepCiphertext);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].field, "phone");
        assert_eq!(stored["phone"], corrupted.as_str());
        assert_eq!(stored["email"], "ada@example.com");
    }

    #[test]
    fn corrupt_field_is_nulled_under_null_policy() {
        let cipher = test_cipher();
        let f = fields(&["phone"]);
        let mut stored =
            encrypt_record(&cipher, record(json!({"phone": "+1-555-0100"})), &f).unwrap();
        let corrupted = tamper(stored["phone"].as_str().unwrap());
        stored.insert("phone".into(), Value::String(corrupted));

        let failures = decrypt_in_place(&cipher, &mut stored, &f, DecryptFailurePolicy::Null);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].policy.outcome(), "nulled");
        assert!(stored["phone"].is_null());
    }

    #[test]
    fn legacy_plaintext_is_returned_as_is() {
        let cipher = CountingCipher::new();
        let f = fields(&["phone"]);
        let input = record(json!({"phone": "+1-555-0100"}));
        let out = decrypt_record(&cipher, "Client", input.clone(), &f, DecryptFailurePolicy::Null);
        assert_eq!(out, input);
        assert_eq!(cipher.decrypts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn policy_spellings() {
        let policy: DecryptFailurePolicy = serde_json::from_str("\"null\"").unwrap();
        assert_eq!(policy, DecryptFailurePolicy::Null);
        assert_eq!(DecryptFailurePolicy::default().as_str(), "keep_ciphertext");
        assert_eq!(DecryptFailurePolicy::KeepCiphertext.outcome(), "kept_ciphertext");
    }
}
