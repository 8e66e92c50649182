//! Field registry: which fields of which entities are encrypted at rest.
//!
//! # Responsibilities
//!
//! - Hold the entity → ordered sensitive-field mapping behind [`FieldRegistry`].
//! - Seed it at startup from a field-map file, either a plain
//!   `{ Entity: [field, ...] }` document or an OpenAPI document whose schema
//!   properties carry `x-pii: true`.
//!
//! # Precondition
//!
//! Registered fields must never appear in filter predicates, unique
//! constraints, or foreign keys. Their stored value is randomised ciphertext,
//! so equality lookups against them cannot match.

pub mod resolver;
pub mod shared;

pub use shared::SharedRegistry;

use std::{collections::BTreeMap, path::Path, sync::Arc};

use anyhow::{Context, Result};
use openapiv3::OpenAPI;
use tracing::info;

/// Ordered list of sensitive field names for one entity.
pub type FieldList = Arc<[String]>;

/// Snapshot of the whole registry.
pub type FieldMap = BTreeMap<String, Vec<String>>;

/// Lookup and administration of sensitive fields.
///
/// The interceptor holds this as `Arc<dyn FieldRegistry>` and consults it on
/// every operation.
#[cfg_attr(test, mockall::automock)]
pub trait FieldRegistry: Send + Sync {
    /// Sensitive fields of `entity`; empty if the entity is not configured.
    fn get_fields(&self, entity: &str) -> FieldList;

    /// Register `field` on `entity`. Returns `false` if it was already present.
    fn add_field(&self, entity: &str, field: &str) -> bool;

    /// Unregister `field` from `entity`. Returns `false` if it was not present.
    fn remove_field(&self, entity: &str, field: &str) -> bool;

    /// Snapshot of every entity and its fields.
    fn list_all(&self) -> FieldMap;
}

/// Read a field-map file and parse it with [`parse_field_map`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_file(path: impl AsRef<Path>) -> Result<FieldMap> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read field map {}", path.display()))?;
    let map = parse_field_map(&text)
        .with_context(|| format!("failed to parse field map {}", path.display()))?;
    info!(
        path = %path.display(),
        entities = map.len(),
        fields = map.values().map(Vec::len).sum::<usize>(),
        "field map loaded"
    );
    Ok(map)
}

/// Parse a field-map document.
///
/// Accepts, as YAML or JSON, either a plain `{ Entity: [field, ...] }` map or
/// an OpenAPI document (see [`resolver::resolve_pii_fields`]).
///
/// # Errors
///
/// Returns an error if the text matches neither shape.
pub fn parse_field_map(text: &str) -> Result<FieldMap> {
    if let Ok(map) = serde_yaml::from_str::<FieldMap>(text) {
        return Ok(map);
    }
    if let Ok(map) = serde_json::from_str::<FieldMap>(text) {
        return Ok(map);
    }

    let api: OpenAPI = if let Ok(parsed) = serde_yaml::from_str(text) {
        parsed
    } else if let Ok(parsed) = serde_json::from_str(text) {
        parsed
    } else {
        anyhow::bail!("not a field map or OpenAPI document (tried YAML and JSON)");
    };
    Ok(resolver::resolve_pii_fields(&api))
}
