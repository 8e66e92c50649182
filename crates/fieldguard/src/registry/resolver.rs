//! Sensitive field resolution from OpenAPI schemas.
//!
//! Every schema under `components/schemas` is treated as an entity named after
//! its key. A top-level property is sensitive when it is annotated
//! `x-pii: true`, or when it is an object/array whose nested schema contains
//! such an annotation: the registry is flat, so the whole JSON value of that
//! property is encrypted.

use openapiv3::{OpenAPI, ReferenceOr, Schema, SchemaKind, Type};

use super::FieldMap;

/// Collect the sensitive top-level fields of every component schema.
///
/// Field order follows property declaration order. Schemas without sensitive
/// fields are omitted.
pub fn resolve_pii_fields(api: &OpenAPI) -> FieldMap {
    let mut out = FieldMap::new();

    let Some(components) = &api.components else {
        return out;
    };

    for (name, schema_ref) in &components.schemas {
        let ReferenceOr::Item(schema) = schema_ref else {
            continue;
        };
        let SchemaKind::Type(Type::Object(obj)) = &schema.schema_kind else {
            continue;
        };

        let fields: Vec<String> = obj
            .properties
            .iter()
            .filter_map(|(prop_name, prop_ref)| match prop_ref {
                ReferenceOr::Item(prop) if is_pii(prop) || contains_pii(prop) => {
                    Some(prop_name.clone())
                }
                _ => None,
            })
            .collect();

        if !fields.is_empty() {
            out.insert(name.clone(), fields);
        }
    }

    out
}

fn is_pii(schema: &Schema) -> bool {
    schema
        .schema_data
        .extensions
        .get("x-pii")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Whether any schema nested below `schema` is annotated `x-pii: true`.
fn contains_pii(schema: &Schema) -> bool {
    match &schema.schema_kind {
        SchemaKind::Type(Type::Object(obj)) => obj.properties.values().any(|prop| match prop {
            ReferenceOr::Item(prop) => is_pii(prop) || contains_pii(prop),
            ReferenceOr::Reference { .. } => false,
        }),
        SchemaKind::Type(Type::Array(arr)) => match &arr.items {
            Some(ReferenceOr::Item(items)) => is_pii(items) || contains_pii(items),
            _ => false,
        },
        _ => false,
    }
}
