//! Copy-on-write registry of sensitive fields, keyed by entity name.
//!
//! Backed by `arc-swap`: the interceptor reads the map on every operation
//! without locking, and the rare administrative add/remove swaps in a fresh
//! copy.

use std::{collections::HashMap, sync::Arc};

use arc_swap::ArcSwap;
use tracing::info;

use super::{FieldList, FieldMap, FieldRegistry};

/// Shared, lock-free [`FieldRegistry`].
///
/// Cloning is cheap and every clone observes the same map.
#[derive(Clone, Debug, Default)]
pub struct SharedRegistry {
    inner: Arc<ArcSwap<HashMap<String, FieldList>>>,
}

impl SharedRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded from `map`.
    pub fn from_map(map: FieldMap) -> Self {
        let registry = Self::new();
        registry.replace_all(map);
        registry
    }

    /// Number of entities with at least one registered field.
    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    /// Returns `true` if no entity has any registered field.
    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }

    /// Atomically replace the whole map.
    ///
    /// Duplicate field names keep their first position; entities with no
    /// fields are dropped.
    pub fn replace_all(&self, map: FieldMap) {
        let next: HashMap<String, FieldList> = map
            .into_iter()
            .filter_map(|(entity, fields)| {
                let mut ordered: Vec<String> = Vec::with_capacity(fields.len());
                for field in fields {
                    if !ordered.contains(&field) {
                        ordered.push(field);
                    }
                }
                (!ordered.is_empty()).then(|| (entity, FieldList::from(ordered)))
            })
            .collect();
        self.inner.store(Arc::new(next));
    }

    fn contains(&self, entity: &str, field: &str) -> bool {
        self.inner
            .load()
            .get(entity)
            .is_some_and(|fields| fields.iter().any(|f| f == field))
    }
}

impl FieldRegistry for SharedRegistry {
    fn get_fields(&self, entity: &str) -> FieldList {
        self.inner
            .load()
            .get(entity)
            .cloned()
            .unwrap_or_else(|| FieldList::from(Vec::new()))
    }

    fn add_field(&self, entity: &str, field: &str) -> bool {
        if self.contains(entity, field) {
            return false;
        }
        let previous = self.inner.rcu(|current| {
            let mut next = (**current).clone();
            let mut fields = next.get(entity).map(|f| f.to_vec()).unwrap_or_default();
            if !fields.iter().any(|f| f == field) {
                fields.push(field.to_owned());
            }
            next.insert(entity.to_owned(), fields.into());
            next
        });
        let added = !previous
            .get(entity)
            .is_some_and(|fields| fields.iter().any(|f| f == field));
        if added {
            info!(entity, field, "sensitive field registered");
        }
        added
    }

    fn remove_field(&self, entity: &str, field: &str) -> bool {
        if !self.contains(entity, field) {
            return false;
        }
        let previous = self.inner.rcu(|current| {
            let mut next = (**current).clone();
            if let Some(fields) = next.get(entity) {
                let remaining: Vec<String> =
                    fields.iter().filter(|f| *f != field).cloned().collect();
                if remaining.is_empty() {
                    next.remove(entity);
                } else {
                    next.insert(entity.to_owned(), remaining.into());
                }
            }
            next
        });
        let removed = previous
            .get(entity)
            .is_some_and(|fields| fields.iter().any(|f| f == field));
        if removed {
            info!(entity, field, "sensitive field unregistered");
        }
        removed
    }

    fn list_all(&self) -> FieldMap {
        self.inner
            .load()
            .iter()
            .map(|(entity, fields)| (entity.clone(), fields.to_vec()))
            .collect()
    }
}
