//! Entity Store.
//!
//! A flat mapping from entity reference to entity record, with merge-on-write
//! semantics. The store is immutable from the outside: every write produces
//! a new [`Snapshot`]; [`Store`] holds the current one behind a
//! `parking_lot::RwLock` so install/read never suspends — the lock is real,
//! since several tasks may call concurrently, but the critical section is
//! only a pointer swap.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use crate::reference::{EntityReference, DEFAULT_CACHE_KEY_FIELD};
use crate::value::{FieldValue, Record};

/// Construction-time configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Field names (already namespaced by typename, e.g. `"Person/id"`)
    /// treated as identifying fields for normalization.
    pub id_attrs: IndexSet<String>,
    /// Symbolic name of the reserved cache-marker field.
    pub cache_key_field: String,
    /// Initial entity map.
    pub entities: IndexMap<EntityReference, Record>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            id_attrs: IndexSet::new(),
            cache_key_field: DEFAULT_CACHE_KEY_FIELD.to_string(),
            entities: IndexMap::new(),
        }
    }
}

/// An immutable point-in-time view of the store.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id_attrs: IndexSet<String>,
    pub cache_key_field: String,
    entities: IndexMap<EntityReference, Record>,
}

impl Snapshot {
    pub fn get(&self, reference: &EntityReference) -> Option<&Record> {
        self.entities.get(reference)
    }

    pub fn contains(&self, reference: &EntityReference) -> bool {
        self.entities.contains_key(reference)
    }

    /// True if `attr` (a typename-namespaced field name, e.g. `"Person/id"`)
    /// is configured as an identifying field.
    pub fn is_id_attr(&self, attr: &str) -> bool {
        self.id_attrs.contains(attr)
    }

    /// Produces a new snapshot with `entities` merged in, key-wise
    /// last-writer-wins at the field level.
    pub fn merged(&self, entities: impl IntoIterator<Item = (EntityReference, Record)>) -> Self {
        let mut next = self.entities.clone();
        for (reference, fields) in entities {
            match next.get_mut(&reference) {
                Some(existing) => {
                    for (field_key, value) in fields {
                        existing.insert(field_key, value);
                    }
                }
                None => {
                    next.insert(reference, fields);
                }
            }
        }
        Self { id_attrs: self.id_attrs.clone(), cache_key_field: self.cache_key_field.clone(), entities: next }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

/// Holds the current snapshot behind an atomic cell.
pub struct Store {
    current: RwLock<Arc<Snapshot>>,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        let snapshot = Snapshot {
            id_attrs: config.id_attrs,
            cache_key_field: config.cache_key_field,
            entities: config.entities,
        };
        Self { current: RwLock::new(Arc::new(snapshot)) }
    }

    /// Takes the current snapshot by value (an `Arc` clone — cheap, and safe
    /// to hold across an `.await` since it is immutable).
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Atomically replaces the current snapshot with a new one.
    pub fn install(&self, snapshot: Arc<Snapshot>) {
        *self.current.write() = snapshot;
    }

    /// Merges `entities` into the current snapshot and installs the result,
    /// returning the new snapshot. Two concurrent callers race; the later
    /// `install` wins field-by-field on overlapping entities.
    pub fn merge(&self, entities: impl IntoIterator<Item = (EntityReference, Record)>) -> Arc<Snapshot> {
        let current = self.snapshot();
        let next = Arc::new(current.merged(entities));
        self.install(next.clone());
        next
    }
}
