//! Entity references.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json_bytes::Value as JsonValue;

/// The reserved cache-marker field name used when the store is constructed
/// without an explicit override.
pub const DEFAULT_CACHE_KEY_FIELD: &str = "__cache_key";

/// The reserved marker naming the synthetic root record that every query's
/// top-level response is written under.
pub const ROOT_MARKER: &str = "root";

/// An opaque identifier for a stored entity.
///
/// `Keyed` is the normal case: a pair of an identifying field name (already
/// namespaced by typename, e.g. `"Person/id"`) and its value. `Synthetic` is
/// the path-derived marker assigned to sub-records with no identifying
/// field, including the reserved root record (`Synthetic("root")`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityReference {
    Keyed { id_attr: String, value: JsonValue },
    Synthetic(String),
}

impl EntityReference {
    pub fn root() -> Self {
        EntityReference::Synthetic(ROOT_MARKER.to_string())
    }

    pub fn keyed(id_attr: impl Into<String>, value: JsonValue) -> Self {
        EntityReference::Keyed { id_attr: id_attr.into(), value }
    }

    pub fn synthetic(path: impl Into<String>) -> Self {
        EntityReference::Synthetic(path.into())
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityReference::Keyed { id_attr, value } => {
                write!(f, "{id_attr}:{value}")
            }
            EntityReference::Synthetic(path) => write!(f, "${path}"),
        }
    }
}
