//! The polymorphic field-value sum type.
//!
//! A record field is one of: a primitive, a single entity reference, a
//! homogeneous list (of references or of primitives), or a map (either a
//! reference-valued map or a plain map of primitives — both are represented
//! as `Map` here; nothing downstream needs to distinguish the two once
//! normalization has run, since both are just nested field-value maps).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json_bytes::Value as JsonValue;

use crate::reference::EntityReference;

/// An entity record: a mapping from field-key to field-value. Backed by
/// `IndexMap` so field order survives a write/read round-trip — a stronger
/// guarantee than strictly required, but order-preservation costs nothing
/// and the teacher's own `serde_json_bytes`/`indexmap` combination makes it
/// free.
pub type Record = IndexMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum FieldValue {
    /// A scalar: string, number, boolean, or null.
    Primitive(JsonValue),
    /// A reference to another entity record in the store.
    Reference(EntityReference),
    /// A homogeneous sequence: every element is a `Reference` or every
    /// element is a non-reference `FieldValue`. Mixed lists never arise from
    /// normalization: the writer walks response arrays elementwise and each
    /// element goes through the same entity-or-not classification, which is
    /// uniform across a GraphQL list field.
    List(Vec<FieldValue>),
    /// A sub-map, either of entity references or of primitives.
    /// Distinguishing the two is unnecessary: a reader recursing into a
    /// `Map` entry just inspects its values.
    Map(IndexMap<String, FieldValue>),
}

