//! Reader / Pull.
//!
//! Converts an operation into a selection-shaped pull pattern (reusing the
//! Selection Walker's annotated selections directly — they already carry
//! everything a pull step needs: the field-key to look up, the response key
//! to emit under, and the nested pattern for composite selections) and
//! denormalizes a response tree back out of the store.

use serde_json_bytes::{Map as JsonMap, Value as JsonValue};

use crate::context::OperationContext;
use crate::error::PullError;
use crate::reference::EntityReference;
use crate::store::Snapshot;
use crate::value::{FieldValue, Record};
use crate::walker::{walk, AnnotatedSelection};

/// Reads `reference` out of `snapshot` following `pattern`. Returns `None`
/// if the root entity itself is absent; a present root with some missing
/// requested fields yields `Some` with those fields omitted, not an error.
pub fn pull(
    snapshot: &Snapshot,
    pattern: &[AnnotatedSelection],
    reference: &EntityReference,
) -> Result<Option<JsonValue>, PullError> {
    match snapshot.get(reference) {
        None => Ok(None),
        Some(record) => Ok(Some(pull_record(snapshot, pattern, record)?)),
    }
}

/// Same as [`pull`] but starting from a record already in hand (used by the
/// mutation flow to read back the operation's own top-level fields — see
/// `writer::write`, which always returns that record alongside the new
/// snapshot).
pub fn pull_from_record(
    snapshot: &Snapshot,
    pattern: &[AnnotatedSelection],
    record: &Record,
) -> Result<JsonValue, PullError> {
    pull_record(snapshot, pattern, record)
}

/// Builds the pull pattern for `operation`: just the root-level annotated
/// selections produced by the Selection Walker.
pub fn pull_pattern(ctx: &OperationContext<'_>) -> Result<Vec<AnnotatedSelection>, PullError> {
    let mut paths = walk(&ctx.operation.selection_set, ctx)?;
    Ok(paths.swap_remove(&Vec::new()).unwrap_or_default())
}

/// Recovers the typename a record's fields were namespaced under, by
/// inspecting any stored key of the form `<Typename>/field`. Records with no
/// identifying field (synthetic-marker records) were never namespaced and
/// yield `None`.
fn record_typename<'a>(record: &'a Record, cache_key_field: &str) -> Option<&'a str> {
    record.keys().find_map(|k| {
        if k == cache_key_field {
            return None;
        }
        k.split_once('/').map(|(typename, _)| typename)
    })
}

fn pull_record(
    snapshot: &Snapshot,
    pattern: &[AnnotatedSelection],
    record: &Record,
) -> Result<JsonValue, PullError> {
    let typename = record_typename(record, &snapshot.cache_key_field);
    let mut out = JsonMap::new();
    for selection in pattern {
        if selection.field_name == "__typename" {
            if let Some(typename) = typename {
                out.insert(selection.response_key(), JsonValue::String(typename.into()));
            }
            continue;
        }
        let value = record.get(&selection.field_key).or_else(|| {
            typename.and_then(|t| record.get(&format!("{t}/{}", selection.field_key)))
        });
        let Some(value) = value else {
            continue;
        };
        let resolved = pull_value(snapshot, selection, value)?;
        out.insert(selection.response_key(), resolved);
    }
    Ok(JsonValue::Object(out))
}

fn pull_value(
    snapshot: &Snapshot,
    selection: &AnnotatedSelection,
    value: &FieldValue,
) -> Result<JsonValue, PullError> {
    if selection.is_leaf() {
        return leaf_to_json(selection, value);
    }
    match value {
        FieldValue::Reference(reference) => match snapshot.get(reference) {
            None => Ok(JsonValue::Null),
            Some(record) => pull_record(snapshot, &selection.children, record),
        },
        FieldValue::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    FieldValue::Reference(reference) => match snapshot.get(reference) {
                        None => out.push(JsonValue::Null),
                        Some(record) => out.push(pull_record(snapshot, &selection.children, record)?),
                    },
                    _ => {
                        return Err(PullError::NotAReference {
                            path: selection.namespaced_key.clone(),
                            field: selection.field_name.clone(),
                        })
                    }
                }
            }
            Ok(JsonValue::Array(out))
        }
        FieldValue::Primitive(JsonValue::Null) => Ok(JsonValue::Null),
        _ => Err(PullError::NotAReference {
            path: selection.namespaced_key.clone(),
            field: selection.field_name.clone(),
        }),
    }
}

fn leaf_to_json(selection: &AnnotatedSelection, value: &FieldValue) -> Result<JsonValue, PullError> {
    match value {
        FieldValue::Primitive(v) => Ok(v.clone()),
        FieldValue::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(leaf_to_json(selection, item)?);
            }
            Ok(JsonValue::Array(out))
        }
        FieldValue::Map(map) => {
            let mut out = JsonMap::new();
            for (k, v) in map {
                out.insert(k.as_str(), leaf_to_json(selection, v)?);
            }
            Ok(JsonValue::Object(out))
        }
        FieldValue::Reference(_) => Err(PullError::NotAReference {
            path: selection.namespaced_key.clone(),
            field: selection.field_name.clone(),
        }),
    }
}
