//! Writer.
//!
//! Merges a server response into the store in two passes: a selection-driven
//! **field rewrite** (renames response keys to field-keys, namespaces
//! typed sub-records, attaches cache markers) followed by a data-driven
//! **normalize** pass that splits the rewritten tree into flat entity
//! records and their cross-references.
//!
//! Children must be rewritten before their parent references them; a
//! recursive-descent rewrite (process a selection's children before
//! returning its own rewritten value) gets that ordering for free, which is
//! the idiom the teacher's own `apollo-federation::operation` module uses
//! for selection-set traversal.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde_json_bytes::{ByteString, Map as JsonMap, Value as JsonValue};

use crate::ast::Directive;
use crate::context::OperationContext;
use crate::error::WriteError;
use crate::reference::{EntityReference, ROOT_MARKER};
use crate::store::{Snapshot, Store};
use crate::value::{FieldValue, Record};
use crate::walker::{walk, AnnotatedSelection};

struct WriteCtx<'a> {
    id_attrs: &'a IndexSet<String>,
    cache_key_field: &'a str,
    op_ctx: &'a OperationContext<'a>,
}

/// Writes `response` into `store`, returning the new snapshot and the
/// operation's own top-level record (field-key → field-value), which is
/// always the root record after this write: the root marker is attached for
/// every operation, not only queries, so the mutation flow's read-back has
/// something to read from.
pub fn write(
    store: &Store,
    response: JsonValue,
    ctx: &OperationContext<'_>,
) -> Result<(Arc<Snapshot>, Record), WriteError> {
    let current = store.snapshot();
    let write_ctx = WriteCtx { id_attrs: &current.id_attrs, cache_key_field: &current.cache_key_field, op_ctx: ctx };

    let mut paths = walk(&ctx.operation.selection_set, ctx)?;
    let root_selections = paths.swap_remove(&Vec::new()).unwrap_or_default();

    let response_map = match response {
        JsonValue::Object(map) => map,
        JsonValue::Null => JsonMap::new(),
        _ => JsonMap::new(),
    };

    let rewritten = rewrite_record(response_map, &root_selections, ROOT_MARKER, &write_ctx)?;

    let mut acc: IndexMap<EntityReference, Record> = IndexMap::new();
    normalize_value(JsonValue::Object(rewritten), ROOT_MARKER, &current, &mut acc)?;

    let new_snapshot = store.merge(acc);
    let root_reference = EntityReference::root();
    let top_record = new_snapshot.get(&root_reference).cloned().unwrap_or_default();
    Ok((new_snapshot, top_record))
}

fn is_excluded(directives: &[Directive], ctx: &OperationContext<'_>) -> bool {
    for directive in directives {
        let condition = directive
            .arguments
            .iter()
            .find(|arg| arg.name == "if")
            .map(|arg| ctx.resolve_value(&arg.value));
        let truthy = matches!(condition, Some(JsonValue::Bool(true)));
        match directive.name.as_str() {
            "include" if !truthy => return true,
            "skip" if truthy => return true,
            _ => {}
        }
    }
    false
}

/// Rewrites one response object into a field-keyed, typename-namespaced
/// record, attaching `marker` as the cache-marker field when the record
/// carries no identifying field.
fn rewrite_record(
    mut map: JsonMap<ByteString, JsonValue>,
    children: &[AnnotatedSelection],
    marker: &str,
    ctx: &WriteCtx<'_>,
) -> Result<JsonMap<ByteString, JsonValue>, WriteError> {
    let typename = map.get("__typename").and_then(|v| v.as_str()).map(str::to_string);
    map.remove("__typename");

    let mut out = JsonMap::new();
    for child in children {
        if is_excluded(&child.directives, ctx.op_ctx) {
            continue;
        }
        let response_key = child.response_key();
        let Some(raw) = map.remove(response_key) else {
            continue;
        };
        let rewritten_value = if child.is_leaf() {
            raw
        } else {
            rewrite_composite_value(raw, child, ctx)?
        };
        let final_key = match &typename {
            Some(t) => format!("{t}/{}", child.field_key),
            None => child.field_key.clone(),
        };
        out.insert(final_key.as_str(), rewritten_value);
    }

    let has_identity = out.iter().any(|(k, _)| ctx.id_attrs.contains(k.as_str()));
    if !has_identity {
        out.insert(ctx.cache_key_field, JsonValue::String(marker.to_string().into()));
    }
    Ok(out)
}

fn rewrite_composite_value(
    value: JsonValue,
    selection: &AnnotatedSelection,
    ctx: &WriteCtx<'_>,
) -> Result<JsonValue, WriteError> {
    match value {
        JsonValue::Null => Ok(JsonValue::Null),
        JsonValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let marker = format!("{}.{i}", selection.namespaced_key);
                out.push(rewrite_single_or_dict(item, selection, &marker, ctx)?);
            }
            Ok(JsonValue::Array(out))
        }
        JsonValue::Object(map) => {
            rewrite_single_or_dict(JsonValue::Object(map), selection, &selection.namespaced_key, ctx)
        }
        other => Ok(other),
    }
}

/// Distinguishes a normal single record (its keys match the selection's
/// children, or it carries `__typename`) from a "dict of records" whose
/// own keys are arbitrary and whose *values* are independently shaped like
/// the selection.
fn rewrite_single_or_dict(
    value: JsonValue,
    selection: &AnnotatedSelection,
    marker: &str,
    ctx: &WriteCtx<'_>,
) -> Result<JsonValue, WriteError> {
    match value {
        JsonValue::Null => Ok(JsonValue::Null),
        JsonValue::Object(map) => {
            let looks_like_record = map.is_empty()
                || map.iter().any(|(k, _)| {
                    k.as_str() == "__typename"
                        || selection.children.iter().any(|c| c.response_key() == k.as_str())
                });
            if looks_like_record {
                let rewritten = rewrite_record(map, &selection.children, marker, ctx)?;
                Ok(JsonValue::Object(rewritten))
            } else {
                let mut out = JsonMap::new();
                for (k, v) in map.into_iter() {
                    let nested_marker = format!("{marker}.{}", k.as_str());
                    let rewritten_v = rewrite_single_or_dict(v, selection, &nested_marker, ctx)?;
                    out.insert(k, rewritten_v);
                }
                Ok(JsonValue::Object(out))
            }
        }
        other => Ok(other),
    }
}

/// Phase B: splits the rewritten tree into flat entity records.
fn normalize_value(
    value: JsonValue,
    path: &str,
    snapshot: &Snapshot,
    acc: &mut IndexMap<EntityReference, Record>,
) -> Result<FieldValue, WriteError> {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<(String, FieldValue)> = Vec::with_capacity(map.len());
            let mut cache_marker: Option<String> = None;
            for (k, v) in map.into_iter() {
                let key = k.as_str().to_string();
                if key == snapshot.cache_key_field {
                    if let JsonValue::String(s) = &v {
                        cache_marker = Some(s.as_str().to_string());
                    }
                    continue;
                }
                let child_path = format!("{path}.{key}");
                let normalized = normalize_value(v, &child_path, snapshot, acc)?;
                entries.push((key, normalized));
            }

            let identity = entries.iter().find_map(|(k, v)| match v {
                FieldValue::Primitive(id_value) if snapshot.is_id_attr(k) => {
                    Some(EntityReference::keyed(k.clone(), id_value.clone()))
                }
                _ => None,
            });

            let reference = match identity.or_else(|| cache_marker.map(EntityReference::synthetic)) {
                Some(reference) => reference,
                None => {
                    let reference_count =
                        entries.iter().filter(|(_, v)| matches!(v, FieldValue::Reference(_))).count();
                    if reference_count > 0 && reference_count < entries.len() {
                        return Err(WriteError::MixedEntityMap { path: path.to_string() });
                    }
                    return Ok(FieldValue::Map(entries.into_iter().collect()));
                }
            };

            let record: Record = entries.into_iter().collect();
            match acc.get_mut(&reference) {
                Some(existing) => {
                    for (k, v) in record {
                        existing.insert(k, v);
                    }
                }
                None => {
                    acc.insert(reference.clone(), record);
                }
            }
            Ok(FieldValue::Reference(reference))
        }
        JsonValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let child_path = format!("{path}.{i}");
                out.push(normalize_value(item, &child_path, snapshot, acc)?);
            }
            Ok(FieldValue::List(out))
        }
        other => Ok(FieldValue::Primitive(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::store::StoreConfig;
    use indexmap::IndexMap as Im;
    use serde_json_bytes::Value as JsonValue;

    fn query(selection_set: Vec<Selection>) -> (Document, OperationDefinition) {
        let op = OperationDefinition {
            operation_type: OperationType::Query,
            name: None,
            variable_definitions: vec![],
            selection_set,
        };
        (Document::default(), op)
    }

    fn field(name: &str, alias: Option<&str>, args: Vec<Argument>, children: Vec<Selection>) -> Selection {
        Selection::Field(FieldSelection {
            name: name.into(),
            alias: alias.map(String::from),
            arguments: args,
            directives: vec![],
            selection_set: children,
        })
    }

    fn obj(pairs: Vec<(&str, JsonValue)>) -> JsonValue {
        let mut map = JsonMap::new();
        for (k, v) in pairs {
            map.insert(k, v);
        }
        JsonValue::Object(map)
    }

    #[test]
    fn scenario_a_basic_normalization() {
        let selection_set = vec![field(
            "viewer",
            None,
            vec![],
            vec![field("__typename", None, vec![], vec![]), field("id", None, vec![], vec![]), field("name", None, vec![], vec![])],
        )];
        let (doc, op) = query(selection_set);
        let ctx = OperationContext::new(&doc, &op, Im::new());

        let mut id_attrs = IndexSet::new();
        id_attrs.insert("Person/id".to_string());
        let store = Store::new(StoreConfig { id_attrs, ..StoreConfig::default() });

        let response = obj(vec![(
            "viewer",
            obj(vec![
                ("__typename", JsonValue::String("Person".into())),
                ("id", JsonValue::String("p1".into())),
                ("name", JsonValue::String("Ada".into())),
            ]),
        )]);

        let (snapshot, _top) = write(&store, response, &ctx).unwrap();
        let person_ref = EntityReference::keyed("Person/id", JsonValue::String("p1".into()));
        let person = snapshot.get(&person_ref).unwrap();
        assert_eq!(person.get("Person/name"), Some(&FieldValue::Primitive(JsonValue::String("Ada".into()))));

        let root = snapshot.get(&EntityReference::root()).unwrap();
        assert_eq!(root.get("viewer"), Some(&FieldValue::Reference(person_ref)));
    }

    #[test]
    fn scenario_c_list_with_non_entity_elements_gets_indexed_markers() {
        let selection_set =
            vec![field("items", None, vec![], vec![field("label", None, vec![], vec![])])];
        let (doc, op) = query(selection_set);
        let ctx = OperationContext::new(&doc, &op, Im::new());
        let store = Store::new(StoreConfig::default());

        let response = obj(vec![(
            "items",
            JsonValue::Array(vec![
                obj(vec![("label", JsonValue::String("a".into()))]),
                obj(vec![("label", JsonValue::String("b".into()))]),
            ]),
        )]);

        let (snapshot, _top) = write(&store, response, &ctx).unwrap();
        let item0 = snapshot.get(&EntityReference::synthetic("root.items.0")).unwrap();
        assert_eq!(item0.get("label"), Some(&FieldValue::Primitive(JsonValue::String("a".into()))));
        let item1 = snapshot.get(&EntityReference::synthetic("root.items.1")).unwrap();
        assert_eq!(item1.get("label"), Some(&FieldValue::Primitive(JsonValue::String("b".into()))));
    }

    #[test]
    fn scenario_d_alias_stored_under_field_key() {
        let selection_set =
            vec![field("viewer", Some("me"), vec![], vec![field("name", None, vec![], vec![])])];
        let (doc, op) = query(selection_set);
        let ctx = OperationContext::new(&doc, &op, Im::new());
        let store = Store::new(StoreConfig::default());

        let response = obj(vec![("me", obj(vec![("name", JsonValue::String("Ada".into()))]))]);
        let (snapshot, _top) = write(&store, response, &ctx).unwrap();
        let root = snapshot.get(&EntityReference::root()).unwrap();
        assert!(root.contains_key("viewer"));
    }

    #[test]
    fn scenario_b_argument_qualified_fields_coexist() {
        let selection_set = |id: &str| {
            vec![field(
                "user",
                None,
                vec![Argument { name: "id".into(), value: Value::String(id.into()) }],
                vec![field("name", None, vec![], vec![])],
            )]
        };
        let store = Store::new(StoreConfig::default());

        let (doc1, op1) = query(selection_set("u1"));
        let ctx1 = OperationContext::new(&doc1, &op1, Im::new());
        let response1 = obj(vec![("user", obj(vec![("name", JsonValue::String("Ada".into()))]))]);
        write(&store, response1, &ctx1).unwrap();

        let (doc2, op2) = query(selection_set("u2"));
        let ctx2 = OperationContext::new(&doc2, &op2, Im::new());
        let response2 = obj(vec![("user", obj(vec![("name", JsonValue::String("Grace".into()))]))]);
        let (snapshot, _top) = write(&store, response2, &ctx2).unwrap();

        let root = snapshot.get(&EntityReference::root()).unwrap();
        assert!(root.contains_key("user({\"id\":\"u1\"})"));
        assert!(root.contains_key("user({\"id\":\"u2\"})"));
    }

    #[test]
    fn mixed_entity_map_rejected() {
        let selection_set = vec![field(
            "profile",
            None,
            vec![],
            vec![
                field("__typename", None, vec![], vec![]),
                field(
                    "friendsByName",
                    None,
                    vec![],
                    vec![field("__typename", None, vec![], vec![]), field("id", None, vec![], vec![])],
                ),
            ],
        )];
        let (doc, op) = query(selection_set);
        let ctx = OperationContext::new(&doc, &op, Im::new());
        let mut id_attrs = IndexSet::new();
        id_attrs.insert("Person/id".to_string());
        let store = Store::new(StoreConfig { id_attrs, ..StoreConfig::default() });

        // `friendsByName` is a dict keyed by arbitrary names whose values
        // mix a full record (Ada) and a bare scalar (not a record at all) —
        // mixed entity/non-entity values under the dict, triggering the
        // error.
        let response = obj(vec![(
            "profile",
            obj(vec![(
                "friendsByName",
                obj(vec![
                    (
                        "Ada",
                        obj(vec![
                            ("__typename", JsonValue::String("Person".into())),
                            ("id", JsonValue::String("p1".into())),
                        ]),
                    ),
                    ("nickname", JsonValue::String("just a string".into())),
                ]),
            )]),
        )]);

        let result = write(&store, response, &ctx);
        assert!(matches!(result, Err(WriteError::MixedEntityMap { .. })));
    }
}
