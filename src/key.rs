//! Key Encoder.
//!
//! Derives the storage key for a selection from its field name, resolved
//! arguments, and non-standard directives. Deterministic: the same
//! selection and variable bindings always produce the same string.

use std::fmt::Write as _;

use itertools::Itertools;

use crate::ast::{is_standard_directive, Directive, FieldSelection, Value as AstValue};
use crate::context::OperationContext;
use crate::error::EncodeError;
use serde_json_bytes::Value as JsonValue;

/// Encodes the field-key for `selection`.
///
/// Returns the bare field name when there are no arguments and no
/// non-standard directives; otherwise appends `({...})` for arguments and
/// `@name({...})` per non-standard directive, in source order.
pub fn encode_key(
    selection: &FieldSelection,
    ctx: &OperationContext<'_>,
) -> Result<String, EncodeError> {
    if selection.name.is_empty() {
        return Err(EncodeError::MissingFieldName);
    }

    let non_standard_directives: Vec<&Directive> = selection
        .directives
        .iter()
        .filter(|d| !is_standard_directive(&d.name))
        .collect();

    if selection.arguments.is_empty() && non_standard_directives.is_empty() {
        return Ok(selection.name.clone());
    }

    let mut key = selection.name.clone();
    if !selection.arguments.is_empty() {
        write_args(&mut key, &selection.arguments, ctx);
    }
    for directive in non_standard_directives {
        let _ = write!(key, "@{}", directive.name);
        if !directive.arguments.is_empty() {
            write_args(&mut key, &directive.arguments, ctx);
        }
    }
    Ok(key)
}

fn write_args(out: &mut String, arguments: &[crate::ast::Argument], ctx: &OperationContext<'_>) {
    let body = arguments
        .iter()
        .map(|arg| {
            let mut entry = format!("\"{}\":", arg.name);
            write_value(&mut entry, &ctx.resolve_value(&arg.value));
            entry
        })
        .join(",");
    let _ = write!(out, "({{{body}}})");
}

fn write_value(out: &mut String, value: &JsonValue) {
    match value {
        JsonValue::Null => out.push_str("null"),
        JsonValue::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        JsonValue::Number(n) => {
            let _ = write!(out, "{n}");
        }
        JsonValue::String(s) => {
            let _ = write!(out, "\"{}\"", s.as_str());
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        JsonValue::Object(map) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "\"{}\":", k.as_str());
                write_value(out, v);
            }
            out.push('}');
        }
    }
}

/// A dotted field-key's worth of `@name` suffix, used by the value encoder
/// even when the field itself carries no arguments but a directive does
/// (kept as a free function so the Selection Walker can reuse it when
/// computing namespaced-keys without re-deriving the whole key).
pub fn has_key_suffix(selection: &FieldSelection) -> bool {
    !selection.arguments.is_empty()
        || selection.directives.iter().any(|d| !is_standard_directive(&d.name))
}
