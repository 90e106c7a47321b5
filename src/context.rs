//! Operation context: caller variables plus the operation's declared
//! defaults.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json_bytes::Value as JsonValue;

use crate::ast::{Document, OperationDefinition, Value as AstValue};

/// Per-query/mutation context threaded through the Key Encoder, Selection
/// Walker, Writer and Reader.
pub struct OperationContext<'a> {
    pub document: &'a Document,
    pub operation: &'a OperationDefinition,
    variables: IndexMap<String, JsonValue>,
}

impl<'a> OperationContext<'a> {
    pub fn new(
        document: &'a Document,
        operation: &'a OperationDefinition,
        variables: IndexMap<String, JsonValue>,
    ) -> Self {
        Self { document, operation, variables }
    }

    pub fn fragments(&self) -> &'a HashMap<String, crate::ast::FragmentDefinition> {
        &self.document.fragments
    }

    /// Resolves a variable: caller binding, else the operation's declared
    /// default, else `null`.
    pub fn resolve_variable(&self, name: &str) -> JsonValue {
        if let Some(value) = self.variables.get(name) {
            return value.clone();
        }
        let default = self
            .operation
            .variable_definitions
            .iter()
            .find(|def| def.name == name)
            .and_then(|def| def.default_value.as_ref());
        match default {
            Some(value) => ast_literal_to_json(value, self),
            None => JsonValue::Null,
        }
    }

    /// Resolves an argument value node to JSON, recursing into lists and
    /// objects so nested variables are resolved too.
    pub fn resolve_value(&self, value: &AstValue) -> JsonValue {
        ast_literal_to_json(value, self)
    }
}

fn ast_literal_to_json(value: &AstValue, ctx: &OperationContext<'_>) -> JsonValue {
    match value {
        AstValue::Variable(name) => ctx.resolve_variable(name),
        AstValue::String(s) => JsonValue::String(s.clone().into()),
        AstValue::Int(i) => JsonValue::Number((*i).into()),
        AstValue::Float(f) => serde_json::Number::from_f64(f.0)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        AstValue::Boolean(b) => JsonValue::Bool(*b),
        AstValue::Null => JsonValue::Null,
        AstValue::Enum(s) => JsonValue::String(s.clone().into()),
        AstValue::List(items) => {
            JsonValue::Array(items.iter().map(|v| ast_literal_to_json(v, ctx)).collect())
        }
        AstValue::Object(fields) => {
            let mut map = serde_json_bytes::Map::new();
            for (k, v) in fields {
                map.insert(k.clone(), ast_literal_to_json(v, ctx));
            }
            JsonValue::Object(map)
        }
    }
}
