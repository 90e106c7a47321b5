//! Minimal GraphQL operation AST.
//!
//! This stands in for the document a parser collaborator would hand the
//! cache. Shaped after the selection/argument/value split in
//! `apollo-federation::operation`, trimmed to exactly what the Key Encoder,
//! Selection Walker, Writer and Reader need: field names, aliases,
//! arguments, directives and nested selections.

use std::collections::HashMap;

use indexmap::IndexMap;

/// A parsed GraphQL document: zero or more operations plus named fragments.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub operations: Vec<OperationDefinition>,
    pub fragments: HashMap<String, FragmentDefinition>,
}

impl Document {
    /// Returns the document's sole operation, or `None` when it declares
    /// zero or more than one. Resolving *which* named operation to run when
    /// a document declares several is the surface API's job; the policy
    /// engine only needs the common single-operation case.
    pub fn single_operation(&self) -> Option<&OperationDefinition> {
        match self.operations.as_slice() {
            [op] => Some(op),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

#[derive(Debug, Clone)]
pub struct OperationDefinition {
    pub operation_type: OperationType,
    pub name: Option<String>,
    pub variable_definitions: Vec<VariableDefinition>,
    pub selection_set: Vec<Selection>,
}

#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub name: String,
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub selection_set: Vec<Selection>,
}

/// One entry of a selection set: a field, a named fragment spread, or an
/// inline fragment. Fragment spreads and inline fragments are expanded by
/// the Selection Walker before annotation.
#[derive(Debug, Clone)]
pub enum Selection {
    Field(FieldSelection),
    FragmentSpread { name: String, directives: Vec<Directive> },
    InlineFragment(InlineFragment),
}

#[derive(Debug, Clone)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: Vec<Selection>,
}

#[derive(Debug, Clone)]
pub struct FieldSelection {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: Vec<Argument>,
    pub directives: Vec<Directive>,
    pub selection_set: Vec<Selection>,
}

impl FieldSelection {
    /// The name a caller sees this field's value under: the alias if
    /// present, otherwise the field name.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_leaf(&self) -> bool {
        self.selection_set.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Directive {
    pub name: String,
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone)]
pub struct Argument {
    pub name: String,
    pub value: Value,
}

/// An argument/directive-argument value as written in the operation.
/// `Variable` defers resolution to the operation context.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Variable(String),
    String(String),
    Int(i64),
    Float(OrderedFloat),
    Boolean(bool),
    Null,
    Enum(String),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
}

/// Thin wrapper so `Value` can derive `PartialEq` without pulling in a
/// float-ordering crate the teacher doesn't depend on.
#[derive(Debug, Clone, Copy)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

/// true for `include`/`skip`: the two standard directives excluded from key
/// encoding. They are evaluated during the write's field rewrite instead of
/// being stored as part of a field-key.
pub fn is_standard_directive(name: &str) -> bool {
    name == "include" || name == "skip"
}
