//! Selection Walker.
//!
//! Traverses an operation's selection set, producing a mapping from
//! response path (a list of unaliased field names) to the list of
//! annotated selections present at that path. Fragment spreads and inline
//! fragments are expanded against the supplied fragment map before
//! recursion; type-condition narrowing is not checked, since that is
//! schema validation's job and this crate has no schema.

use indexmap::IndexMap;

use crate::ast::{Directive, Selection};
use crate::context::OperationContext;
use crate::error::EncodeError;
use crate::key::{encode_key, has_key_suffix};
use crate::reference::ROOT_MARKER;

/// A response path: the chain of unaliased field names from the root to a
/// selection set.
pub type ResponsePath = Vec<String>;

/// A selection annotated with its encoded field-key and namespaced-key.
#[derive(Debug, Clone)]
pub struct AnnotatedSelection {
    pub field_name: String,
    pub alias: Option<String>,
    pub field_key: String,
    pub namespaced_key: String,
    pub is_aliased: bool,
    pub has_key_suffix: bool,
    pub directives: Vec<Directive>,
    pub children: Vec<AnnotatedSelection>,
}

impl AnnotatedSelection {
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field_name)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Walks `root_selection_set` (typically an operation's top-level
/// selections) and returns every path → annotated-selections pair
/// encountered, including the root path (`[]`).
pub fn walk(
    root_selection_set: &[Selection],
    ctx: &OperationContext<'_>,
) -> Result<IndexMap<ResponsePath, Vec<AnnotatedSelection>>, EncodeError> {
    let mut paths = IndexMap::new();
    let root = walk_selection_set(root_selection_set, &[], ROOT_MARKER, ctx, &mut paths)?;
    paths.insert(Vec::new(), root);
    Ok(paths)
}

fn walk_selection_set(
    selections: &[Selection],
    path: &[String],
    namespace_prefix: &str,
    ctx: &OperationContext<'_>,
    paths: &mut IndexMap<ResponsePath, Vec<AnnotatedSelection>>,
) -> Result<Vec<AnnotatedSelection>, EncodeError> {
    let mut out = Vec::new();
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                let field_key = encode_key(field, ctx)?;
                let namespaced_key = format!("{namespace_prefix}.{field_key}");
                let mut child_path = path.to_vec();
                child_path.push(field.name.clone());

                let children = if field.selection_set.is_empty() {
                    Vec::new()
                } else {
                    let children = walk_selection_set(
                        &field.selection_set,
                        &child_path,
                        &namespaced_key,
                        ctx,
                        paths,
                    )?;
                    paths.insert(child_path.clone(), children.clone());
                    children
                };

                out.push(AnnotatedSelection {
                    field_name: field.name.clone(),
                    alias: field.alias.clone(),
                    field_key,
                    namespaced_key,
                    is_aliased: field.alias.is_some(),
                    has_key_suffix: has_key_suffix(field),
                    directives: field.directives.clone(),
                    children,
                });
            }
            Selection::FragmentSpread { name, .. } => {
                if let Some(fragment) = ctx.fragments().get(name) {
                    let mut nested = walk_selection_set(
                        &fragment.selection_set,
                        path,
                        namespace_prefix,
                        ctx,
                        paths,
                    )?;
                    out.append(&mut nested);
                }
            }
            Selection::InlineFragment(fragment) => {
                let mut nested = walk_selection_set(
                    &fragment.selection_set,
                    path,
                    namespace_prefix,
                    ctx,
                    paths,
                )?;
                out.append(&mut nested);
            }
        }
    }
    Ok(out)
}
