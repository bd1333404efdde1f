use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use super::model::Field;

// ---------------------------------------------------------------------------
// FieldTreeNode – ontology grouping for the field list
// ---------------------------------------------------------------------------

/// A field and the fields whose `parent` is this field's term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldTreeNode {
    pub field: Field,
    pub children: Vec<FieldTreeNode>,
}

impl FieldTreeNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Build the field forest from a flat field list.
///
/// Fields without a parent, or whose parent term is not in the list, become
/// roots. Siblings keep their input order. Parent chains that loop back on
/// themselves are cut where the loop closes.
pub fn make_tree(fields: &[Field]) -> Vec<FieldTreeNode> {
    let terms: HashSet<&str> = fields.iter().map(|f| f.term.as_str()).collect();

    let mut children_of: BTreeMap<&str, Vec<&Field>> = BTreeMap::new();
    let mut roots: Vec<&Field> = Vec::new();
    for field in fields {
        match field.parent.as_deref() {
            Some(parent) if terms.contains(parent) && parent != field.term => {
                children_of.entry(parent).or_default().push(field)
            }
            _ => roots.push(field),
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut forest: Vec<FieldTreeNode> = roots
        .into_iter()
        .filter_map(|f| build_node(f, &children_of, &mut visited))
        .collect();

    // Anything not reached from a root sits on a parent cycle; surface the
    // first member of each cycle as a root so no field disappears.
    for field in fields {
        if !visited.contains(field.term.as_str()) {
            if let Some(node) = build_node(field, &children_of, &mut visited) {
                forest.push(node);
            }
        }
    }
    forest
}

fn build_node<'a>(
    field: &'a Field,
    children_of: &BTreeMap<&str, Vec<&'a Field>>,
    visited: &mut HashSet<&'a str>,
) -> Option<FieldTreeNode> {
    if !visited.insert(field.term.as_str()) {
        return None;
    }
    let children = children_of
        .get(field.term.as_str())
        .map(|kids| {
            kids.iter()
                .filter_map(|kid| build_node(kid, children_of, visited))
                .collect()
        })
        .unwrap_or_default();
    Some(FieldTreeNode {
        field: field.clone(),
        children,
    })
}

/// Leaf fields of the forest in depth-first order.
pub fn leaves(forest: &[FieldTreeNode]) -> Vec<&Field> {
    let mut out = Vec::new();
    let mut stack: Vec<&FieldTreeNode> = forest.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if node.is_leaf() {
            out.push(&node.field);
        } else {
            stack.extend(node.children.iter().rev());
        }
    }
    out
}

pub fn count_leaves(forest: &[FieldTreeNode]) -> usize {
    leaves(forest).len()
}

/// Terms of the ancestors of `term`, nearest first.
pub fn path_to_field(fields: &BTreeMap<String, Field>, term: &str) -> Vec<String> {
    let mut path = Vec::new();
    let mut seen: HashSet<&str> = HashSet::from([term]);
    let mut current = fields.get(term);
    while let Some(parent) = current.and_then(|f| f.parent.as_deref()) {
        if !seen.insert(parent) {
            break;
        }
        path.push(parent.to_string());
        current = fields.get(parent);
    }
    path
}

/// Every whitespace-separated term of `query` must occur in the field's
/// display, case-insensitively. An empty query matches everything.
pub fn matches_search(field: &Field, query: &str) -> bool {
    let display = field.display.to_lowercase();
    query
        .split_whitespace()
        .all(|term| display.contains(&term.to_lowercase()))
}

/// Prune the forest down to leaves matching `query` and the categories that
/// lead to them.
pub fn search_tree(forest: &[FieldTreeNode], query: &str) -> Vec<FieldTreeNode> {
    forest
        .iter()
        .filter_map(|node| {
            if node.is_leaf() {
                matches_search(&node.field, query).then(|| node.clone())
            } else {
                let children = search_tree(&node.children, query);
                (!children.is_empty()).then(|| FieldTreeNode {
                    field: node.field.clone(),
                    children,
                })
            }
        })
        .collect()
}
