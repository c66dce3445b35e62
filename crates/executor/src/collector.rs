use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use spin::RwLock;
use value::{ConstValue, Name, Variables};

use crate::document::{resolve_value, Directive, Document, Field, Selection, SelectionSet};

/// A field of an object selection after fragments and directives are applied.
#[derive(Debug, Clone)]
pub struct CollectedField {
    /// The response key.
    pub alias: Name,
    pub name: Name,
    /// The first selection of this response key; arguments and position come from it.
    pub node: Arc<Field>,
    /// Child selections of every occurrence of the response key, merged.
    pub selection_set: SelectionSet,
    /// Set when every occurrence sits inside a `@defer` fragment.
    pub defer: Option<Defer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defer {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    selection_set: usize,
    len: usize,
    satisfies: u64,
}

impl CacheKey {
    fn new(selection_set: &SelectionSet, satisfies: &[&str]) -> Self {
        let mut hasher = DefaultHasher::new();
        satisfies.hash(&mut hasher);
        Self {
            selection_set: Arc::as_ptr(selection_set) as *const Selection as usize,
            len: selection_set.len(),
            satisfies: hasher.finish(),
        }
    }
}

/// Per operation cache of collected fields, keyed by selection set identity
/// and the possible types it was collected for.
#[derive(Default)]
pub struct CollectorCache {
    entries: RwLock<HashMap<CacheKey, Arc<[CollectedField]>>>,
    hits: AtomicUsize,
}

impl CollectorCache {
    /// Return the cached fields or collect and store them. When two callers
    /// race on the same key the first stored list wins.
    pub fn get_or_collect(
        &self,
        selection_set: &SelectionSet,
        satisfies: &[&str],
        collect: impl FnOnce() -> Vec<CollectedField>,
    ) -> Arc<[CollectedField]> {
        let key = CacheKey::new(selection_set, satisfies);
        if let Some(fields) = self.entries.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return fields.clone();
        }

        tracing::debug!(satisfies = ?satisfies, len = selection_set.len(), "collect fields");
        let fields: Arc<[CollectedField]> = collect().into();
        self.entries.write().entry(key).or_insert(fields).clone()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

struct Grouped {
    alias: Name,
    name: Name,
    node: Arc<Field>,
    selection_sets: Vec<SelectionSet>,
    defer: Option<Defer>,
}

/// Flatten `selection_set` into fields in first-seen order, merging fields
/// that share a response key.
pub fn collect_fields(
    document: &Document,
    variables: &Variables,
    selection_set: &SelectionSet,
    satisfies: &[&str],
) -> Vec<CollectedField> {
    let mut grouped = Vec::new();
    collect(
        document,
        variables,
        selection_set,
        satisfies,
        None,
        &mut HashSet::new(),
        &mut grouped,
    );

    grouped
        .into_iter()
        .map(|field| {
            let selection_set = match field.selection_sets.as_slice() {
                [] => field.node.selection_set.clone(),
                [selection_set] => selection_set.clone(),
                selection_sets => selection_sets
                    .iter()
                    .flat_map(|selection_set| selection_set.iter().cloned())
                    .collect::<Vec<_>>()
                    .into(),
            };
            CollectedField {
                alias: field.alias,
                name: field.name,
                node: field.node,
                selection_set,
                defer: field.defer,
            }
        })
        .collect()
}

fn collect(
    document: &Document,
    variables: &Variables,
    selection_set: &[Selection],
    satisfies: &[&str],
    defer: Option<&Defer>,
    visited: &mut HashSet<Name>,
    grouped: &mut Vec<Grouped>,
) {
    for selection in selection_set {
        match selection {
            Selection::Field(field) => {
                if !should_include(&field.directives, variables) {
                    continue;
                }
                let alias = field.response_key();
                match grouped.iter().position(|grouped| &grouped.alias == alias) {
                    Some(idx) => {
                        let existing = &mut grouped[idx];
                        if defer.is_none() {
                            existing.defer = None;
                        }
                        if !field.selection_set.is_empty() {
                            existing.selection_sets.push(field.selection_set.clone());
                        }
                    }
                    None => grouped.push(Grouped {
                        alias: alias.clone(),
                        name: field.name.clone(),
                        node: field.clone(),
                        selection_sets: if field.selection_set.is_empty() {
                            Vec::new()
                        } else {
                            vec![field.selection_set.clone()]
                        },
                        defer: defer.cloned(),
                    }),
                }
            }
            Selection::InlineFragment(fragment) => {
                if !should_include(&fragment.directives, variables) {
                    continue;
                }
                if let Some(type_condition) = &fragment.type_condition {
                    if !instance_of(type_condition, satisfies) {
                        continue;
                    }
                }
                let defer = deferrable(&fragment.directives, variables).or_else(|| defer.cloned());
                collect(
                    document,
                    variables,
                    &fragment.selection_set,
                    satisfies,
                    defer.as_ref(),
                    visited,
                    grouped,
                );
            }
            Selection::FragmentSpread(spread) => {
                if !should_include(&spread.directives, variables) {
                    continue;
                }
                if !visited.insert(spread.fragment_name.clone()) {
                    continue;
                }
                let fragment = match document.fragment(&spread.fragment_name) {
                    Some(fragment) => fragment,
                    None => {
                        tracing::error!(fragment = %spread.fragment_name, "missing fragment");
                        continue;
                    }
                };
                if !instance_of(&fragment.type_condition, satisfies) {
                    continue;
                }
                let defer = deferrable(&spread.directives, variables).or_else(|| defer.cloned());
                collect(
                    document,
                    variables,
                    &fragment.selection_set,
                    satisfies,
                    defer.as_ref(),
                    visited,
                    grouped,
                );
            }
        }
    }
}

fn instance_of(type_condition: &str, satisfies: &[&str]) -> bool {
    satisfies.is_empty() || satisfies.contains(&type_condition)
}

fn directive_if(directive: &Directive, variables: &Variables) -> Option<bool> {
    match directive.argument("if").map(|value| resolve_value(value, variables)) {
        Some(ConstValue::Boolean(value)) => Some(value),
        _ => None,
    }
}

fn should_include(directives: &[Directive], variables: &Variables) -> bool {
    for directive in directives {
        match directive.name.as_str() {
            "skip" if directive_if(directive, variables) == Some(true) => return false,
            "include" if directive_if(directive, variables) != Some(true) => return false,
            _ => {}
        }
    }
    true
}

fn deferrable(directives: &[Directive], variables: &Variables) -> Option<Defer> {
    let directive = directives
        .iter()
        .find(|directive| directive.name.as_str() == "defer")?;
    if directive_if(directive, variables) == Some(false) {
        return None;
    }
    let label = match directive.argument("label").map(|value| resolve_value(value, variables)) {
        Some(ConstValue::String(label)) => Some(label),
        _ => None,
    };
    Some(Defer { label })
}
