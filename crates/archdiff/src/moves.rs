//! Detection of fields that only changed place.
//!
//! A field removed in one place and added in another is a move when its name
//! shows up exactly once among the removed fields and once among the added
//! ones, and its children, text and tail are unchanged. Attributes may differ;
//! they are patched separately once the field sits at its new place.

use crate::identify::to_xpath;
use crate::seqdiff::LineChange;
use crate::stringify::ArchLines;
use crate::ArchNode;
use ahash::AHashMap;
use archdiff_core::NormalizeConfig;
use indexmap::IndexMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedField {
    pub tag: String,
    pub name: String,
    pub old_id: usize,
    pub new_id: usize,
    pub old_xpath: String,
    pub new_xpath: String,
}

/// Moved fields keyed by name, in old document order.
#[derive(Debug, Clone, Default)]
pub struct MovedFields {
    fields: IndexMap<String, MovedField>,
}

impl MovedFields {
    pub fn get(&self, name: &str) -> Option<&MovedField> {
        self.fields.get(name)
    }

    pub fn by_old_id(&self, id: usize) -> Option<&MovedField> {
        self.fields.values().find(|f| f.old_id == id)
    }

    pub fn by_new_id(&self, id: usize) -> Option<&MovedField> {
        self.fields.values().find(|f| f.new_id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MovedField> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&MovedField) -> bool) {
        self.fields.retain(|_, field| keep(field));
    }

    pub(crate) fn insert(&mut self, field: MovedField) {
        self.fields.insert(field.name.clone(), field);
    }
}

/// One side of a comparison: its document node and its lines.
#[derive(Clone, Copy)]
pub struct Side<'a> {
    pub root: &'a ArchNode,
    pub lines: &'a ArchLines,
}

/// Pair removed and added moveable fields found in `changes`.
pub fn detect_moves(
    changes: &[LineChange],
    old: Side<'_>,
    new: Side<'_>,
    config: &NormalizeConfig,
) -> MovedFields {
    let old_paths = old.root.id_paths();
    let new_paths = new.root.id_paths();

    let mut removed: IndexMap<&str, Vec<&[usize]>> = IndexMap::new();
    let mut added: AHashMap<&str, Vec<&[usize]>> = AHashMap::new();

    for change in changes {
        match *change {
            LineChange::Removed { old: line } => {
                if let Some((name, path)) = moveable(old, &old_paths, line, config) {
                    removed.entry(name).or_default().push(path);
                }
            }
            LineChange::Added { new: line } => {
                if let Some((name, path)) = moveable(new, &new_paths, line, config) {
                    added.entry(name).or_default().push(path);
                }
            }
            LineChange::Unchanged { .. } => {}
        }
    }

    let mut moved = MovedFields::default();
    for (name, old_hits) in &removed {
        let Some(new_hits) = added.get(name) else {
            continue;
        };
        if old_hits.len() != 1 || new_hits.len() != 1 {
            debug!(field = %name, "field removed or added more than once, not a move");
            continue;
        }
        let (old_path, new_path) = (old_hits[0], new_hits[0]);
        let (Some(old_node), Some(new_node)) = (old.root.get(old_path), new.root.get(new_path))
        else {
            continue;
        };
        if old_node.tag != new_node.tag {
            continue;
        }
        if old_node.children != new_node.children
            || old_node.text_content() != new_node.text_content()
            || old_node.tail_content() != new_node.tail_content()
        {
            warn!(field = %name, "moved field also changed content, emitting remove and add");
            continue;
        }
        if has_unpatchable_attribute(old_node, new_node) {
            warn!(field = %name, "moved field sets a blank attribute, emitting remove and add");
            continue;
        }

        let (Some(old_id), Some(new_id)) = (old_node.arch_id, new_node.arch_id) else {
            continue;
        };
        let (Some(old_xpath), Some(new_xpath)) = (
            to_xpath(old.root, old_path, config),
            to_xpath(new.root, new_path, config),
        ) else {
            continue;
        };
        moved.insert(MovedField {
            tag: new_node.tag.clone(),
            name: name.to_string(),
            old_id,
            new_id,
            old_xpath: old_xpath.to_string(),
            new_xpath: new_xpath.to_string(),
        });
    }

    debug!(count = moved.len(), "moved fields detected");
    moved
}

/// Name and path of the moveable element opened by `line`, if any.
fn moveable<'a>(
    side: Side<'a>,
    paths: &'a AHashMap<usize, Vec<usize>>,
    line: usize,
    config: &NormalizeConfig,
) -> Option<(&'a str, &'a [usize])> {
    let id = side.lines.opened_at(line)?;
    let path = paths.get(&id)?;
    let node = side.root.get(path)?;
    if !config.is_moveable(&node.tag) {
        return None;
    }
    Some((node.name()?, path.as_slice()))
}

/// True when `new` changes an attribute to a value an `attributes`
/// operation cannot carry: an empty value removes the attribute and
/// surrounding whitespace is trimmed when the operation is applied.
pub fn has_unpatchable_attribute(old: &ArchNode, new: &ArchNode) -> bool {
    new.attrs.iter().any(|(key, value)| {
        (value.is_empty() || value.trim() != value) && old.attr(key) != Some(value.as_str())
    })
}
