//! Patch compilation.
//!
//! The old and new arches are flattened into lines and diffed twice: the
//! first diff finds fields that only moved, the second runs with those fields
//! marked so they stay out of the surrounding matches. Elements whose opening
//! lines pair up under already paired parents are kept; everything else is
//! removed or added as a whole subtree.
//!
//! Operations are emitted against a working copy of the old arch and applied
//! to it as they are emitted, so every xpath designates its node in the state
//! the arch is in when the operation runs. Removals come first, then a walk
//! of the new arch emits insertions, moves and attribute updates in document
//! order.

use crate::apply::{apply_attributes, insert_content};
use crate::identify::to_xpath;
use crate::moves::{detect_moves, has_unpatchable_attribute, MovedFields, Side};
use crate::patch::{Patch, Position, XPathOp};
use crate::pretty::indent_tree;
use crate::seqdiff::{diff_lines, render, LineChange};
use crate::stringify::arch_lines;
use crate::writer::to_xml_string;
use crate::{parse_arch, ArchNode};
use ahash::{AHashMap, AHashSet};
use archdiff_core::{ArchError, NormalizeConfig, Result, SyntheticNames};
use tracing::{debug, enabled, trace, warn, Level};
use uuid::Uuid;

/// Result of a compilation.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub patch: Patch,
    /// The new arch as the patch produces it, synthetic names included.
    pub target: ArchNode,
    indent: usize,
}

impl Normalized {
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty()
    }

    /// The patch as an indented `<data>` tree.
    pub fn to_arch(&self) -> ArchNode {
        let mut arch = self.patch.to_arch();
        indent_tree(&mut arch, self.indent);
        arch
    }

    pub fn to_xml(&self) -> Result<String> {
        to_xml_string(&self.to_arch())
    }

    pub fn target_xml(&self) -> Result<String> {
        let mut target = self.target.clone();
        indent_tree(&mut target, self.indent);
        to_xml_string(&target)
    }
}

/// Compiles the patch turning one arch into another.
#[derive(Debug, Clone, Default)]
pub struct ArchNormalizer {
    config: NormalizeConfig,
}

impl ArchNormalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizeConfig {
        &self.config
    }

    pub fn compile(&self, old_arch: &str, new_arch: &str) -> Result<Normalized> {
        self.config.validate()?;
        let old = parse_arch(old_arch)?;
        let new = parse_arch(new_arch)?;
        self.compile_trees(&old, &new)
    }

    pub fn compile_trees(&self, old: &ArchNode, new: &ArchNode) -> Result<Normalized> {
        let config = &self.config;
        let mut old_root = ArchNode::synthetic_root(old.without_ids());
        let mut new_root = ArchNode::synthetic_root(new.without_ids());
        let next = old_root.assign_ids(0);
        new_root.assign_ids(next);

        let old_lines = arch_lines(&old_root, None, config);
        let first_lines = arch_lines(&new_root, None, config);
        let first = diff_lines(&old_lines.texts(), &first_lines.texts());
        debug!(
            old_lines = old_lines.len(),
            new_lines = first_lines.len(),
            "stringified arches"
        );
        let mut moves = detect_moves(
            &first,
            Side {
                root: &old_root,
                lines: &old_lines,
            },
            Side {
                root: &new_root,
                lines: &first_lines,
            },
            config,
        );

        let (new_lines, changes) = if moves.is_empty() {
            (first_lines, first)
        } else {
            let lines = arch_lines(&new_root, Some(&moves), config);
            let changes = diff_lines(&old_lines.texts(), &lines.texts());
            (lines, changes)
        };
        if enabled!(Level::TRACE) {
            trace!(
                "line diff:\n{}",
                render(&changes, &old_lines.texts(), &new_lines.texts())
            );
        }

        let matching = Matching::build(
            &changes,
            Side {
                root: &old_root,
                lines: &old_lines,
            },
            Side {
                root: &new_root,
                lines: &new_lines,
            },
        );

        let top_matched = new_root
            .children
            .first()
            .and_then(|top| top.arch_id)
            .is_some_and(|id| matching.new_to_old.contains_key(&id));
        if !top_matched {
            debug!("root element changed, replacing the whole arch");
            return self.replace_root(&old_root, new_root);
        }

        moves.retain(|field| {
            let usable = !matching.old_to_new.contains_key(&field.old_id)
                && !matching.new_to_old.contains_key(&field.new_id)
                && matching.old_parent_matched(field.old_id);
            if !usable {
                warn!(field = %field.name, "move dropped, emitting remove and add");
            }
            usable
        });

        let seed = format!("{}\n{}", old_lines, new_lines);
        let named = self.assign_synthetic_names(&mut new_root, &old_root, &matching, &moves, &seed);
        debug!(
            moves = moves.len(),
            kept = matching.old_to_new.len(),
            synthetic_names = named,
            "matched arches"
        );

        let old_paths = old_root.id_paths();
        let new_paths = new_root.id_paths();
        let mut emitter = Emitter::new(config, old_root.clone());
        emitter.pending = moves.iter().map(|field| field.old_id).collect();
        if let (Some(new_id), Some(old_id)) = (new_root.arch_id, old_root.arch_id) {
            emitter.placed.insert(new_id, old_id);
        }

        // Removals, last in document order first
        let removed: Vec<usize> = old_root
            .preorder()
            .into_iter()
            .skip(1)
            .filter_map(|(_, node)| node.arch_id)
            .filter(|&id| {
                !matching.old_to_new.contains_key(&id)
                    && matching.old_parent_matched(id)
                    && moves.by_old_id(id).is_none()
            })
            .collect();
        for &id in removed.iter().rev() {
            emitter.remove(id)?;
        }

        // Insertions, moves and attribute updates in new document order
        let walk = new_root.preorder();
        let mut skipped: Option<&[usize]> = None;
        for (path, node) in walk.iter().skip(1) {
            if let Some(prefix) = skipped {
                if path.starts_with(prefix) {
                    continue;
                }
                skipped = None;
            }
            let Some(id) = node.arch_id else {
                continue;
            };

            if let Some(&old_id) = matching.new_to_old.get(&id) {
                emitter.close_block()?;
                emitter.placed.insert(id, old_id);
                let old_node = lookup(&old_root, &old_paths, old_id)?;
                emitter.update_attributes(old_id, old_node, node, AttrOrder::Reverse)?;
                continue;
            }

            let Some((&index, parent_path)) = path.split_last() else {
                continue;
            };
            let parent = new_root
                .get(parent_path)
                .ok_or_else(|| ArchError::TargetNotFound(format!("{parent_path:?}")))?;
            let parent_id = parent
                .arch_id
                .ok_or_else(|| ArchError::TargetNotFound(format!("{parent_path:?}")))?;
            let previous = index
                .checked_sub(1)
                .and_then(|i| parent.children.get(i))
                .and_then(|sibling| sibling.arch_id);

            match moves.by_new_id(id) {
                Some(field) => {
                    emitter.place(
                        Item::Moved {
                            old_id: field.old_id,
                            new_id: id,
                        },
                        parent_id,
                        previous,
                    )?;
                    skipped = Some(path.as_slice());
                }
                None => emitter.place(Item::Added(node.shallow_clone()), parent_id, previous)?,
            }
        }
        emitter.close_block()?;

        // Attribute updates of moved fields, once they sit at their new place
        let mut moved: Vec<_> = moves.iter().collect();
        moved.sort_by_key(|field| field.new_id);
        for field in moved {
            let old_node = lookup(&old_root, &old_paths, field.old_id)?;
            let new_node = lookup(&new_root, &new_paths, field.new_id)?;
            emitter.update_attributes(field.old_id, old_node, new_node, AttrOrder::Forward)?;
        }

        self.finish(emitter, new_root)
    }

    /// Single operation replacing the top element with the new one.
    fn replace_root(&self, old_root: &ArchNode, new_root: ArchNode) -> Result<Normalized> {
        let mut emitter = Emitter::new(&self.config, old_root.clone());
        let top = old_root
            .children
            .first()
            .and_then(|node| node.arch_id)
            .ok_or_else(|| ArchError::TargetNotFound("root element".to_string()))?;
        let expr = emitter.locate(top)?;
        let content: Vec<ArchNode> = new_root.children.iter().map(ArchNode::without_ids).collect();
        insert_content(&mut emitter.work, &[0], Position::Replace, content.clone())?;
        emitter
            .ops
            .push(XPathOp::new(expr, Position::Replace).with_content(content));
        self.finish(emitter, new_root)
    }

    fn finish(&self, emitter: Emitter<'_>, new_root: ArchNode) -> Result<Normalized> {
        if self.config.verify && emitter.work != new_root {
            return Err(ArchError::ReplayMismatch);
        }
        let target = new_root
            .children
            .first()
            .map(ArchNode::without_ids)
            .ok_or_else(|| ArchError::TargetNotFound("root element".to_string()))?;
        debug!(ops = emitter.ops.len(), "patch compiled");
        Ok(Normalized {
            patch: Patch::new(emitter.ops),
            target,
            indent: self.config.indent,
        })
    }

    /// Name added containers that repeat among their siblings, so later
    /// operations can address them by name.
    fn assign_synthetic_names(
        &self,
        new_root: &mut ArchNode,
        old_root: &ArchNode,
        matching: &Matching,
        moves: &MovedFields,
        seed: &str,
    ) -> usize {
        let mut targets: Vec<(Vec<usize>, String)> = Vec::new();
        let mut skipped: Option<Vec<usize>> = None;
        for (path, node) in new_root.preorder().into_iter().skip(1) {
            if let Some(prefix) = &skipped {
                if path.starts_with(prefix) {
                    continue;
                }
                skipped = None;
            }
            let Some(id) = node.arch_id else {
                continue;
            };
            if moves.by_new_id(id).is_some() {
                skipped = Some(path);
                continue;
            }
            if matching.new_to_old.contains_key(&id)
                || !self.config.is_container(&node.tag)
                || node.name().is_some()
            {
                continue;
            }
            let Some((_, parent_path)) = path.split_last() else {
                continue;
            };
            let repeated = new_root.get(parent_path).is_some_and(|parent| {
                parent.children.iter().filter(|c| c.tag == node.tag).count() > 1
            });
            if repeated {
                targets.push((path, node.tag.clone()));
            }
        }

        let mut mint = NameMint::new(&self.config, seed);
        for (path, tag) in &targets {
            let name = loop {
                let candidate = mint.next(tag);
                if old_root.count_named(tag, &candidate) + new_root.count_named(tag, &candidate) == 0 {
                    break candidate;
                }
            };
            if let Some(node) = new_root.get_mut(path) {
                node.attrs.shift_insert(0, "name".to_string(), name);
            }
        }
        targets.len()
    }
}

fn lookup<'a>(
    root: &'a ArchNode,
    paths: &AHashMap<usize, Vec<usize>>,
    id: usize,
) -> Result<&'a ArchNode> {
    paths
        .get(&id)
        .and_then(|path| root.get(path))
        .ok_or_else(|| ArchError::TargetNotFound(format!("node #{id}")))
}

/// Kept elements, paired between the old and new arch by `arch_id`.
struct Matching {
    old_to_new: AHashMap<usize, usize>,
    new_to_old: AHashMap<usize, usize>,
    old_parent: AHashMap<usize, usize>,
}

impl Matching {
    fn build(changes: &[LineChange], old: Side<'_>, new: Side<'_>) -> Self {
        let paired: AHashMap<usize, usize> = changes
            .iter()
            .filter_map(|change| match *change {
                LineChange::Unchanged { old: i, new: j } => {
                    Some((old.lines.opened_at(i)?, new.lines.opened_at(j)?))
                }
                _ => None,
            })
            .collect();

        let mut matching = Matching {
            old_to_new: AHashMap::new(),
            new_to_old: AHashMap::new(),
            old_parent: parent_ids(old.root),
        };
        let new_parent = parent_ids(new.root);
        let new_paths = new.root.id_paths();
        if let (Some(a), Some(b)) = (old.root.arch_id, new.root.arch_id) {
            matching.link(a, b);
        }

        // Parents come before their children in document order
        for (_, node) in old.root.preorder().into_iter().skip(1) {
            let Some(id) = node.arch_id else {
                continue;
            };
            let Some(&partner) = paired.get(&id) else {
                continue;
            };
            let parent_partner = matching
                .old_parent
                .get(&id)
                .and_then(|parent| matching.old_to_new.get(parent));
            if parent_partner.is_none() || new_parent.get(&partner) != parent_partner {
                continue;
            }
            let Some(new_node) = new_paths.get(&partner).and_then(|p| new.root.get(p)) else {
                continue;
            };
            if has_unpatchable_attribute(node, new_node) {
                continue;
            }
            matching.link(id, partner);
        }
        matching
    }

    fn link(&mut self, old: usize, new: usize) {
        self.old_to_new.insert(old, new);
        self.new_to_old.insert(new, old);
    }

    fn old_parent_matched(&self, id: usize) -> bool {
        self.old_parent
            .get(&id)
            .is_some_and(|parent| self.old_to_new.contains_key(parent))
    }
}

fn parent_ids(root: &ArchNode) -> AHashMap<usize, usize> {
    let mut parents = AHashMap::new();
    for (_, node) in root.preorder() {
        let Some(id) = node.arch_id else {
            continue;
        };
        for child in &node.children {
            if let Some(child_id) = child.arch_id {
                parents.insert(child_id, id);
            }
        }
    }
    parents
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOrder {
    Forward,
    Reverse,
}

/// `<attribute>` elements turning `old`'s attributes into `new`'s.
fn attribute_changes(old: &ArchNode, new: &ArchNode, order: AttrOrder) -> Vec<ArchNode> {
    let mut keys: Vec<&str> = old
        .attrs
        .keys()
        .chain(new.attrs.keys())
        .map(String::as_str)
        .collect();
    keys.sort_unstable();
    keys.dedup();
    if order == AttrOrder::Reverse {
        keys.reverse();
    }

    keys.into_iter()
        .filter(|key| old.attr(key) != new.attr(key))
        .map(|key| {
            let mut change = ArchNode::element("attribute").with_attr("name", key);
            change.text = new.attr(key).filter(|v| !v.is_empty()).map(str::to_string);
            change
        })
        .collect()
}

enum Item {
    Added(ArchNode),
    Moved { old_id: usize, new_id: usize },
}

/// Operation being filled with content, not yet applied.
struct Block {
    target: usize,
    expr: String,
    position: Position,
    content: Vec<ArchNode>,
    stash: AHashMap<usize, ArchNode>,
}

struct Emitter<'a> {
    config: &'a NormalizeConfig,
    work: ArchNode,
    ops: Vec<XPathOp>,
    block: Option<Block>,
    /// New `arch_id` to the id of the node standing for it in `work`.
    placed: AHashMap<usize, usize>,
    /// Move sources not extracted yet.
    pending: AHashSet<usize>,
}

impl<'a> Emitter<'a> {
    fn new(config: &'a NormalizeConfig, work: ArchNode) -> Self {
        Self {
            config,
            work,
            ops: Vec::new(),
            block: None,
            placed: AHashMap::new(),
            pending: AHashSet::new(),
        }
    }

    fn path_of(&self, id: usize) -> Result<Vec<usize>> {
        self.work
            .find_path(id)
            .ok_or_else(|| ArchError::TargetNotFound(format!("node #{id}")))
    }

    /// Xpath of `id` in the current working arch.
    fn locate(&self, id: usize) -> Result<String> {
        let path = self.path_of(id)?;
        let xpath = to_xpath(&self.work, &path, self.config)
            .ok_or_else(|| ArchError::TargetNotFound(format!("node #{id}")))?;
        let expr = xpath.to_string();
        if self.config.verify {
            let hits = xpath.evaluate(&self.work);
            if hits.len() != 1 || hits[0] != path {
                return Err(ArchError::AmbiguousLocation {
                    expr,
                    matches: hits.len(),
                });
            }
        }
        Ok(expr)
    }

    fn remove(&mut self, id: usize) -> Result<()> {
        let expr = self.locate(id)?;
        let path = self.path_of(id)?;
        self.work.remove_at(&path);
        trace!(%expr, "remove");
        self.ops.push(XPathOp::new(expr, Position::Replace));
        Ok(())
    }

    fn update_attributes(
        &mut self,
        id: usize,
        old: &ArchNode,
        new: &ArchNode,
        order: AttrOrder,
    ) -> Result<()> {
        let changes = attribute_changes(old, new, order);
        if changes.is_empty() {
            return Ok(());
        }
        self.close_block()?;
        let expr = self.locate(id)?;
        let path = self.path_of(id)?;
        if let Some(node) = self.work.get_mut(&path) {
            apply_attributes(node, &changes)?;
        }
        trace!(%expr, count = changes.len(), "attributes");
        self.ops
            .push(XPathOp::new(expr, Position::Attributes).with_content(changes));
        Ok(())
    }

    /// Add `item` as the next child of `parent` after `previous`.
    fn place(&mut self, item: Item, parent: usize, previous: Option<usize>) -> Result<()> {
        let parent_w = *self
            .placed
            .get(&parent)
            .ok_or_else(|| ArchError::TargetNotFound(format!("node #{parent}")))?;
        let previous_w = previous.and_then(|id| self.placed.get(&id).copied());

        let container = match &self.block {
            Some(block) if find_in(&block.content, parent_w) => Some(Some(parent_w)),
            Some(block)
                if previous_w.is_some()
                    && block.content.last().and_then(|n| n.arch_id) == previous_w =>
            {
                Some(None)
            }
            _ => None,
        };
        let container = match container {
            Some(container) => container,
            None => {
                self.open_block(parent_w, previous_w)?;
                None
            }
        };

        let (node, new_id, w_id) = match item {
            Item::Added(node) => {
                let id = node
                    .arch_id
                    .ok_or_else(|| ArchError::TargetNotFound(node.tag.clone()))?;
                (node, id, id)
            }
            Item::Moved { old_id, new_id } => {
                let expr = self.locate(old_id)?;
                let path = self.path_of(old_id)?;
                let moved = self
                    .work
                    .remove_at(&path)
                    .ok_or_else(|| ArchError::TargetNotFound(expr.clone()))?;
                self.pending.remove(&old_id);
                if let Some(block) = self.block.as_mut() {
                    block.stash.insert(old_id, moved);
                }
                trace!(%expr, "move");
                (
                    XPathOp::move_placeholder(&expr).with_arch_id(old_id),
                    new_id,
                    old_id,
                )
            }
        };
        self.placed.insert(new_id, w_id);

        let block = self
            .block
            .as_mut()
            .ok_or_else(|| ArchError::TargetNotFound(format!("node #{parent}")))?;
        match container {
            None => block.content.push(node),
            Some(id) => match find_in_mut(&mut block.content, id) {
                Some(holder) => holder.children.push(node),
                None => return Err(ArchError::TargetNotFound(format!("node #{id}"))),
            },
        }
        Ok(())
    }

    /// Start an operation anchored after `previous`, before the first
    /// child of `parent` that stays put, or inside `parent`.
    fn open_block(&mut self, parent: usize, previous: Option<usize>) -> Result<()> {
        self.close_block()?;
        let (target, position) = match previous {
            Some(sibling) => (sibling, Position::After),
            None => match self.first_stable_child(parent)? {
                Some(child) => (child, Position::Before),
                None => (parent, Position::Inside),
            },
        };
        let expr = self.locate(target)?;
        self.block = Some(Block {
            target,
            expr,
            position,
            content: Vec::new(),
            stash: AHashMap::new(),
        });
        Ok(())
    }

    fn first_stable_child(&self, parent: usize) -> Result<Option<usize>> {
        let path = self.path_of(parent)?;
        let parent = self
            .work
            .get(&path)
            .ok_or_else(|| ArchError::TargetNotFound(format!("node #{parent}")))?;
        Ok(parent
            .children
            .iter()
            .filter_map(|child| child.arch_id)
            .find(|id| !self.pending.contains(id)))
    }

    /// Apply the open operation to the working arch and record it.
    fn close_block(&mut self) -> Result<()> {
        let Some(block) = self.block.take() else {
            return Ok(());
        };
        let op = XPathOp::new(block.expr, block.position)
            .with_content(block.content.iter().map(ArchNode::without_ids).collect());

        let mut stash = block.stash;
        let content: Vec<ArchNode> = block
            .content
            .into_iter()
            .map(|node| unstash(node, &mut stash))
            .collect();
        let path = self.path_of(block.target)?;
        insert_content(&mut self.work, &path, block.position, content)?;

        trace!(expr = %op.expr, position = %op.position, "insert");
        self.ops.push(op);
        Ok(())
    }
}

fn find_in(nodes: &[ArchNode], id: usize) -> bool {
    nodes
        .iter()
        .any(|node| node.arch_id == Some(id) || find_in(&node.children, id))
}

fn find_in_mut(nodes: &mut [ArchNode], id: usize) -> Option<&mut ArchNode> {
    for node in nodes {
        if node.arch_id == Some(id) {
            return Some(node);
        }
        if let Some(found) = find_in_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}

/// Swap move placeholders for the nodes they stand for.
fn unstash(node: ArchNode, stash: &mut AHashMap<usize, ArchNode>) -> ArchNode {
    if XPathOp::is_move_placeholder(&node) {
        if let Some(moved) = node.arch_id.and_then(|id| stash.remove(&id)) {
            return moved;
        }
    }
    let ArchNode {
        tag,
        attrs,
        text,
        tail,
        children,
        arch_id,
    } = node;
    ArchNode {
        tag,
        attrs,
        text,
        tail,
        children: children.into_iter().map(|c| unstash(c, stash)).collect(),
        arch_id,
    }
}

/// Generator of names for synthetic container names.
struct NameMint<'a> {
    prefix: &'a str,
    mode: SyntheticNames,
    base: Uuid,
    ordinal: u64,
}

impl<'a> NameMint<'a> {
    fn new(config: &'a NormalizeConfig, seed: &str) -> Self {
        Self {
            prefix: &config.synthetic_name_prefix,
            mode: config.synthetic_names,
            base: Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()),
            ordinal: 0,
        }
    }

    fn next(&mut self, tag: &str) -> String {
        let token = match self.mode {
            SyntheticNames::Deterministic => {
                Uuid::new_v5(&self.base, format!("{tag}:{}", self.ordinal).as_bytes())
            }
            SyntheticNames::Random => Uuid::new_v4(),
        };
        self.ordinal += 1;
        let hex = token.simple().to_string();
        format!("{}{tag}_{}", self.prefix, &hex[..8])
    }
}
