//! Patch application.
//!
//! Operations run in order against the arch wrapped in a document node, each
//! one seeing the result of the previous ones. Move placeholders inside an
//! operation's content are detached from the tree before the content lands.

use crate::patch::{Patch, Position, XPathOp};
use crate::writer::to_xml_string;
use crate::xpath::locate_unique;
use crate::{parse_arch, ArchNode};
use archdiff_core::{ArchError, Result};
use tracing::trace;

/// Apply `patch` to `arch` and return the patched arch.
pub fn apply_patch(arch: &ArchNode, patch: &Patch) -> Result<ArchNode> {
    let mut root = ArchNode::synthetic_root(arch.without_ids());
    for op in &patch.ops {
        // Renumber so content inserted by earlier operations can be tracked
        root.assign_ids(0);
        apply_op(&mut root, op)?;
    }

    let mut top = std::mem::take(&mut root.children);
    if top.len() != 1 {
        return Err(ArchError::InvalidPatch(format!(
            "patched arch has {} root elements",
            top.len()
        )));
    }
    Ok(top.remove(0).without_ids())
}

/// Parse, patch and serialize.
pub fn apply_patch_str(arch: &str, patch: &str) -> Result<String> {
    let arch = parse_arch(arch)?;
    let patch = Patch::from_arch(&parse_arch(patch)?)?;
    to_xml_string(&apply_patch(&arch, &patch)?)
}

fn apply_op(root: &mut ArchNode, op: &XPathOp) -> Result<()> {
    trace!(expr = %op.expr, position = %op.position, "applying operation");
    let path = locate_unique(root, &op.expr)?;

    match op.position {
        Position::Attributes => {
            let node = root
                .get_mut(&path)
                .ok_or_else(|| ArchError::TargetNotFound(op.expr.clone()))?;
            apply_attributes(node, &op.content)
        }
        Position::Move => Err(ArchError::InvalidPatch(format!(
            "move of {} outside of an operation's content",
            op.expr
        ))),
        position => {
            let target = root
                .get(&path)
                .and_then(|node| node.arch_id)
                .ok_or_else(|| ArchError::TargetNotFound(op.expr.clone()))?;
            let mut content = Vec::with_capacity(op.content.len());
            for node in &op.content {
                if XPathOp::is_move_placeholder(node) {
                    content.push(take_moved(root, node)?);
                } else {
                    let mut node = node.clone();
                    materialize_moves(root, &mut node)?;
                    content.push(node);
                }
            }
            // Detaching moved nodes may have shifted the target
            let path = root
                .find_path(target)
                .ok_or_else(|| ArchError::TargetNotFound(op.expr.clone()))?;
            insert_content(root, &path, position, content)
        }
    }
}

/// Replace nested move placeholders below `node`, in document order.
fn materialize_moves(root: &mut ArchNode, node: &mut ArchNode) -> Result<()> {
    for index in 0..node.children.len() {
        if XPathOp::is_move_placeholder(&node.children[index]) {
            let moved = take_moved(root, &node.children[index])?;
            node.children[index] = moved;
        } else {
            materialize_moves(root, &mut node.children[index])?;
        }
    }
    Ok(())
}

fn take_moved(root: &mut ArchNode, placeholder: &ArchNode) -> Result<ArchNode> {
    let expr = placeholder
        .attr("expr")
        .ok_or_else(|| ArchError::InvalidPatch("move without expr".to_string()))?;
    let path = locate_unique(root, expr)?;
    if path.is_empty() {
        return Err(ArchError::InvalidPatch(format!("cannot move {expr}")));
    }
    root.remove_at(&path)
        .ok_or_else(|| ArchError::TargetNotFound(expr.to_string()))
}

/// Insert `content` relative to the node at `path`.
pub(crate) fn insert_content(
    root: &mut ArchNode,
    path: &[usize],
    position: Position,
    content: Vec<ArchNode>,
) -> Result<()> {
    if position == Position::Inside {
        let node = root
            .get_mut(path)
            .ok_or_else(|| ArchError::TargetNotFound(format!("{path:?}")))?;
        node.children.extend(content);
        return Ok(());
    }

    let Some((&index, parent_path)) = path.split_last() else {
        return Err(ArchError::InvalidPatch(format!(
            "cannot {position} the document node"
        )));
    };
    let start = match position {
        Position::Before => index,
        Position::After => index + 1,
        Position::Replace => {
            root.remove_at(path)
                .ok_or_else(|| ArchError::TargetNotFound(format!("{path:?}")))?;
            index
        }
        other => {
            return Err(ArchError::InvalidPatch(format!(
                "{other} does not insert content"
            )))
        }
    };
    let parent = root
        .get_mut(parent_path)
        .ok_or_else(|| ArchError::TargetNotFound(format!("{parent_path:?}")))?;
    let at = start.min(parent.children.len());
    parent.children.splice(at..at, content);
    Ok(())
}

/// Set or remove attributes from `<attribute name="k">v</attribute>`
/// children. Values are trimmed and an empty value removes the attribute.
pub(crate) fn apply_attributes(node: &mut ArchNode, content: &[ArchNode]) -> Result<()> {
    for item in content {
        if item.tag != "attribute" {
            return Err(ArchError::InvalidPatch(format!(
                "expected <attribute>, found <{}>",
                item.tag
            )));
        }
        let key = item
            .name()
            .ok_or_else(|| ArchError::InvalidPatch("<attribute> without name".to_string()))?;
        match item.text_content() {
            Some(value) => {
                node.attrs.insert(key.to_string(), value.to_string());
            }
            None => {
                node.attrs.shift_remove(key);
            }
        }
    }
    Ok(())
}
