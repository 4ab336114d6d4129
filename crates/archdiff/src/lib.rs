//! View arch normalization
//!
//! This crate computes the minimal set of xpath edit operations that turns a
//! base view arch into a customized one, so a customization layer stays small
//! and reviewable instead of re-serializing the whole tree on every edit.

use ahash::AHashMap;
use archdiff_core::NormalizeConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub mod apply;
pub mod compiler;
pub mod identify;
pub mod moves;
pub mod parser;
pub mod patch;
pub mod pretty;
pub mod seqdiff;
pub mod stringify;
pub mod writer;
pub mod xpath;

#[cfg(feature = "python")]
mod python;

pub use apply::{apply_patch, apply_patch_str};
pub use archdiff_core::{ArchError, Result};
pub use compiler::{ArchNormalizer, Normalized};
pub use parser::parse_arch;
pub use patch::{Patch, Position, XPathOp};

/// Tag of the wrapper element placed around an arch during compilation and
/// replay. It never appears in generated xpaths.
pub(crate) const SYNTHETIC_ROOT: &str = "__arch_root__";

fn significant(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// One element of a view arch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchNode {
    pub tag: String,
    pub attrs: IndexMap<String, String>,
    pub text: Option<String>,
    /// Text following the closing tag, up to the next sibling.
    pub tail: Option<String>,
    pub children: Vec<ArchNode>,
    /// Per-invocation handle used to find a node again after the tree was
    /// edited around it.
    #[serde(skip)]
    pub arch_id: Option<usize>,
}

/// Text and tail compare without their surrounding whitespace.
impl PartialEq for ArchNode {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
            && self.attrs == other.attrs
            && self.text_content() == other.text_content()
            && self.tail_content() == other.tail_content()
            && self.children == other.children
    }
}

impl Eq for ArchNode {}

impl ArchNode {
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: IndexMap::new(),
            text: None,
            tail: None,
            children: Vec::new(),
            arch_id: None,
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_tail(mut self, tail: impl Into<String>) -> Self {
        self.tail = Some(tail.into());
        self
    }

    /// Text with surrounding whitespace removed, `None` when blank.
    pub fn text_content(&self) -> Option<&str> {
        significant(self.text.as_deref())
    }

    /// Tail with surrounding whitespace removed, `None` when blank.
    pub fn tail_content(&self) -> Option<&str> {
        significant(self.tail.as_deref())
    }

    pub fn with_child(mut self, child: ArchNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: Vec<ArchNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_arch_id(mut self, id: usize) -> Self {
        self.arch_id = Some(id);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.attrs.get("name").map(String::as_str)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Copy of this node without its children.
    pub fn shallow_clone(&self) -> Self {
        Self {
            tag: self.tag.clone(),
            attrs: self.attrs.clone(),
            text: self.text.clone(),
            tail: self.tail.clone(),
            children: Vec::new(),
            arch_id: self.arch_id,
        }
    }

    /// Deep copy with every `arch_id` cleared.
    pub fn without_ids(&self) -> Self {
        Self {
            tag: self.tag.clone(),
            attrs: self.attrs.clone(),
            text: self.text.clone(),
            tail: self.tail.clone(),
            children: self.children.iter().map(ArchNode::without_ids).collect(),
            arch_id: None,
        }
    }

    /// Number assigned to every node in document order, starting at `next`.
    /// Returns the first unused number.
    pub fn assign_ids(&mut self, next: usize) -> usize {
        self.arch_id = Some(next);
        let mut next = next + 1;
        for child in &mut self.children {
            next = child.assign_ids(next);
        }
        next
    }

    pub fn get(&self, path: &[usize]) -> Option<&ArchNode> {
        let mut current = self;
        for &index in path {
            current = current.children.get(index)?;
        }
        Some(current)
    }

    pub fn get_mut(&mut self, path: &[usize]) -> Option<&mut ArchNode> {
        let mut current = self;
        for &index in path {
            current = current.children.get_mut(index)?;
        }
        Some(current)
    }

    /// Path of the node carrying `id`, searching this subtree.
    pub fn find_path(&self, id: usize) -> Option<Vec<usize>> {
        if self.arch_id == Some(id) {
            return Some(Vec::new());
        }
        for (index, child) in self.children.iter().enumerate() {
            if let Some(mut path) = child.find_path(id) {
                path.insert(0, index);
                return Some(path);
            }
        }
        None
    }

    pub fn find(&self, id: usize) -> Option<&ArchNode> {
        self.find_path(id).and_then(|path| self.get(&path))
    }

    /// Detach the node at a non-empty `path`.
    pub fn remove_at(&mut self, path: &[usize]) -> Option<ArchNode> {
        let (&index, parent_path) = path.split_last()?;
        let parent = self.get_mut(parent_path)?;
        if index < parent.children.len() {
            Some(parent.children.remove(index))
        } else {
            None
        }
    }

    /// Insert `node` as child `index` of the node at `parent_path`; an index
    /// past the end appends.
    pub fn insert_at(&mut self, parent_path: &[usize], index: usize, node: ArchNode) -> bool {
        match self.get_mut(parent_path) {
            Some(parent) => {
                let at = index.min(parent.children.len());
                parent.children.insert(at, node);
                true
            }
            None => false,
        }
    }

    /// Every node of this subtree in document order, with its path.
    pub fn preorder(&self) -> Vec<(Vec<usize>, &ArchNode)> {
        let mut out = Vec::new();
        let mut stack = vec![(Vec::new(), self)];
        while let Some((path, node)) = stack.pop() {
            for (index, child) in node.children.iter().enumerate().rev() {
                let mut child_path = path.clone();
                child_path.push(index);
                stack.push((child_path, child));
            }
            out.push((path, node));
        }
        out
    }

    /// Number of elements with this tag and `name` in the subtree.
    pub fn count_named(&self, tag: &str, name: &str) -> usize {
        let own = usize::from(self.tag == tag && self.name() == Some(name));
        own + self
            .children
            .iter()
            .map(|c| c.count_named(tag, name))
            .sum::<usize>()
    }

    /// Path of every node carrying an id, keyed by that id.
    pub fn id_paths(&self) -> AHashMap<usize, Vec<usize>> {
        self.preorder()
            .into_iter()
            .filter_map(|(path, node)| node.arch_id.map(|id| (id, path)))
            .collect()
    }

    pub(crate) fn synthetic_root(child: ArchNode) -> Self {
        ArchNode::element(SYNTHETIC_ROOT).with_child(child)
    }
}

/// Compile the patch turning `old_arch` into `new_arch` and serialize it,
/// using the default configuration.
pub fn normalize(old_arch: &str, new_arch: &str) -> Result<String> {
    let normalizer = ArchNormalizer::new(NormalizeConfig::shared().clone());
    normalizer.compile(old_arch, new_arch)?.to_xml()
}
