//! Flatten an arch into comparable lines.
//!
//! Every element becomes an opening line carrying its ancestry, its name and
//! its text, then one pseudo-element per attribute, then its children, then a
//! closing line. Two lines are equal exactly when the elements they stand for
//! are interchangeable at that place in the tree, which is what the line diff
//! relies on.

use crate::identify::to_xpath;
use crate::moves::MovedFields;
use crate::{ArchNode, SYNTHETIC_ROOT};
use archdiff_core::NormalizeConfig;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Open,
    Close,
    Attribute,
    AttributeClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchLine {
    pub text: String,
    pub kind: LineKind,
    /// `arch_id` of the element the line belongs to.
    pub node: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ArchLines {
    pub lines: Vec<ArchLine>,
}

impl ArchLines {
    pub fn texts(&self) -> Vec<&str> {
        self.lines.iter().map(|line| line.text.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Element opened by line `index`, if it is an opening line.
    pub fn opened_at(&self, index: usize) -> Option<usize> {
        let line = self.lines.get(index)?;
        match line.kind {
            LineKind::Open => line.node,
            _ => None,
        }
    }
}

impl fmt::Display for ArchLines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", line.text)?;
        }
        Ok(())
    }
}

/// Lines of everything below the document node `root`.
pub fn arch_lines(
    root: &ArchNode,
    moved: Option<&MovedFields>,
    config: &NormalizeConfig,
) -> ArchLines {
    let mut walker = Walker {
        root,
        moved,
        config,
        out: ArchLines::default(),
    };
    let mut path = Vec::new();
    for (index, child) in root.children.iter().enumerate() {
        path.push(index);
        walker.visit(child, &mut path, "");
        path.pop();
    }
    walker.out
}

/// Line form of an arch, one element per line.
pub fn stringify(arch: &ArchNode, moved: Option<&MovedFields>, config: &NormalizeConfig) -> String {
    if arch.tag == SYNTHETIC_ROOT {
        return arch_lines(arch, moved, config).to_string();
    }
    let root = ArchNode::synthetic_root(arch.clone());
    arch_lines(&root, moved, config).to_string()
}

struct Walker<'a> {
    root: &'a ArchNode,
    moved: Option<&'a MovedFields>,
    config: &'a NormalizeConfig,
    out: ArchLines,
}

impl Walker<'_> {
    fn visit(&mut self, node: &ArchNode, path: &mut Vec<usize>, ancestry: &str) {
        let mut segment = format!("{ancestry}/{}", node.tag);
        if let Some(name) = node.name() {
            segment.push_str(&format!("[@name={}]", escape(name)));
        }

        let mut open = segment.clone();
        if let Some(text) = marker(node.text_content()) {
            open.push_str(&format!("[@text={text}]"));
        }
        if let Some(tail) = marker(node.tail_content()) {
            open.push_str(&format!("[@tail={tail}]"));
        }
        if self.is_moved_here(node, path) {
            open.push_str("[@moved]");
        }
        self.push(open, LineKind::Open, node.arch_id);

        if node.tag != "attribute" && node.tag != "attributes" {
            let mut keys: Vec<&String> = node.attrs.keys().collect();
            keys.sort_by(|a, b| b.cmp(a));
            for key in keys {
                let attr_path = format!("{segment}/attribute[@name={}]", escape(key));
                let mut line = attr_path.clone();
                if let Some(value) = marker(node.attrs.get(key).map(String::as_str)) {
                    line.push_str(&format!("[@text={value}]"));
                }
                self.push(line, LineKind::Attribute, node.arch_id);
                self.push(
                    format!("{attr_path}[@closed]"),
                    LineKind::AttributeClose,
                    node.arch_id,
                );
            }
        }

        for (index, child) in node.children.iter().enumerate() {
            path.push(index);
            self.visit(child, path, &segment);
            path.pop();
        }

        self.push(format!("{segment}[@closed]"), LineKind::Close, node.arch_id);
    }

    /// A field is marked only where its xpath is the recorded destination,
    /// so a same-named field elsewhere keeps its plain line.
    fn is_moved_here(&self, node: &ArchNode, path: &[usize]) -> bool {
        let (Some(moved), Some(name)) = (self.moved, node.name()) else {
            return false;
        };
        let Some(field) = moved.get(name) else {
            return false;
        };
        if node.tag != field.tag {
            return false;
        }
        to_xpath(self.root, path, self.config)
            .map(|xpath| xpath.to_string() == field.new_xpath)
            .unwrap_or(false)
    }

    fn push(&mut self, text: String, kind: LineKind, node: Option<usize>) {
        self.out.lines.push(ArchLine { text, kind, node });
    }
}

/// Text worth recording on a line; blank text is not.
fn marker(text: Option<&str>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty()).map(escape)
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}
