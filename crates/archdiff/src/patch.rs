//! Patch model: an ordered list of xpath operations.
//!
//! The xml form is a `<data>` element holding one
//! `<xpath expr="..." position="...">` element per operation, whose children
//! are the operation's content.

use crate::ArchNode;
use archdiff_core::{ArchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Replace,
    Before,
    After,
    Inside,
    Attributes,
    /// Only valid on a placeholder nested in another operation's content.
    Move,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Replace => "replace",
            Position::Before => "before",
            Position::After => "after",
            Position::Inside => "inside",
            Position::Attributes => "attributes",
            Position::Move => "move",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = ArchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "replace" => Ok(Position::Replace),
            "before" => Ok(Position::Before),
            "after" => Ok(Position::After),
            "inside" => Ok(Position::Inside),
            "attributes" => Ok(Position::Attributes),
            "move" => Ok(Position::Move),
            other => Err(ArchError::InvalidPatch(format!("unknown position {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XPathOp {
    pub expr: String,
    pub position: Position,
    #[serde(default)]
    pub content: Vec<ArchNode>,
}

impl XPathOp {
    pub fn new(expr: impl Into<String>, position: Position) -> Self {
        Self {
            expr: expr.into(),
            position,
            content: Vec::new(),
        }
    }

    pub fn with_content(mut self, content: Vec<ArchNode>) -> Self {
        self.content = content;
        self
    }

    /// Placeholder standing for the node at `expr`, moved into the content
    /// of an enclosing operation.
    pub fn move_placeholder(expr: &str) -> ArchNode {
        ArchNode::element("xpath")
            .with_attr("expr", expr)
            .with_attr("position", Position::Move.as_str())
    }

    pub fn is_move_placeholder(node: &ArchNode) -> bool {
        node.tag == "xpath"
            && node.attr("position") == Some(Position::Move.as_str())
            && node.attr("expr").is_some()
    }

    pub fn to_arch(&self) -> ArchNode {
        ArchNode::element("xpath")
            .with_attr("expr", self.expr.as_str())
            .with_attr("position", self.position.as_str())
            .with_children(self.content.clone())
    }

    pub fn from_arch(node: &ArchNode) -> Result<Self> {
        if node.tag != "xpath" {
            return Err(ArchError::InvalidPatch(format!(
                "expected <xpath>, found <{}>",
                node.tag
            )));
        }
        let expr = node
            .attr("expr")
            .ok_or_else(|| ArchError::InvalidPatch("<xpath> without expr".to_string()))?;
        let position = node.attr("position").unwrap_or("inside").parse()?;
        Ok(Self {
            expr: expr.to_string(),
            position,
            content: node.children.iter().map(ArchNode::without_ids).collect(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub ops: Vec<XPathOp>,
}

impl Patch {
    pub fn new(ops: Vec<XPathOp>) -> Self {
        Self { ops }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn to_arch(&self) -> ArchNode {
        ArchNode::element("data").with_children(self.ops.iter().map(XPathOp::to_arch).collect())
    }

    pub fn from_arch(node: &ArchNode) -> Result<Self> {
        if node.tag != "data" {
            return Err(ArchError::InvalidPatch(format!(
                "expected <data>, found <{}>",
                node.tag
            )));
        }
        let ops = node
            .children
            .iter()
            .map(XPathOp::from_arch)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ops })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ArchError::Serialize(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ArchError::InvalidPatch(e.to_string()))
    }
}
