//! The xpath subset used by patches.
//!
//! Location paths are `//step/step/...` or `/step/...`, where a step is a tag
//! (or `*`) followed by predicates: `[@name='v']`, `[not(@name)]` and a
//! 1-based position `[n]`. Predicates filter in order, so a position counts
//! within the siblings the previous predicates kept.

use crate::ArchNode;
use archdiff_core::{ArchError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\*|[A-Za-z_][\w.\-:]*)$").unwrap());
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^@name\s*=\s*(?:'([^']*)'|"([^"]*)")$"#).unwrap());
static UNNAMED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^not\(\s*@name\s*\)$").unwrap());
static POSITION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9][0-9]*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// `//`: the first step may match at any depth.
    Descendant,
    /// `/`: the first step matches children of the document root.
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Name(String),
    Unnamed,
    Position(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub tag: String,
    pub predicates: SmallVec<[Predicate; 2]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationPath {
    pub axis: Axis,
    pub steps: Vec<Step>,
}

/// Quote a predicate value, or `None` when it holds both quote kinds.
pub fn quote(value: &str) -> Option<String> {
    if !value.contains('\'') {
        Some(format!("'{value}'"))
    } else if !value.contains('"') {
        Some(format!("\"{value}\""))
    } else {
        None
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Name(name) => match quote(name) {
                Some(quoted) => write!(f, "[@name={quoted}]"),
                None => Err(fmt::Error),
            },
            Predicate::Unnamed => write!(f, "[not(@name)]"),
            Predicate::Position(n) => write!(f, "[{n}]"),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)?;
        for predicate in &self.predicates {
            write!(f, "{predicate}")?;
        }
        Ok(())
    }
}

impl fmt::Display for LocationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.axis {
            Axis::Descendant => write!(f, "//")?,
            Axis::Root => write!(f, "/")?,
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

impl FromStr for LocationPath {
    type Err = ArchError;

    fn from_str(expr: &str) -> Result<Self> {
        let invalid = || ArchError::InvalidExpression(expr.to_string());
        let trimmed = expr.trim();
        let (axis, body) = if let Some(rest) = trimmed.strip_prefix("//") {
            (Axis::Descendant, rest)
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            (Axis::Root, rest)
        } else {
            return Err(invalid());
        };

        let steps = split_steps(body)
            .ok_or_else(invalid)?
            .into_iter()
            .map(|raw| parse_step(raw).ok_or_else(invalid))
            .collect::<Result<Vec<_>>>()?;
        if steps.is_empty() {
            return Err(invalid());
        }
        Ok(LocationPath { axis, steps })
    }
}

/// Split on `/` outside brackets and quotes.
fn split_steps(body: &str) -> Option<Vec<&str>> {
    let mut steps = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.checked_sub(1)?,
            (None, '/') if depth == 0 => {
                steps.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || quote.is_some() {
        return None;
    }
    steps.push(&body[start..]);
    Some(steps)
}

fn parse_step(raw: &str) -> Option<Step> {
    let bracket = raw.find('[').unwrap_or(raw.len());
    let tag = raw[..bracket].trim();
    if !TAG_RE.is_match(tag) {
        return None;
    }

    let mut predicates = SmallVec::new();
    let mut rest = &raw[bracket..];
    while !rest.is_empty() {
        let inner_end = closing_bracket(rest)?;
        let inner = rest[1..inner_end].trim();
        predicates.push(parse_predicate(inner)?);
        rest = rest[inner_end + 1..].trim_start();
    }
    Some(Step {
        tag: tag.to_string(),
        predicates,
    })
}

/// Index of the `]` closing the `[` at the start of `s`.
fn closing_bracket(s: &str) -> Option<usize> {
    if !s.starts_with('[') {
        return None;
    }
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_predicate(inner: &str) -> Option<Predicate> {
    if let Some(caps) = NAME_RE.captures(inner) {
        let value = caps.get(1).or_else(|| caps.get(2))?.as_str();
        return Some(Predicate::Name(value.to_string()));
    }
    if UNNAMED_RE.is_match(inner) {
        return Some(Predicate::Unnamed);
    }
    if POSITION_RE.is_match(inner) {
        return inner.parse().ok().map(Predicate::Position);
    }
    None
}

impl Step {
    /// Children of `parent` selected by this step, as child indexes.
    fn select(&self, parent: &ArchNode) -> Vec<usize> {
        let mut selected: Vec<usize> = parent
            .children
            .iter()
            .enumerate()
            .filter(|(_, child)| self.tag == "*" || child.tag == self.tag)
            .map(|(i, _)| i)
            .collect();

        for predicate in &self.predicates {
            selected = match predicate {
                Predicate::Name(name) => selected
                    .into_iter()
                    .filter(|&i| parent.children[i].name() == Some(name.as_str()))
                    .collect(),
                Predicate::Unnamed => selected
                    .into_iter()
                    .filter(|&i| parent.children[i].name().is_none())
                    .collect(),
                Predicate::Position(n) => selected.get(n - 1).copied().into_iter().collect(),
            };
        }
        selected
    }
}

impl LocationPath {
    /// Paths of every node matched under `root`, in document order. `root`
    /// is the document node and is never matched itself.
    pub fn evaluate(&self, root: &ArchNode) -> Vec<Vec<usize>> {
        let mut contexts: Vec<Vec<usize>> = match self.axis {
            Axis::Root => vec![Vec::new()],
            Axis::Descendant => root.preorder().into_iter().map(|(path, _)| path).collect(),
        };

        for step in &self.steps {
            let mut next = Vec::new();
            for context in &contexts {
                let Some(node) = root.get(context) else {
                    continue;
                };
                for index in step.select(node) {
                    let mut path = context.clone();
                    path.push(index);
                    next.push(path);
                }
            }
            contexts = next;
        }

        contexts.sort();
        contexts.dedup();
        contexts
    }
}

/// Path of the single node `expr` designates under `root`.
pub fn locate_unique(root: &ArchNode, expr: &str) -> Result<Vec<usize>> {
    let path: LocationPath = expr.parse()?;
    let mut matches = path.evaluate(root);
    match matches.len() {
        0 => Err(ArchError::TargetNotFound(expr.to_string())),
        1 => Ok(matches.remove(0)),
        n => Err(ArchError::AmbiguousLocation {
            expr: expr.to_string(),
            matches: n,
        }),
    }
}
