//! Node identification and xpath building.
//!
//! A node is identified among its siblings by its `name` when that name is
//! usable and unique for its tag, otherwise by a 1-based position among the
//! siblings that share its tag (and its name, or its lack of one). An xpath
//! is the chain of those identifiers from the top element down, unless the
//! node's name is unique for its tag in the whole document.

use crate::xpath::{quote, Axis, LocationPath, Predicate, Step};
use crate::ArchNode;
use archdiff_core::NormalizeConfig;
use smallvec::SmallVec;

/// Identify `siblings[index]` among its siblings.
pub fn identify(siblings: &[ArchNode], index: usize, config: &NormalizeConfig) -> Step {
    let node = &siblings[index];
    let mut predicates = SmallVec::new();

    let position_in = |keep: &dyn Fn(&ArchNode) -> bool| -> usize {
        siblings[..index]
            .iter()
            .filter(|s| s.tag == node.tag && keep(s))
            .count()
            + 1
    };

    match node.name() {
        Some(name) if quote(name).is_some() => {
            let same_name = |s: &ArchNode| s.name() == Some(name);
            let occurrences = siblings
                .iter()
                .filter(|s| s.tag == node.tag && same_name(s))
                .count();
            predicates.push(Predicate::Name(name.to_string()));
            if occurrences > 1 || !config.has_identifying_name(&node.tag) {
                predicates.push(Predicate::Position(position_in(&same_name)));
            }
        }
        // A name that cannot be quoted only leaves the position
        Some(_) => predicates.push(Predicate::Position(position_in(&|_: &ArchNode| true))),
        None => {
            let named_peers = siblings
                .iter()
                .any(|s| s.tag == node.tag && s.name().is_some());
            if named_peers {
                predicates.push(Predicate::Unnamed);
                predicates.push(Predicate::Position(position_in(&|s: &ArchNode| {
                    s.name().is_none()
                })));
            } else {
                predicates.push(Predicate::Position(position_in(&|_: &ArchNode| true)));
            }
        }
    }

    Step {
        tag: node.tag.clone(),
        predicates,
    }
}

/// Xpath of the node at `path` under the document node `root`. Falls back to
/// an absolute path when the `//` form would match more than one node.
pub fn to_xpath(root: &ArchNode, path: &[usize], config: &NormalizeConfig) -> Option<LocationPath> {
    let target = root.get(path)?;
    if path.is_empty() {
        return None;
    }

    if let Some(name) = target.name() {
        if quote(name).is_some() && root.count_named(&target.tag, name) == 1 {
            let mut predicates = SmallVec::new();
            predicates.push(Predicate::Name(name.to_string()));
            return Some(LocationPath {
                axis: Axis::Descendant,
                steps: vec![Step {
                    tag: target.tag.clone(),
                    predicates,
                }],
            });
        }
    }

    let mut steps = Vec::with_capacity(path.len());
    for depth in 0..path.len() {
        let parent = root.get(&path[..depth])?;
        steps.push(identify(&parent.children, path[depth], config));
    }
    let mut xpath = LocationPath {
        axis: Axis::Descendant,
        steps,
    };
    // The chain can also match below a nested element with the same tags
    if xpath.evaluate(root).len() != 1 {
        xpath.axis = Axis::Root;
    }
    Some(xpath)
}
