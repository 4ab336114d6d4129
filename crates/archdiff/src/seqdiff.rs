//! Line-based sequence differencing.
//!
//! Myers diff over interned lines. Within a changed hunk removals come before
//! additions, the way `ndiff` reports them.

use ahash::AHashMap;
use similar::{capture_diff_slices, Algorithm, DiffTag};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChange {
    Unchanged { old: usize, new: usize },
    Removed { old: usize },
    Added { new: usize },
}

/// Minimal edit script turning `old` into `new`.
pub fn diff_lines<S: AsRef<str>>(old: &[S], new: &[S]) -> Vec<LineChange> {
    let mut interned: AHashMap<&str, u32> = AHashMap::with_capacity(old.len());
    let mut a = Vec::with_capacity(old.len());
    for line in old {
        let next = interned.len() as u32;
        a.push(*interned.entry(line.as_ref()).or_insert(next));
    }
    let mut b = Vec::with_capacity(new.len());
    for line in new {
        let next = interned.len() as u32;
        b.push(*interned.entry(line.as_ref()).or_insert(next));
    }

    let mut changes = Vec::with_capacity(old.len().max(new.len()));
    let mut added = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, &a, &b) {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            changes.append(&mut added);
            changes.extend(
                old_range
                    .zip(new_range)
                    .map(|(old, new)| LineChange::Unchanged { old, new }),
            );
        } else {
            changes.extend(old_range.map(|old| LineChange::Removed { old }));
            added.extend(new_range.map(|new| LineChange::Added { new }));
        }
    }
    changes.append(&mut added);
    changes
}

/// `ndiff`-style rendering, for debugging and logs.
pub fn render<S: AsRef<str>>(changes: &[LineChange], old: &[S], new: &[S]) -> String {
    let mut out = String::new();
    for change in changes {
        let _ = match *change {
            LineChange::Unchanged { old: i, .. } => writeln!(out, "  {}", old[i].as_ref()),
            LineChange::Removed { old: i } => writeln!(out, "- {}", old[i].as_ref()),
            LineChange::Added { new: j } => writeln!(out, "+ {}", new[j].as_ref()),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(old: &[&str], new: &[&str]) -> String {
        let changes = diff_lines(old, new);
        render(&changes, old, new)
    }

    #[test]
    fn test_identical() {
        let lines = ["a", "b", "c"];
        let changes = diff_lines(&lines, &lines);
        assert!(changes
            .iter()
            .all(|c| matches!(c, LineChange::Unchanged { .. })));
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn test_insert_in_middle() {
        assert_eq!(ops(&["a", "c"], &["a", "b", "c"]), "  a\n+ b\n  c\n");
    }

    #[test]
    fn test_removals_before_additions() {
        assert_eq!(
            ops(&["a", "x", "y", "d"], &["a", "p", "q", "d"]),
            "  a\n- x\n- y\n+ p\n+ q\n  d\n"
        );
    }

    #[test]
    fn test_move_shows_as_remove_and_add() {
        assert_eq!(ops(&["a", "b", "c"], &["b", "c", "a"]), "- a\n  b\n  c\n+ a\n");
    }

    #[test]
    fn test_empty_sides() {
        let empty: [&str; 0] = [];
        assert_eq!(ops(&empty, &["a"]), "+ a\n");
        assert_eq!(ops(&["a"], &empty), "- a\n");
        assert!(diff_lines(&empty, &empty).is_empty());
    }

    #[test]
    fn test_indices_cover_both_sides() {
        let old = ["a", "b", "c", "d", "e"];
        let new = ["a", "c", "x", "e", "f"];
        let changes = diff_lines(&old, &new);
        let mut seen_old = Vec::new();
        let mut seen_new = Vec::new();
        for change in changes {
            match change {
                LineChange::Unchanged { old: o, new: n } => {
                    assert_eq!(old[o], new[n]);
                    seen_old.push(o);
                    seen_new.push(n);
                }
                LineChange::Removed { old: o } => seen_old.push(o),
                LineChange::Added { new: n } => seen_new.push(n),
            }
        }
        assert_eq!(seen_old, vec![0, 1, 2, 3, 4]);
        assert_eq!(seen_new, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_large_input_edited_at_both_ends() {
        let old: Vec<String> = (0..20_000).map(|i| format!("/form/field[@name=f{i}]")).collect();
        let mut new = old.clone();
        new[0] = "/form/field[@name=first]".to_string();
        new[19_999] = "/form/field[@name=last]".to_string();

        let changes = diff_lines(&old, &new);
        let edits: Vec<LineChange> = changes
            .iter()
            .copied()
            .filter(|c| !matches!(c, LineChange::Unchanged { .. }))
            .collect();
        assert_eq!(
            edits,
            vec![
                LineChange::Removed { old: 0 },
                LineChange::Added { new: 0 },
                LineChange::Removed { old: 19_999 },
                LineChange::Added { new: 19_999 },
            ]
        );
        assert_eq!(changes.len(), 20_002);
    }
}
