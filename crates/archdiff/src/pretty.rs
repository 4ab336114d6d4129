//! Indentation of a tree for readable output.
//!
//! Whitespace-only text and tails are replaced by newline-plus-indent
//! strings, including the tail of a last child, which lines up the parent's
//! closing tag. Elements holding meaningful text between their children are
//! mixed content and keep their text, tails and subtree as written. Leaves
//! keep their text untouched.

use crate::ArchNode;

/// Re-indent `root` in place, `width` spaces per level.
pub fn indent_tree(root: &mut ArchNode, width: usize) {
    indent_node(root, 0, width);
}

fn indent_node(node: &mut ArchNode, level: usize, width: usize) {
    if node.children.is_empty() || is_mixed(node) {
        return;
    }
    let child_indent = format!("\n{}", " ".repeat(width * (level + 1)));
    let close_indent = format!("\n{}", " ".repeat(width * level));

    node.text = Some(child_indent.clone());
    let last = node.children.len() - 1;
    for (index, child) in node.children.iter_mut().enumerate() {
        indent_node(child, level + 1, width);
        let next = if index == last {
            &close_indent
        } else {
            &child_indent
        };
        child.tail = Some(next.clone());
    }
}

fn is_mixed(node: &ArchNode) -> bool {
    node.text_content().is_some() || node.children.iter().any(|c| c.tail_content().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_arch;
    use crate::writer::to_xml_string;

    fn pretty(xml: &str, width: usize) -> String {
        let mut tree = parse_arch(xml).unwrap();
        indent_tree(&mut tree, width);
        to_xml_string(&tree).unwrap()
    }

    #[test]
    fn test_nested_indentation() {
        assert_eq!(
            pretty(r#"<data><xpath expr="//a" position="after"><field name="b"/></xpath></data>"#, 2),
            "<data>\n  <xpath expr=\"//a\" position=\"after\">\n    <field name=\"b\"/>\n  </xpath>\n</data>"
        );
    }

    #[test]
    fn test_mixed_content_kept_as_written() {
        assert_eq!(
            pretty("<div>Read <b>x</b> first</div>", 2),
            "<div>Read <b>x</b> first</div>"
        );
        assert_eq!(
            pretty(r#"<form><p>Read <b>x</b> first</p><field name="a"/></form>"#, 2),
            "<form>\n  <p>Read <b>x</b> first</p>\n  <field name=\"a\"/>\n</form>"
        );
    }

    #[test]
    fn test_width() {
        assert_eq!(pretty("<a><b/></a>", 4), "<a>\n    <b/>\n</a>");
    }

    #[test]
    fn test_indentation_does_not_change_the_tree() {
        let xml = r#"<form><group>Label<field name="a"/>tail</group><p>leaf text</p></form>"#;
        let mut tree = parse_arch(xml).unwrap();
        indent_tree(&mut tree, 2);
        let reparsed = parse_arch(&to_xml_string(&tree).unwrap()).unwrap();
        assert_eq!(reparsed, parse_arch(xml).unwrap());
    }
}
