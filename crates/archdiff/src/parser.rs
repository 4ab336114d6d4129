//! Arch parser built on quick-xml's pull reader.
//!
//! Blank text is dropped and meaningful text is kept as written. Trees
//! compare text without its surrounding whitespace, so two arches that only
//! differ in indentation parse to equal trees.

use crate::ArchNode;
use archdiff_core::{ArchError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Parse an arch document with exactly one root element.
pub fn parse_arch(xml: &str) -> Result<ArchNode> {
    let mut reader = Reader::from_str(xml);
    // Text is normalized per node once it is complete
    reader.config_mut().trim_text(false);

    let mut stack: Vec<ArchNode> = Vec::new();
    let mut root: Option<ArchNode> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            ArchError::Parse(format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(ref e) => {
                if stack.is_empty() && root.is_some() {
                    return Err(ArchError::Parse("multiple root elements".to_string()));
                }
                stack.push(element_from(e)?);
            }
            Event::Empty(ref e) => {
                let node = element_from(e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let mut node = stack
                    .pop()
                    .ok_or_else(|| ArchError::Parse("unexpected closing tag".to_string()))?;
                finish_text(&mut node);
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| ArchError::Parse(err.to_string()))?;
                push_text(&mut stack, &text)?;
            }
            Event::CData(e) => {
                let text = String::from_utf8(e.into_inner().into_owned())
                    .map_err(|err| ArchError::Parse(err.to_string()))?;
                push_text(&mut stack, &text)?;
            }
            Event::Eof => break,
            // Comments, processing instructions, declaration, doctype
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ArchError::Parse(format!("unclosed element <{}>", open.tag)));
    }
    root.ok_or_else(|| ArchError::Parse("no root element".to_string()))
}

fn element_from(start: &BytesStart<'_>) -> Result<ArchNode> {
    let tag = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| ArchError::Parse(e.to_string()))?
        .to_string();
    let mut node = ArchNode::element(tag);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| ArchError::Parse(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| ArchError::Parse(e.to_string()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| ArchError::Parse(e.to_string()))?
            .into_owned();
        node.attrs.insert(key, value);
    }
    Ok(node)
}

fn attach(stack: &mut [ArchNode], root: &mut Option<ArchNode>, node: ArchNode) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_some() => {
            return Err(ArchError::Parse("multiple root elements".to_string()));
        }
        None => *root = Some(node),
    }
    Ok(())
}

/// Text belongs to the open element until it has a child, then to the tail
/// of its last child.
fn push_text(stack: &mut [ArchNode], text: &str) -> Result<()> {
    let Some(parent) = stack.last_mut() else {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err(ArchError::Parse(format!(
            "text outside the root element: {:?}",
            text.trim()
        )));
    };
    let slot = match parent.children.last_mut() {
        Some(child) => &mut child.tail,
        None => &mut parent.text,
    };
    slot.get_or_insert_with(String::new).push_str(text);
    Ok(())
}

/// Blank text and tails are dropped, the rest is kept verbatim.
fn finish_text(node: &mut ArchNode) {
    node.text = non_blank(node.text.take());
    for child in &mut node.children {
        child.tail = non_blank(child.tail.take());
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}
