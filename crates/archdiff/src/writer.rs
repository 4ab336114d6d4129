//! Arch serialization through quick-xml's writer.

use crate::ArchNode;
use archdiff_core::{ArchError, Result};
use quick_xml::escape::partial_escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::Writer;
use std::borrow::Cow;

/// Serialize a tree, escaping attribute values and text.
pub fn to_xml_string(node: &ArchNode) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    write_node(&mut writer, node)?;
    String::from_utf8(writer.into_inner()).map_err(serialize_error)
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &ArchNode) -> Result<()> {
    let mut start = BytesStart::new(node.tag.as_str());
    for (key, value) in &node.attrs {
        // Apostrophes stay literal so xpath expressions remain readable
        let escaped = partial_escape(value).replace('"', "&quot;");
        start.push_attribute(Attribute {
            key: QName(key.as_bytes()),
            value: Cow::Owned(escaped.into_bytes()),
        });
    }

    if node.children.is_empty() && node.text.is_none() {
        writer
            .write_event(Event::Empty(start))
            .map_err(serialize_error)?;
    } else {
        writer
            .write_event(Event::Start(start))
            .map_err(serialize_error)?;
        if let Some(text) = &node.text {
            writer
                .write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))
                .map_err(serialize_error)?;
        }
        for child in &node.children {
            write_node(writer, child)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(node.tag.as_str())))
            .map_err(serialize_error)?;
    }

    if let Some(tail) = &node.tail {
        writer
            .write_event(Event::Text(BytesText::from_escaped(partial_escape(tail))))
            .map_err(serialize_error)?;
    }
    Ok(())
}

fn serialize_error<E: std::fmt::Display>(err: E) -> ArchError {
    ArchError::Serialize(err.to_string())
}
