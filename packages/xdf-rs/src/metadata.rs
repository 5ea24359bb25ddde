//! XML metadata of file headers, stream headers and stream footers.
//!
//! The payload is materialized into an [`XmlNode`] tree with quick-xml, then
//! a fixed set of fields is pulled out of it. Optional fields never fail the
//! parse; only malformed XML or a missing required header field does.

use crate::error::{Result, XDFError};
use crate::types::{
    ChannelDescriptor, ChannelFormat, ClockOffset, FileHeader, FooterInfo, Location, StreamInfo,
    XmlNode,
};
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use std::str::FromStr;

/// Parse an XML payload into a tree rooted at its document element.
pub fn parse_xml(content: &[u8], stream_id: Option<u32>) -> Result<XmlNode> {
    let xml_str = String::from_utf8_lossy(content);
    let mut reader = XmlReader::from_str(&xml_str);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    let xml_err = |msg: String| XDFError::metadata(stream_id, msg);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                stack.push(XmlNode::new(name));
            }
            Ok(Event::Empty(e)) => {
                let node = XmlNode::new(String::from_utf8_lossy(e.name().as_ref()).to_string());
                attach(&mut stack, &mut root, node).map_err(xml_err)?;
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| xml_err("Unbalanced closing tag".to_string()))?;
                attach(&mut stack, &mut root, node).map_err(xml_err)?;
            }
            Ok(Event::Text(e)) => {
                let raw = e
                    .decode()
                    .map_err(|err| xml_err(format!("Invalid text encoding: {}", err)))?;
                let text = quick_xml::escape::unescape(&raw)
                    .map_err(|err| xml_err(format!("Invalid escape sequence: {}", err)))?;
                push_text(&mut stack, &text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).to_string();
                push_text(&mut stack, &text);
            }
            Ok(Event::GeneralRef(e)) => {
                let name = e
                    .decode()
                    .map_err(|err| xml_err(format!("Invalid entity reference: {}", err)))?;
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    push_text(&mut stack, &ch.to_string());
                } else if let Some(resolved) = quick_xml::escape::resolve_predefined_entity(&name) {
                    push_text(&mut stack, resolved);
                } else {
                    return Err(xml_err(format!("Unknown entity &{};", name)));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(xml_err(format!(
                    "XML parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(xml_err(format!(
            "Unclosed element <{}>",
            stack.last().map(|n| n.name.as_str()).unwrap_or("")
        )));
    }

    root.ok_or_else(|| xml_err("Empty XML document".to_string()))
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    mut node: XmlNode,
) -> std::result::Result<(), String> {
    // Text arrives in pieces around entity references; trim once the element closes.
    node.text = node
        .text
        .take()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(format!("Multiple root elements (found <{}>)", node.name)),
    }
}

fn push_text(stack: &mut [XmlNode], text: &str) {
    if let Some(node) = stack.last_mut() {
        node.text.get_or_insert_with(String::new).push_str(text);
    }
}

fn field<T: FromStr>(node: &XmlNode, path: &str) -> Option<T> {
    node.text_at(path).and_then(|t| t.parse().ok())
}

fn string_field(node: &XmlNode, path: &str) -> Option<String> {
    node.text_at(path).map(str::to_string)
}

/// Parse a stream header chunk payload.
pub fn parse_stream_header(stream_id: u32, content: &[u8]) -> Result<StreamInfo> {
    let root = parse_xml(content, Some(stream_id))?;
    stream_info_from_tree(stream_id, &root)
}

fn stream_info_from_tree(stream_id: u32, root: &XmlNode) -> Result<StreamInfo> {
    let missing = |name: &str| {
        XDFError::metadata(
            Some(stream_id),
            format!("Stream header is missing required field '{}'", name),
        )
    };

    let channel_count: usize = field(root, "channel_count").ok_or_else(|| missing("channel_count"))?;
    if channel_count == 0 {
        return Err(XDFError::metadata(
            Some(stream_id),
            "Stream header declares zero channels",
        ));
    }

    let format_name = root
        .text_at("channel_format")
        .ok_or_else(|| missing("channel_format"))?;
    let channel_format = ChannelFormat::from_name(format_name).ok_or_else(|| {
        XDFError::metadata(
            Some(stream_id),
            format!("Unsupported channel_format '{}'", format_name),
        )
    })?;

    let nominal_srate: f64 = field(root, "nominal_srate").ok_or_else(|| missing("nominal_srate"))?;
    if !nominal_srate.is_finite() || nominal_srate < 0.0 {
        return Err(XDFError::metadata(
            Some(stream_id),
            format!("Invalid nominal_srate {}", nominal_srate),
        ));
    }

    let desc = root.child("desc").cloned();
    let channels = desc
        .as_ref()
        .map(parse_channel_descriptors)
        .unwrap_or_default();

    if !channels.is_empty() && channels.len() != channel_count {
        log::warn!(
            "Stream {} declares {} channels but describes {}",
            stream_id,
            channel_count,
            channels.len()
        );
    }

    Ok(StreamInfo {
        name: string_field(root, "name").unwrap_or_default(),
        content_type: string_field(root, "type").unwrap_or_default(),
        channel_count,
        channel_format,
        nominal_srate,
        effective_srate: field(root, "effective_srate"),
        source_id: string_field(root, "source_id"),
        hostname: string_field(root, "hostname"),
        created_at: field(root, "created_at"),
        channels,
        desc,
    })
}

/// Extract `channels/channel[]` from a `desc` element. Every sub-field is
/// optional and parsed independently of the others.
pub fn parse_channel_descriptors(desc: &XmlNode) -> Vec<ChannelDescriptor> {
    let Some(channels) = desc.child("channels") else {
        return Vec::new();
    };

    channels
        .children_named("channel")
        .map(|ch| ChannelDescriptor {
            label: string_field(ch, "label"),
            unit: string_field(ch, "unit"),
            channel_type: string_field(ch, "type"),
            location: ch.child("location").and_then(|loc| {
                Some(Location {
                    x: field(loc, "X")?,
                    y: field(loc, "Y")?,
                    z: field(loc, "Z")?,
                })
            }),
        })
        .collect()
}

/// Parse a stream footer chunk payload.
pub fn parse_stream_footer(stream_id: u32, content: &[u8]) -> Result<FooterInfo> {
    let root = parse_xml(content, Some(stream_id))?;

    let clock_offsets = root
        .child("clock_offsets")
        .map(|offsets| {
            offsets
                .children_named("offset")
                .filter_map(|o| {
                    Some(ClockOffset {
                        time: field(o, "time")?,
                        value: field(o, "value")?,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(FooterInfo {
        first_timestamp: field(&root, "first_timestamp"),
        last_timestamp: field(&root, "last_timestamp"),
        sample_count: field(&root, "sample_count"),
        measured_srate: field(&root, "measured_srate"),
        clock_offsets,
    })
}

/// Parse the file header chunk payload.
pub fn parse_file_header(content: &[u8]) -> Result<FileHeader> {
    let root = parse_xml(content, None)?;
    let datetime = string_field(&root, "datetime");
    let created_at = datetime.as_deref().and_then(parse_datetime);

    Ok(FileHeader {
        version: string_field(&root, "version"),
        datetime,
        created_at,
    })
}

/// Recorders write either RFC 3339 or `%Y-%m-%dT%H:%M:%S%z` (no colon in the offset).
fn parse_datetime(raw: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .or_else(|_| chrono::DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
}
