//! Minimal XDF writer for building test recordings.

#![allow(dead_code)]

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;
use std::path::PathBuf;

pub const FILE_HEADER: u16 = 1;
pub const STREAM_HEADER: u16 = 2;
pub const SAMPLES: u16 = 3;
pub const CLOCK_OFFSET: u16 = 4;
pub const BOUNDARY: u16 = 5;
pub const STREAM_FOOTER: u16 = 6;

pub const BOUNDARY_UUID: [u8; 16] = [
    0x43, 0xA5, 0x46, 0xDC, 0xCB, 0xF5, 0x41, 0x0F, 0xB3, 0x0E, 0xD5, 0x46, 0x73, 0x83, 0xCB, 0xE4,
];

#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub name: String,
    pub content_type: String,
    pub channel_count: usize,
    pub channel_format: String,
    pub nominal_srate: f64,
    pub labels: Vec<String>,
}

impl StreamSpec {
    pub fn new(name: &str, content_type: &str, channels: usize, format: &str, srate: f64) -> Self {
        Self {
            name: name.to_string(),
            content_type: content_type.to_string(),
            channel_count: channels,
            channel_format: format.to_string(),
            nominal_srate: srate,
            labels: Vec::new(),
        }
    }

    pub fn labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) {
    writer.write_event(Event::Start(BytesStart::new(name))).unwrap();
    writer.write_event(Event::Text(BytesText::new(text))).unwrap();
    writer.write_event(Event::End(BytesEnd::new(name))).unwrap();
}

fn header_xml(spec: &StreamSpec) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut writer = Writer::new(&mut buffer);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .unwrap();
    writer.write_event(Event::Start(BytesStart::new("info"))).unwrap();
    text_element(&mut writer, "name", &spec.name);
    text_element(&mut writer, "type", &spec.content_type);
    text_element(&mut writer, "channel_count", &spec.channel_count.to_string());
    text_element(&mut writer, "channel_format", &spec.channel_format);
    text_element(&mut writer, "nominal_srate", &spec.nominal_srate.to_string());
    text_element(&mut writer, "source_id", &format!("{}-source", spec.name));

    if !spec.labels.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("desc"))).unwrap();
        text_element(&mut writer, "manufacturer", "Test & Co");
        writer.write_event(Event::Start(BytesStart::new("channels"))).unwrap();
        for label in &spec.labels {
            writer.write_event(Event::Start(BytesStart::new("channel"))).unwrap();
            text_element(&mut writer, "label", label);
            text_element(&mut writer, "unit", "microvolts");
            writer.write_event(Event::End(BytesEnd::new("channel"))).unwrap();
        }
        writer.write_event(Event::End(BytesEnd::new("channels"))).unwrap();
        writer.write_event(Event::End(BytesEnd::new("desc"))).unwrap();
    }

    writer.write_event(Event::End(BytesEnd::new("info"))).unwrap();
    buffer
}

fn varlen(n: usize, out: &mut Vec<u8>) {
    if n <= u8::MAX as usize {
        out.push(1);
        out.push(n as u8);
    } else if n <= u32::MAX as usize {
        out.push(4);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(8);
        out.extend_from_slice(&(n as u64).to_le_bytes());
    }
}

fn push_value(format: &str, value: f64, out: &mut Vec<u8>) {
    match format {
        "int8" => out.extend_from_slice(&(value as i8).to_le_bytes()),
        "int16" => out.extend_from_slice(&(value as i16).to_le_bytes()),
        "int32" => out.extend_from_slice(&(value as i32).to_le_bytes()),
        "int64" => out.extend_from_slice(&(value as i64).to_le_bytes()),
        "float32" => out.extend_from_slice(&(value as f32).to_le_bytes()),
        _ => out.extend_from_slice(&value.to_le_bytes()),
    }
}

fn push_timestamp(ts: Option<f64>, out: &mut Vec<u8>) {
    match ts {
        Some(t) => {
            out.push(8);
            out.extend_from_slice(&t.to_le_bytes());
        }
        None => out.push(0),
    }
}

/// Builds a recording chunk by chunk.
#[derive(Debug, Clone)]
pub struct XdfBuilder {
    bytes: Vec<u8>,
    formats: Vec<(u32, String)>,
}

impl XdfBuilder {
    pub fn new() -> Self {
        Self {
            bytes: b"XDF:".to_vec(),
            formats: Vec::new(),
        }
    }

    /// Append a chunk with the smallest length width that fits.
    pub fn chunk(mut self, tag: u16, content: &[u8]) -> Self {
        let length = content.len() + 2;
        varlen(length, &mut self.bytes);
        self.bytes.extend_from_slice(&tag.to_le_bytes());
        self.bytes.extend_from_slice(content);
        self
    }

    fn stream_chunk(self, tag: u16, id: u32, body: &[u8]) -> Self {
        let mut content = id.to_le_bytes().to_vec();
        content.extend_from_slice(body);
        self.chunk(tag, &content)
    }

    pub fn file_header(self, version: &str) -> Self {
        let xml = format!(
            "<?xml version=\"1.0\"?><info><version>{}</version>\
             <datetime>2024-03-01T10:15:00+0100</datetime></info>",
            version
        );
        self.chunk(FILE_HEADER, xml.as_bytes())
    }

    pub fn stream_header(mut self, id: u32, spec: &StreamSpec) -> Self {
        self.formats.push((id, spec.channel_format.clone()));
        let xml = header_xml(spec);
        self.stream_chunk(STREAM_HEADER, id, &xml)
    }

    fn format_of(&self, id: u32) -> String {
        self.formats
            .iter()
            .find(|(sid, _)| *sid == id)
            .map(|(_, f)| f.clone())
            .unwrap_or_else(|| "double64".to_string())
    }

    /// Numeric samples; values are converted to the stream's declared format.
    pub fn samples(self, id: u32, samples: &[(Option<f64>, Vec<f64>)]) -> Self {
        let format = self.format_of(id);
        let mut body = Vec::new();
        varlen(samples.len(), &mut body);
        for (ts, values) in samples {
            push_timestamp(*ts, &mut body);
            for v in values {
                push_value(&format, *v, &mut body);
            }
        }
        self.stream_chunk(SAMPLES, id, &body)
    }

    /// Single-channel string samples.
    pub fn string_samples(self, id: u32, samples: &[(Option<f64>, &str)]) -> Self {
        let mut body = Vec::new();
        varlen(samples.len(), &mut body);
        for (ts, value) in samples {
            push_timestamp(*ts, &mut body);
            varlen(value.len(), &mut body);
            body.extend_from_slice(value.as_bytes());
        }
        self.stream_chunk(SAMPLES, id, &body)
    }

    pub fn clock_offset(self, id: u32, time: f64, value: f64) -> Self {
        let mut body = time.to_le_bytes().to_vec();
        body.extend_from_slice(&value.to_le_bytes());
        self.stream_chunk(CLOCK_OFFSET, id, &body)
    }

    pub fn boundary(self) -> Self {
        self.chunk(BOUNDARY, &BOUNDARY_UUID)
    }

    pub fn footer(self, id: u32, first: f64, last: f64, count: usize) -> Self {
        let xml = format!(
            "<?xml version=\"1.0\"?><info><first_timestamp>{}</first_timestamp>\
             <last_timestamp>{}</last_timestamp><sample_count>{}</sample_count></info>",
            first, last, count
        );
        self.stream_chunk(STREAM_FOOTER, id, xml.as_bytes())
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    /// Write to a file inside `dir` and return its path.
    pub fn write_to(self, dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

/// `count` samples of `channels` channels starting at `t0`, with only the
/// first sample carrying an explicit timestamp.
pub fn regular_samples(
    count: usize,
    channels: usize,
    t0: f64,
    value: impl Fn(usize, usize) -> f64,
) -> Vec<(Option<f64>, Vec<f64>)> {
    (0..count)
        .map(|i| {
            let ts = if i == 0 { Some(t0) } else { None };
            (ts, (0..channels).map(|c| value(i, c)).collect())
        })
        .collect()
}
