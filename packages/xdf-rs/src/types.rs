use serde::{Deserialize, Serialize};
use std::fmt;

/// Value format of a stream, as declared by `channel_format` in its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelFormat {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Double64,
    String,
}

impl ChannelFormat {
    /// Parse the header spelling. `float64` is accepted as an alias of `double64`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "int8" => Some(ChannelFormat::Int8),
            "int16" => Some(ChannelFormat::Int16),
            "int32" => Some(ChannelFormat::Int32),
            "int64" => Some(ChannelFormat::Int64),
            "float32" => Some(ChannelFormat::Float32),
            "double64" | "float64" | "double" => Some(ChannelFormat::Double64),
            "string" => Some(ChannelFormat::String),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelFormat::Int8 => "int8",
            ChannelFormat::Int16 => "int16",
            ChannelFormat::Int32 => "int32",
            ChannelFormat::Int64 => "int64",
            ChannelFormat::Float32 => "float32",
            ChannelFormat::Double64 => "double64",
            ChannelFormat::String => "string",
        }
    }

    /// Width of one value in bytes; `None` for variable-length strings.
    pub fn value_size(&self) -> Option<usize> {
        match self {
            ChannelFormat::Int8 => Some(1),
            ChannelFormat::Int16 => Some(2),
            ChannelFormat::Int32 | ChannelFormat::Float32 => Some(4),
            ChannelFormat::Int64 | ChannelFormat::Double64 => Some(8),
            ChannelFormat::String => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, ChannelFormat::String)
    }
}

impl fmt::Display for ChannelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 3D sensor position from `desc/channels/channel/location`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Per-channel descriptor. Every sub-field is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub label: Option<String>,
    pub unit: Option<String>,
    pub channel_type: Option<String>,
    pub location: Option<Location>,
}

/// Generic element of an XML metadata document, kept so that domain-specific
/// `desc` content survives the parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XmlNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: None,
            children: Vec::new(),
        }
    }

    /// First direct child with the given element name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given element name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a `/`-separated path of child names.
    pub fn find(&self, path: &str) -> Option<&XmlNode> {
        path.split('/')
            .filter(|p| !p.is_empty())
            .try_fold(self, |node, part| node.child(part))
    }

    /// Trimmed, non-empty text of the element at `path`.
    pub fn text_at(&self, path: &str) -> Option<&str> {
        self.find(path)
            .and_then(|n| n.text.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Stream header (`info`) contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    pub content_type: String,
    pub channel_count: usize,
    pub channel_format: ChannelFormat,
    /// Declared rate in Hz; zero for irregularly sampled streams.
    pub nominal_srate: f64,
    /// Measured rate, filled in after loading when it can be computed.
    pub effective_srate: Option<f64>,
    pub source_id: Option<String>,
    pub hostname: Option<String>,
    pub created_at: Option<f64>,
    pub channels: Vec<ChannelDescriptor>,
    pub desc: Option<XmlNode>,
}

impl StreamInfo {
    pub fn is_regular(&self) -> bool {
        self.nominal_srate > 0.0
    }

    /// Labels in channel order; absent labels are `None`.
    pub fn channel_labels(&self) -> Vec<Option<&str>> {
        (0..self.channel_count)
            .map(|i| self.channels.get(i).and_then(|c| c.label.as_deref()))
            .collect()
    }
}

/// Stream footer contents. All fields are optional in practice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FooterInfo {
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
    pub sample_count: Option<u64>,
    pub measured_srate: Option<f64>,
    pub clock_offsets: Vec<ClockOffset>,
}

impl FooterInfo {
    pub fn duration(&self) -> Option<f64> {
        match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) if last >= first => Some(last - first),
            _ => None,
        }
    }
}

/// File header (`info`) contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub version: Option<String>,
    /// Raw `datetime` string as written by the recorder.
    pub datetime: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::FixedOffset>>,
}

/// One clock-offset measurement: the stream's local clock at `time` lagged the
/// reference clock by `value` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockOffset {
    pub time: f64,
    pub value: f64,
}
