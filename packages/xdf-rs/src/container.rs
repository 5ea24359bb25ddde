use crate::stream::Stream;
use crate::types::FileHeader;
use serde::{Deserialize, Serialize};

/// Everything read from one XDF file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Container {
    pub file_header: Option<FileHeader>,
    /// Streams in the file order of their header chunks.
    pub streams: Vec<Stream>,
    /// The input ended in the middle of a chunk.
    pub truncated: bool,
    /// Chunks with unrecognized tags that were skipped.
    pub skipped_chunks: usize,
}

impl Container {
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn stream(&self, id: u32) -> Option<&Stream> {
        self.streams.iter().find(|s| s.id == id)
    }

    pub fn stream_mut(&mut self, id: u32) -> Option<&mut Stream> {
        self.streams.iter_mut().find(|s| s.id == id)
    }

    /// First stream whose `name` matches.
    pub fn stream_by_name(&self, name: &str) -> Option<&Stream> {
        self.streams.iter().find(|s| s.name() == name)
    }

    /// All streams of a content type, compared case-insensitively.
    pub fn streams_by_type<'a>(&'a self, content_type: &'a str) -> impl Iterator<Item = &'a Stream> + 'a {
        self.streams
            .iter()
            .filter(move |s| s.content_type().eq_ignore_ascii_case(content_type))
    }

    pub fn total_samples(&self) -> usize {
        self.streams.iter().map(Stream::sample_count).sum()
    }

    pub fn malformed_streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.iter().filter(|s| s.is_malformed())
    }
}
