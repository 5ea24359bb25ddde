//! Chunk framing
//!
//! An XDF file is the magic code `XDF:` followed by chunks of the form
//! `[NumLengthBytes:u8][Length:1/4/8 bytes LE][Tag:u16 LE][Content]`, where
//! `Length` counts the tag and the content. Stream-bearing chunks start their
//! content with the u32 stream id.

use crate::error::{Result, XDFError};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::io::{self, Read};

pub const MAGIC: &[u8; 4] = b"XDF:";

/// Content of every boundary chunk.
pub const BOUNDARY_UUID: [u8; 16] = [
    0x43, 0xA5, 0x46, 0xDC, 0xCB, 0xF5, 0x41, 0x0F, 0xB3, 0x0E, 0xD5, 0x46, 0x73, 0x83, 0xCB, 0xE4,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChunkTag {
    FileHeader,
    StreamHeader,
    Samples,
    ClockOffset,
    Boundary,
    StreamFooter,
    Unknown(u16),
}

impl ChunkTag {
    pub fn from_u16(tag: u16) -> Self {
        match tag {
            1 => ChunkTag::FileHeader,
            2 => ChunkTag::StreamHeader,
            3 => ChunkTag::Samples,
            4 => ChunkTag::ClockOffset,
            5 => ChunkTag::Boundary,
            6 => ChunkTag::StreamFooter,
            other => ChunkTag::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            ChunkTag::FileHeader => 1,
            ChunkTag::StreamHeader => 2,
            ChunkTag::Samples => 3,
            ChunkTag::ClockOffset => 4,
            ChunkTag::Boundary => 5,
            ChunkTag::StreamFooter => 6,
            ChunkTag::Unknown(other) => other,
        }
    }

    /// Whether the content begins with a u32 stream id.
    pub fn carries_stream_id(self) -> bool {
        matches!(
            self,
            ChunkTag::StreamHeader | ChunkTag::Samples | ChunkTag::ClockOffset | ChunkTag::StreamFooter
        )
    }
}

/// One decoded chunk. Transient: the assembler consumes it immediately.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub tag: ChunkTag,
    pub stream_id: Option<u32>,
    /// Byte offset of the chunk's length prefix in the source.
    pub offset: u64,
    /// Byte offset of `payload[0]` in the source.
    pub payload_offset: u64,
    /// Content after the tag and the stream id (if any).
    pub payload: Vec<u8>,
}

/// Lazily reads chunks from a byte source positioned at the file start.
///
/// The iterator ends at clean end-of-input, at a short read in the middle of a
/// chunk (see [`ChunkReader::is_truncated`]), or after yielding a fatal error.
pub struct ChunkReader<R: Read> {
    reader: R,
    position: u64,
    source_len: Option<u64>,
    truncated: bool,
    finished: bool,
    skipped: usize,
}

impl<R: Read> ChunkReader<R> {
    /// Validate the magic code and prepare to read chunks.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        let n = read_fully(&mut reader, &mut magic)?;
        if n < MAGIC.len() || &magic != MAGIC {
            return Err(XDFError::protocol(
                0,
                None,
                "Invalid XDF file: missing magic string",
            ));
        }

        Ok(Self {
            reader,
            position: MAGIC.len() as u64,
            source_len: None,
            truncated: false,
            finished: false,
            skipped: 0,
        })
    }

    /// Total size of the source, used to reject impossible length fields.
    pub fn with_source_len(mut self, len: u64) -> Self {
        self.source_len = Some(len);
        self
    }

    /// True if the input ended in the middle of a chunk.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Current byte offset in the source.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of chunks with unrecognized tags that were skipped.
    pub fn skipped_chunks(&self) -> usize {
        self.skipped
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = read_fully(&mut self.reader, buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn mark_truncated(&mut self, what: &str) {
        log::warn!(
            "XDF input truncated while reading {} at byte {}; keeping data read so far",
            what,
            self.position
        );
        self.truncated = true;
        self.finished = true;
    }

    /// Read the next chunk. `Ok(None)` means end of input (clean or truncated).
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        loop {
            if self.finished {
                return Ok(None);
            }

            let offset = self.position;

            let mut width = [0u8; 1];
            if self.read_bytes(&mut width)? == 0 {
                self.finished = true;
                return Ok(None);
            }

            let width = width[0] as usize;
            if !matches!(width, 1 | 4 | 8) {
                return Err(self.fail(XDFError::protocol(
                    offset,
                    None,
                    format!("Corrupt chunk length: invalid NumLengthBytes {}", width),
                )));
            }

            let mut len_bytes = [0u8; 8];
            if self.read_bytes(&mut len_bytes[..width])? < width {
                self.mark_truncated("chunk length");
                return Ok(None);
            }
            let chunk_len = u64::from_le_bytes(len_bytes);

            if chunk_len < 2 {
                return Err(self.fail(XDFError::protocol(
                    offset,
                    None,
                    format!("Corrupt chunk length {} (must cover the 2-byte tag)", chunk_len),
                )));
            }
            if let Some(total) = self.source_len {
                if chunk_len > total {
                    return Err(self.fail(XDFError::protocol(
                        offset,
                        None,
                        format!(
                            "Corrupt chunk length {} exceeds file size {}",
                            chunk_len, total
                        ),
                    )));
                }
            }

            let mut tag_bytes = [0u8; 2];
            if self.read_bytes(&mut tag_bytes)? < 2 {
                self.mark_truncated("chunk tag");
                return Ok(None);
            }
            let tag = ChunkTag::from_u16(u16::from_le_bytes(tag_bytes));
            let content_len = chunk_len - 2;

            if let ChunkTag::Unknown(raw) = tag {
                log::debug!(
                    "Skipping chunk with unknown tag {} at byte {} ({} bytes)",
                    raw,
                    offset,
                    content_len
                );
                let copied = io::copy(&mut (&mut self.reader).take(content_len), &mut io::sink())?;
                self.position += copied;
                if copied < content_len {
                    self.mark_truncated("unknown chunk");
                    return Ok(None);
                }
                self.skipped += 1;
                continue;
            }

            let mut content = Vec::new();
            let read = (&mut self.reader).take(content_len).read_to_end(&mut content)? as u64;
            let content_start = self.position;
            self.position += read;
            if read < content_len {
                self.mark_truncated("chunk content");
                return Ok(None);
            }

            let (stream_id, payload, payload_offset) = if tag.carries_stream_id() {
                if content.len() < 4 {
                    return Err(self.fail(XDFError::protocol(
                        offset,
                        None,
                        format!("{:?} chunk too short to hold a stream id", tag),
                    )));
                }
                let mut id_bytes = &content[..4];
                let id = id_bytes.read_u32::<LittleEndian>()?;
                content.drain(..4);
                (Some(id), content, content_start + 4)
            } else {
                (None, content, content_start)
            };

            log::trace!(
                "Read {:?} chunk at byte {} (stream {:?}, {} bytes)",
                tag,
                offset,
                stream_id,
                payload.len()
            );

            return Ok(Some(Chunk {
                tag,
                stream_id,
                offset,
                payload_offset,
                payload,
            }));
        }
    }

    fn fail(&mut self, err: XDFError) -> XDFError {
        self.finished = true;
        err
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

/// Read until `buf` is full or the source is exhausted; returns bytes read.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read an XDF variable-length integer: a width byte (1, 4 or 8) followed by
/// the little-endian value.
pub fn read_varlen_int<R: Read>(reader: &mut R) -> io::Result<u64> {
    match reader.read_u8()? {
        1 => Ok(reader.read_u8()? as u64),
        4 => Ok(reader.read_u32::<LittleEndian>()? as u64),
        8 => reader.read_u64::<LittleEndian>(),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid variable-length integer width {}", other),
        )),
    }
}
