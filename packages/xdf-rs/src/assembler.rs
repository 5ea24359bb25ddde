//! Stream assembly
//!
//! Demultiplexes the chunk sequence into per-stream buffers. Parsing stops at
//! the first fatal error; whatever was assembled until then stays available
//! through [`ParseOutcome`].

use crate::chunk::{Chunk, ChunkReader, ChunkTag, BOUNDARY_UUID};
use crate::container::Container;
use crate::error::{Result, XDFError};
use crate::metadata::{parse_file_header, parse_stream_footer, parse_stream_header};
use crate::samples::{decode_samples, DecodeError, TimeSeries};
use crate::stream::Stream;
use crate::types::{ClockOffset, FileHeader, StreamInfo};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;

/// Samples decoded from one chunk, before they are appended to their stream.
/// A hook may rewrite the values, the raw timestamps and the stream header.
pub struct ChunkRun<'a> {
    pub stream_id: u32,
    pub info: &'a mut StreamInfo,
    pub values: TimeSeries,
    pub timestamps: Vec<f64>,
}

/// Callback run on every decoded samples chunk.
///
/// Chunks are always decoded with the layout of the original header. After
/// the hook returns, the run must hold `info.channel_count` values per
/// timestamp, in the format already stored for the stream. A run that does
/// not is dropped and recorded as an issue of the stream.
#[derive(Clone)]
pub struct ChunkHook(Arc<dyn Fn(&mut ChunkRun<'_>) + Send + Sync>);

impl ChunkHook {
    pub fn new(f: impl Fn(&mut ChunkRun<'_>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for ChunkHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChunkHook")
    }
}

/// Result of a tolerant parse: the container assembled so far, and the fatal
/// error that stopped the parse, if any.
#[derive(Debug)]
pub struct ParseOutcome {
    pub container: Container,
    pub error: Option<XDFError>,
}

impl ParseOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Strict view: the container only if nothing fatal happened.
    pub fn into_result(self) -> Result<Container> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.container),
        }
    }
}

/// Per-stream state machine fed one chunk at a time.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    streams: Vec<Stream>,
    index: HashMap<u32, usize>,
    /// Streams whose header failed to parse; their data chunks are skipped.
    invalid_headers: HashSet<u32>,
    file_header: Option<FileHeader>,
    hook: Option<ChunkHook>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` on every decoded samples chunk.
    pub fn with_chunk_hook(mut self, hook: ChunkHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// Dispatch one chunk. An `Err` is fatal for the whole file.
    pub fn consume(&mut self, chunk: Chunk) -> Result<()> {
        log::trace!(
            "Chunk {:?} at byte {} (stream {:?}, {} bytes)",
            chunk.tag,
            chunk.offset,
            chunk.stream_id,
            chunk.payload.len()
        );

        match (chunk.tag, chunk.stream_id) {
            (ChunkTag::FileHeader, _) => self.on_file_header(&chunk),
            (ChunkTag::Boundary, _) => {
                if chunk.payload.as_slice() != BOUNDARY_UUID {
                    log::warn!("Boundary chunk at byte {} has an unexpected UUID", chunk.offset);
                }
            }
            (ChunkTag::StreamHeader, Some(id)) => self.on_stream_header(id, &chunk),
            (ChunkTag::Samples, Some(id)) => return self.on_samples(id, &chunk),
            (ChunkTag::ClockOffset, Some(id)) => return self.on_clock_offset(id, &chunk),
            (ChunkTag::StreamFooter, Some(id)) => return self.on_footer(id, &chunk),
            // The chunk reader skips unknown tags and always attaches ids to
            // stream-bearing chunks.
            _ => {}
        }
        Ok(())
    }

    /// Finalize into a container. Streams keep header order.
    pub fn finish(self, truncated: bool, skipped_chunks: usize) -> Container {
        for stream in &self.streams {
            if let Some(expected) = stream.footer.as_ref().and_then(|f| f.sample_count) {
                if expected != stream.sample_count() as u64 {
                    log::warn!(
                        "Stream {} footer reports {} samples but {} were read",
                        stream.id,
                        expected,
                        stream.sample_count()
                    );
                }
            }
            log::info!(
                "Stream {} '{}': {} channels, {} samples{}",
                stream.id,
                stream.name(),
                stream.channel_count(),
                stream.sample_count(),
                if stream.is_malformed() { " (malformed)" } else { "" }
            );
        }

        Container {
            file_header: self.file_header,
            streams: self.streams,
            truncated,
            skipped_chunks,
        }
    }

    fn on_file_header(&mut self, chunk: &Chunk) {
        if self.file_header.is_some() {
            log::warn!("Ignoring repeated file header at byte {}", chunk.offset);
            return;
        }
        match parse_file_header(&chunk.payload) {
            Ok(header) => {
                log::debug!("File header version {:?}", header.version);
                self.file_header = Some(header);
            }
            Err(e) => log::warn!("Unreadable file header: {}", e),
        }
    }

    fn on_stream_header(&mut self, id: u32, chunk: &Chunk) {
        if self.index.contains_key(&id) {
            log::warn!(
                "Duplicate header for stream {} at byte {}; keeping the first",
                id,
                chunk.offset
            );
            return;
        }

        let stream = match parse_stream_header(id, &chunk.payload) {
            Ok(info) => {
                log::debug!(
                    "Stream {} header: '{}' ({}, {} x {}, {} Hz)",
                    id,
                    info.name,
                    info.content_type,
                    info.channel_count,
                    info.channel_format,
                    info.nominal_srate
                );
                Stream::new(id, info)
            }
            Err(e) => {
                log::warn!("{}; its data chunks will be skipped", e);
                self.invalid_headers.insert(id);
                Stream::with_invalid_header(id, &e)
            }
        };

        self.index.insert(id, self.streams.len());
        self.streams.push(stream);
    }

    /// Stream the chunk belongs to, or `None` if its header was invalid.
    fn target(&mut self, id: u32, chunk: &Chunk, what: &str) -> Result<Option<&mut Stream>> {
        let Some(&slot) = self.index.get(&id) else {
            return Err(XDFError::protocol(
                chunk.offset,
                Some(id),
                format!("{} chunk for a stream without a header", what),
            ));
        };
        if self.invalid_headers.contains(&id) {
            log::debug!("Skipping {} chunk of stream {} with invalid header", what, id);
            return Ok(None);
        }
        Ok(self.streams.get_mut(slot))
    }

    fn on_samples(&mut self, id: u32, chunk: &Chunk) -> Result<()> {
        let hook = self.hook.clone();
        let Some(stream) = self.target(id, chunk, "samples")? else {
            return Ok(());
        };

        let decoded = decode_samples(
            &chunk.payload,
            stream.wire.format,
            stream.wire.channel_count,
            stream.wire.nominal_srate,
            &mut stream.timestamp_state,
        );

        match decoded {
            Ok(run) => {
                log::trace!("Stream {}: {} samples", id, run.timestamps.len());
                let (values, timestamps) = match hook {
                    Some(hook) => match apply_hook(&hook, stream, run.values, run.timestamps) {
                        Ok(run) => run,
                        Err(reason) => {
                            log::warn!(
                                "Dropping samples chunk at byte {} of stream {}: {}",
                                chunk.offset,
                                id,
                                reason
                            );
                            stream
                                .issues
                                .push(format!("samples chunk at byte {}: {}", chunk.offset, reason));
                            return Ok(());
                        }
                    },
                    None => (run.values, run.timestamps),
                };
                stream.push_run(values, timestamps);
                Ok(())
            }
            Err(DecodeError::MissingTimestamp { sample }) => Err(XDFError::protocol(
                chunk.offset,
                Some(id),
                format!("sample {} has no timestamp and none precedes it", sample),
            )),
            Err(DecodeError::Malformed(reason)) => {
                log::warn!(
                    "Dropping samples chunk at byte {} of stream {}: {}",
                    chunk.offset,
                    id,
                    reason
                );
                stream
                    .issues
                    .push(format!("samples chunk at byte {}: {}", chunk.offset, reason));
                Ok(())
            }
        }
    }

    fn on_clock_offset(&mut self, id: u32, chunk: &Chunk) -> Result<()> {
        let Some(stream) = self.target(id, chunk, "clock offset")? else {
            return Ok(());
        };

        let mut cursor = Cursor::new(chunk.payload.as_slice());
        let parsed = (|| -> std::io::Result<ClockOffset> {
            let time = cursor.read_f64::<LittleEndian>()?;
            let value = cursor.read_f64::<LittleEndian>()?;
            Ok(ClockOffset { time, value })
        })();

        match parsed {
            Ok(offset) => stream.clock_offsets.push(offset),
            Err(_) => {
                log::warn!(
                    "Clock offset chunk at byte {} of stream {} is too short",
                    chunk.offset,
                    id
                );
                stream
                    .issues
                    .push(format!("short clock offset chunk at byte {}", chunk.offset));
            }
        }
        Ok(())
    }

    fn on_footer(&mut self, id: u32, chunk: &Chunk) -> Result<()> {
        let Some(stream) = self.target(id, chunk, "footer")? else {
            return Ok(());
        };

        match parse_stream_footer(id, &chunk.payload) {
            Ok(footer) => {
                log::debug!("Stream {} footer: duration {:?}", id, footer.duration());
                stream.footer = Some(footer);
            }
            Err(e) => {
                log::warn!("{}", e);
                stream.issues.push(e.to_string());
            }
        }
        stream.closed = true;
        Ok(())
    }
}

/// Run the hook on one run and check that the result still fits the stream.
/// Values are counted against the header's channel count as the hook left
/// it. A stream that holds no values yet may switch format.
fn apply_hook(
    hook: &ChunkHook,
    stream: &mut Stream,
    values: TimeSeries,
    timestamps: Vec<f64>,
) -> std::result::Result<(TimeSeries, Vec<f64>), String> {
    let mut run = ChunkRun {
        stream_id: stream.id,
        info: &mut stream.info,
        values,
        timestamps,
    };
    (hook.0)(&mut run);
    let ChunkRun {
        values, timestamps, ..
    } = run;

    let expected = timestamps.len().checked_mul(stream.channel_count());
    if expected != Some(values.value_count()) {
        return Err(format!(
            "chunk hook returned {} values for {} timestamps of {} channels",
            values.value_count(),
            timestamps.len(),
            stream.channel_count()
        ));
    }
    let (stored, returned) = (stream.time_series.format(), values.format());
    if stored != returned {
        if stream.time_series.value_count() > 0 {
            return Err(format!(
                "chunk hook returned {} values for a stream holding {}",
                returned, stored
            ));
        }
        stream.time_series = TimeSeries::empty(returned);
    }
    Ok((values, timestamps))
}

/// Read every chunk from `reader`, keeping what was assembled if a fatal
/// error stops the parse. `source_len` enables length sanity checks.
pub fn parse_partial<R: Read>(reader: R, source_len: Option<u64>) -> ParseOutcome {
    parse_partial_with(reader, source_len, None)
}

/// [`parse_partial`] with an optional per-chunk hook.
pub fn parse_partial_with<R: Read>(
    reader: R,
    source_len: Option<u64>,
    hook: Option<ChunkHook>,
) -> ParseOutcome {
    let mut chunks = match ChunkReader::new(reader) {
        Ok(r) => r,
        Err(e) => {
            return ParseOutcome {
                container: Container::default(),
                error: Some(e),
            }
        }
    };
    if let Some(len) = source_len {
        chunks = chunks.with_source_len(len);
    }

    let mut assembler = match hook {
        Some(hook) => StreamAssembler::new().with_chunk_hook(hook),
        None => StreamAssembler::new(),
    };
    let mut error = None;

    for chunk in chunks.by_ref() {
        match chunk.and_then(|c| assembler.consume(c)) {
            Ok(()) => {}
            Err(e) => {
                log::error!("Stopping parse: {}", e);
                error = Some(e);
                break;
            }
        }
    }

    let container = assembler.finish(chunks.is_truncated(), chunks.skipped_chunks());
    ParseOutcome { container, error }
}

/// Strict variant of [`parse_partial`].
pub fn parse<R: Read>(reader: R, source_len: Option<u64>) -> Result<Container> {
    parse_partial(reader, source_len).into_result()
}
