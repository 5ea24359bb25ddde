//! Reader for XDF (Lab Streaming Layer) recordings.
//!
//! Parses the chunked container into per-stream buffers, corrects timestamps
//! with the recorded clock offsets and offers post-processing (mean
//! subtraction, label synthesis, common-timeline sync, polyphase resampling,
//! event alignment).

pub mod assembler;
pub mod chunk;
pub mod clock_sync;
pub mod config;
pub mod container;
pub mod dejitter;
pub mod error;
pub mod events;
pub mod loader;
pub mod metadata;
pub mod mmap_utils;
pub mod postprocess;
pub mod profiling;
pub mod resample;
pub mod samples;
pub mod stream;
pub mod timeline;
pub mod types;

pub use assembler::{
    parse, parse_partial, parse_partial_with, ChunkHook, ChunkRun, ParseOutcome, StreamAssembler,
};
pub use chunk::{Chunk, ChunkReader, ChunkTag};
pub use config::{ClockSyncMethod, ClockSyncOptions, LoadOptions, ProcessingOptions, ReaderConfig};
pub use container::Container;
pub use error::{Result, XDFError};
pub use events::{align_events, AlignedEvent};
pub use loader::{load_xdf, XDFReader};
pub use postprocess::ProcessingReport;
pub use samples::TimeSeries;
pub use stream::{Stream, Timestamps};
pub use types::*;
