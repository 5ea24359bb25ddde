//! File-level entry points: map, parse, synchronize.

use crate::assembler::{parse_partial_with, ChunkHook, ParseOutcome};
use crate::config::LoadOptions;
use crate::container::Container;
use crate::error::Result;
use crate::mmap_utils::mmap_file;
use crate::profile_scope;
use rayon::prelude::*;
use std::io::Cursor;
use std::path::Path;

/// Reads XDF recordings with a fixed set of load options.
#[derive(Debug, Clone, Default)]
pub struct XDFReader {
    options: LoadOptions,
    hook: Option<ChunkHook>,
}

impl XDFReader {
    pub fn new(options: LoadOptions) -> Self {
        Self {
            options,
            hook: None,
        }
    }

    /// Pass every decoded samples chunk through `hook` before it is stored.
    /// Clock synchronization and jitter removal see the hook's timestamps.
    pub fn with_chunk_hook(mut self, hook: ChunkHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Load a file, failing on any fatal parse error.
    pub fn load(&self, path: &Path) -> Result<Container> {
        self.load_partial(path)?.into_result()
    }

    /// Load a file, keeping the streams assembled before a fatal parse error.
    /// Only I/O failures are returned as `Err`.
    pub fn load_partial(&self, path: &Path) -> Result<ParseOutcome> {
        let mmap = mmap_file(path)?;
        log::info!("Reading {}", path.display());
        Ok(self.load_bytes(&mmap))
    }

    /// Parse an in-memory recording.
    pub fn load_bytes(&self, bytes: &[u8]) -> ParseOutcome {
        profile_scope!("load_xdf", bytes = bytes.len() as u64);

        let mut outcome =
            parse_partial_with(Cursor::new(bytes), Some(bytes.len() as u64), self.hook.clone());
        if outcome.container.truncated {
            log::warn!("Recording is truncated; the last chunk was dropped");
        }
        self.finalize(&mut outcome.container);
        outcome
    }

    /// Clock synchronization, jitter removal and overlap trimming, as
    /// configured.
    fn finalize(&self, container: &mut Container) {
        let options = &self.options;
        container.streams.par_iter_mut().for_each(|stream| {
            if options.synchronize_clocks {
                stream.synchronize_clock(&options.clock_sync);
            }
            if options.dejitter_timestamps {
                stream.remove_jitter(
                    options.jitter_break_threshold_seconds,
                    options.jitter_break_threshold_samples,
                );
            } else {
                stream.measure_effective_rate();
            }
        });

        if options.limit_to_overlap {
            container.limit_to_overlap();
        }
    }
}

/// Load a file with default options.
pub fn load_xdf(path: &Path) -> Result<Container> {
    XDFReader::default().load(path)
}
