//! Container-level post-processing
//!
//! Each stage runs across streams in parallel and can be skipped
//! independently. String and irregular streams are passed over by the stages
//! that cannot apply to them.

use crate::config::ProcessingOptions;
use crate::container::Container;
use crate::error::{Result, XDFError};
use crate::profile_scope;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;

/// What the pipeline did, per stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub mean_subtracted: Vec<u32>,
    pub labels_generated: usize,
    /// Streams moved onto the common timeline.
    pub synced: Vec<u32>,
    pub resampled: Vec<u32>,
    pub released: Vec<u32>,
    /// Streams a stage passed over, with the reason.
    pub skipped: Vec<(u32, String)>,
}

impl Container {
    /// Subtract channel means from every numeric stream.
    pub fn subtract_means(&mut self) -> Vec<u32> {
        let mut done: Vec<u32> = self
            .streams
            .par_iter_mut()
            .filter(|s| s.time_series.is_numeric() && !s.is_empty())
            .filter_map(|s| s.subtract_mean().ok().map(|_| s.id))
            .collect();
        done.sort_unstable();
        done
    }

    /// Fill absent channel labels of every stream. Returns the number of
    /// labels generated.
    pub fn synthesize_labels(&mut self) -> usize {
        self.streams.iter_mut().map(|s| s.synthesize_labels()).sum()
    }

    /// Resample every regular numeric stream to `target_rate`.
    pub fn resample_all(
        &mut self,
        target_rate: f64,
        cancel: Option<&AtomicBool>,
    ) -> Result<ProcessingReport> {
        profile_scope!("resample_all");

        let outcomes: Vec<(u32, Result<()>)> = self
            .streams
            .par_iter_mut()
            .map(|s| (s.id, s.resample(target_rate, cancel)))
            .collect();

        let mut report = ProcessingReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.resampled.push(id),
                Err(XDFError::Cancelled) => return Err(XDFError::Cancelled),
                Err(e @ (XDFError::TypeMismatch { .. } | XDFError::PreconditionError { .. })) => {
                    log::info!("Not resampling stream {}: {}", id, e);
                    report.skipped.push((id, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Release explicit timestamps of every resampled stream.
    pub fn release_timestamps(&mut self) -> Vec<u32> {
        self.streams
            .iter_mut()
            .filter(|s| s.resampled_rate.is_some())
            .filter_map(|s| s.release_timestamps().ok().map(|_| s.id))
            .collect()
    }

    /// Time window shared by all regularly sampled numeric streams, measured
    /// over their non-NaN samples so that synced streams count only the range
    /// they actually cover.
    pub fn overlap(&self) -> Option<(f64, f64)> {
        let mut window: Option<(f64, f64)> = None;
        for stream in self
            .streams
            .iter()
            .filter(|s| s.info.is_regular() && s.time_series.is_numeric())
        {
            let Some((first, last)) = stream.valid_time_range() else {
                continue;
            };
            window = Some(match window {
                None => (first, last),
                Some((start, end)) => (start.max(first), end.min(last)),
            });
        }
        window.filter(|(start, end)| start <= end)
    }

    /// Trim every stream to [`Container::overlap`]. Returns the window, or
    /// `None` (leaving the streams untouched) when the streams do not overlap.
    pub fn limit_to_overlap(&mut self) -> Option<(f64, f64)> {
        let Some((start, end)) = self.overlap() else {
            log::warn!("Streams share no common time range; not trimming");
            return None;
        };
        self.streams
            .par_iter_mut()
            .for_each(|s| s.retain_time_range(start, end));
        log::info!("Limited streams to [{:.3}, {:.3}]", start, end);
        Some((start, end))
    }

    /// Run the enabled stages in order: mean subtraction, label synthesis,
    /// timeline sync, resampling, timestamp release.
    pub fn process(
        &mut self,
        options: &ProcessingOptions,
        cancel: Option<&AtomicBool>,
    ) -> Result<ProcessingReport> {
        profile_scope!("process");
        let mut report = ProcessingReport::default();

        if options.subtract_mean {
            report.mean_subtracted = self.subtract_means();
        }
        if options.synthesize_labels {
            report.labels_generated = self.synthesize_labels();
        }
        if options.sync_timestamps {
            let synced = self.sync_timestamps();
            report.synced = synced.synced;
            report.skipped.extend(synced.skipped);
        }
        if let Some(rate) = options.resample_rate {
            let resampled = self.resample_all(rate, cancel)?;
            report.resampled = resampled.resampled;
            report.skipped.extend(resampled.skipped);
        }
        if options.release_timestamps {
            report.released = self.release_timestamps();
        }

        log::info!(
            "Post-processing done: {} mean-subtracted, {} synced, {} resampled, {} released",
            report.mean_subtracted.len(),
            report.synced.len(),
            report.resampled.len(),
            report.released.len()
        );
        Ok(report)
    }
}
