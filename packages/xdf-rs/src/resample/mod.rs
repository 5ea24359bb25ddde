//! Resampling to a uniform target rate
//!
//! The source/target ratio is reduced to a small fraction `up / down`, split
//! into prime-factor stages, and applied per channel with Kaiser-windowed
//! polyphase filters. Filters depend only on the ratio.

pub mod design;
pub mod polyphase;

pub use design::{design_lowpass, rational_ratio};
pub use polyphase::{design_stages, output_len, plan_stages, upfirdn, Stage};

use crate::error::{Result, XDFError};
use crate::samples::TimeSeries;
use crate::stream::{Stream, Timestamps};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Largest denominator accepted when approximating a rate ratio.
pub const MAX_RATIO_DENOMINATOR: u64 = 1000;

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

impl Stream {
    /// Resample every channel to `target_rate` Hz.
    ///
    /// Output timestamps form a uniform grid starting at the first input
    /// timestamp. Numeric buffers come out as double64. `cancel` is polled
    /// between channels.
    pub fn resample(&mut self, target_rate: f64, cancel: Option<&AtomicBool>) -> Result<()> {
        if !self.time_series.is_numeric() {
            return Err(XDFError::TypeMismatch {
                stream_id: self.id,
                operation: "resampling",
                format: self.format(),
            });
        }
        if !(target_rate.is_finite() && target_rate > 0.0) {
            return Err(XDFError::precondition(
                self.id,
                format!("invalid target rate {}", target_rate),
            ));
        }
        let source_rate = self.current_rate();
        if source_rate <= 0.0 {
            return Err(XDFError::precondition(
                self.id,
                "irregularly sampled streams cannot be resampled",
            ));
        }
        let Some(timestamps) = self.timestamps.as_slice() else {
            return Err(XDFError::precondition(
                self.id,
                "timestamps were released; resample before releasing",
            ));
        };

        let (up, down) = rational_ratio(target_rate / source_rate, MAX_RATIO_DENOMINATOR)
            .ok_or_else(|| {
                XDFError::precondition(
                    self.id,
                    format!("cannot express {} Hz -> {} Hz as a ratio", source_rate, target_rate),
                )
            })?;

        let n = timestamps.len();
        let first = timestamps.first().copied().unwrap_or(0.0);
        let count = output_len(n, up as usize, down as usize);

        if (up as f64 / down as f64 - target_rate / source_rate).abs() > 1e-9 {
            log::warn!(
                "Stream {}: resampling ratio approximated as {}/{}",
                self.id,
                up,
                down
            );
        }

        let channels = self
            .time_series
            .to_f64_channels(self.channel_count())
            .unwrap_or_default();
        let stages = design_stages(up, down);
        log::debug!(
            "Resampling stream {} from {} Hz to {} Hz ({}/{} in {} stage(s))",
            self.id,
            source_rate,
            target_rate,
            up,
            down,
            stages.len()
        );

        let resampled: Vec<Vec<f64>> = channels
            .par_iter()
            .map(|channel| {
                if is_cancelled(cancel) {
                    return Err(XDFError::Cancelled);
                }
                Ok(polyphase::resample_channel(channel, &stages, count))
            })
            .collect::<Result<_>>()?;

        self.time_series = if resampled.is_empty() {
            TimeSeries::Double64(Vec::new())
        } else {
            TimeSeries::from_f64_channels(&resampled)
        };
        self.timestamps = Timestamps::Explicit {
            values: (0..count).map(|i| first + i as f64 / target_rate).collect(),
        };
        self.resampled_rate = Some(target_rate);
        Ok(())
    }
}
