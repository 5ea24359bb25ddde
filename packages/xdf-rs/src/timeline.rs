//! Common-timeline synchronization
//!
//! Puts every stream on one uniform grid that runs from the earliest to the
//! latest timestamp of the container at the fastest effective rate. Numeric
//! streams are linearly interpolated and hold NaN outside their own time
//! range; integer formats are rounded to whole values. String streams keep
//! each sample at its nearest grid point and leave the other points empty.

use crate::container::Container;
use crate::error::{Result, XDFError};
use crate::postprocess::ProcessingReport;
use crate::profile_scope;
use crate::samples::TimeSeries;
use crate::stream::{Stream, Timestamps};
use crate::types::ChannelFormat;
use rayon::prelude::*;

impl Container {
    /// Fastest effective rate among the non-empty regularly sampled streams.
    /// Falls back to the nominal rate where no effective rate was measured.
    pub fn fastest_rate(&self) -> Option<f64> {
        self.streams
            .iter()
            .filter(|s| s.info.is_regular() && !s.is_empty())
            .map(|s| s.info.effective_srate.unwrap_or(s.info.nominal_srate))
            .filter(|rate| rate.is_finite() && *rate > 0.0)
            .reduce(f64::max)
    }

    /// Earliest first and latest last timestamp over all non-empty streams.
    pub fn time_span(&self) -> Option<(f64, f64)> {
        self.streams
            .iter()
            .filter_map(|s| Some((s.timestamps.first()?, s.timestamps.last()?)))
            .reduce(|(a, b), (c, d)| (a.min(c), b.max(d)))
    }

    /// Resample every stream onto the shared grid. Returns the synced stream
    /// ids; empty streams and invalid-header placeholders are skipped. Does
    /// nothing when no regularly sampled stream defines a rate.
    pub fn sync_timestamps(&mut self) -> ProcessingReport {
        profile_scope!("sync_timestamps");
        let mut report = ProcessingReport::default();

        let (Some(rate), Some((start, end))) = (self.fastest_rate(), self.time_span()) else {
            log::warn!("No regularly sampled stream defines a common timeline; not syncing");
            return report;
        };
        let count = ((end - start) * rate).round() as usize + 1;
        let grid = Timestamps::Uniform {
            first: start,
            rate,
            count,
        };
        log::debug!(
            "Common timeline: {} samples at {} Hz from {:.6}",
            count,
            rate,
            start
        );

        let outcomes: Vec<(u32, Result<()>)> = self
            .streams
            .par_iter_mut()
            .map(|s| (s.id, s.sync_to_grid(&grid)))
            .collect();

        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.synced.push(id),
                Err(e) => {
                    log::info!("Not syncing stream {}: {}", id, e);
                    report.skipped.push((id, e.to_string()));
                }
            }
        }
        log::info!(
            "Synced {} stream(s) to {} Hz over [{:.3}, {:.3}]",
            report.synced.len(),
            rate,
            start,
            end
        );
        report
    }
}

impl Stream {
    /// Move this stream onto `grid`. The grid must be uniform; timestamps of
    /// the stream are assumed non-decreasing.
    pub fn sync_to_grid(&mut self, grid: &Timestamps) -> Result<()> {
        let Timestamps::Uniform { rate, .. } = *grid else {
            return Err(XDFError::precondition(self.id, "sync target is not a uniform grid"));
        };
        if self.channel_count() == 0 {
            return Err(XDFError::precondition(self.id, "stream has no valid header"));
        }
        if self.is_empty() {
            return Err(XDFError::precondition(self.id, "stream has no samples"));
        }

        let count = self.channel_count();
        let times = self.timestamps.to_vec();
        self.time_series = match &self.time_series {
            TimeSeries::String(values) => {
                TimeSeries::String(place_on_grid(self.id, values, count, &times, grid))
            }
            series => {
                let integral = !matches!(
                    series.format(),
                    ChannelFormat::Float32 | ChannelFormat::Double64
                );
                let points = grid.to_vec();
                let tolerance = 1e-6 / rate;
                let channels: Vec<Vec<f64>> = series
                    .to_f64_channels(count)
                    .unwrap_or_default()
                    .iter()
                    .map(|channel| {
                        let mut out = interpolate(&times, channel, &points, tolerance);
                        if integral {
                            out.iter_mut().for_each(|v| *v = v.round_ties_even());
                        }
                        out
                    })
                    .collect();
                TimeSeries::from_f64_channels(&channels)
            }
        };

        self.timestamps = Timestamps::Explicit {
            values: grid.to_vec(),
        };
        self.resampled_rate = Some(rate);
        self.info.effective_srate = Some(rate);
        Ok(())
    }
}

/// Linear interpolation of `values` sampled at `times` onto `points`. Points
/// farther than `tolerance` outside `[times[0], times[n-1]]` become NaN.
fn interpolate(times: &[f64], values: &[f64], points: &[f64], tolerance: f64) -> Vec<f64> {
    let n = times.len().min(values.len());
    if n == 0 {
        return vec![f64::NAN; points.len()];
    }
    let (lo, hi) = (times[0], times[n - 1]);

    let mut j = 0;
    points
        .iter()
        .map(|&t| {
            if t < lo - tolerance || t > hi + tolerance {
                return f64::NAN;
            }
            if n == 1 {
                return values[0];
            }
            let t = t.clamp(lo, hi);
            while j + 2 < n && times[j + 1] < t {
                j += 1;
            }
            let (t0, t1) = (times[j], times[j + 1]);
            if t1 > t0 {
                values[j] + (values[j + 1] - values[j]) * (t - t0) / (t1 - t0)
            } else {
                values[j]
            }
        })
        .collect()
}

/// Place each string sample at its nearest grid point. When two samples land
/// on the same point the earlier one is kept.
fn place_on_grid(
    id: u32,
    values: &[String],
    channel_count: usize,
    times: &[f64],
    grid: &Timestamps,
) -> Vec<String> {
    let mut out = vec![String::new(); grid.len() * channel_count];
    let mut taken = vec![false; grid.len()];

    for (sample, &t) in times.iter().enumerate() {
        let Some(slot) = grid.nearest_index(t) else {
            continue;
        };
        let Some(strings) = values.get(sample * channel_count..(sample + 1) * channel_count) else {
            continue;
        };
        if taken[slot] {
            log::debug!(
                "Stream {}: sample {} shares grid point {} with an earlier sample; dropped",
                id,
                sample,
                slot
            );
            continue;
        }
        taken[slot] = true;
        out[slot * channel_count..(slot + 1) * channel_count].clone_from_slice(strings);
    }
    out
}
