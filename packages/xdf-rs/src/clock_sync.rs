//! Clock synchronization
//!
//! Every stream records how far its local clock lagged the recorder's clock
//! at a sequence of capture times. Adding the offset valid at a sample's raw
//! timestamp moves that sample onto the common timeline.

use crate::config::{ClockSyncMethod, ClockSyncOptions};
use crate::stream::Stream;
use crate::types::ClockOffset;
use nalgebra::{Matrix2, Vector2};

const ROBUST_FIT_ITERATIONS: usize = 1000;
const ROBUST_FIT_RHO: f64 = 1.0;

/// Sort by capture time (stable) and keep only the latest observation, in
/// file order, among those sharing a capture time.
pub fn normalize_offsets(offsets: &[ClockOffset]) -> Vec<ClockOffset> {
    let mut sorted: Vec<ClockOffset> = offsets
        .iter()
        .copied()
        .filter(|o| o.time.is_finite() && o.value.is_finite())
        .collect();
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut out: Vec<ClockOffset> = Vec::with_capacity(sorted.len());
    for offset in sorted {
        match out.last_mut() {
            Some(last) if last.time == offset.time => *last = offset,
            _ => out.push(offset),
        }
    }
    out
}

/// Offset at time `t` by linear interpolation between the bracketing pair,
/// or extrapolation from the nearest two at either end. `offsets` must be
/// normalized.
pub fn interpolate_offset(offsets: &[ClockOffset], t: f64) -> f64 {
    match offsets {
        [] => 0.0,
        [only] => only.value,
        _ => {
            let n = offsets.len();
            let upper = offsets.partition_point(|o| o.time <= t).clamp(1, n - 1);
            let (a, b) = (offsets[upper - 1], offsets[upper]);
            a.value + (b.value - a.value) * (t - a.time) / (b.time - a.time)
        }
    }
}

/// Linear model `offset = intercept + slope * t` over one segment of
/// observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetModel {
    /// Capture time of the segment's first observation.
    pub start: f64,
    pub intercept: f64,
    pub slope: f64,
}

impl OffsetModel {
    pub fn offset_at(&self, t: f64) -> f64 {
        self.intercept + self.slope * t
    }
}

/// Indices `(first, last)` of observation runs separated by clock resets.
pub fn detect_resets(offsets: &[ClockOffset], options: &ClockSyncOptions) -> Vec<(usize, usize)> {
    if offsets.len() < 3 {
        return vec![(0, offsets.len().saturating_sub(1))];
    }

    let time_diff: Vec<f64> = offsets.windows(2).map(|w| w[1].time - w[0].time).collect();
    let value_diff: Vec<f64> = offsets
        .windows(2)
        .map(|w| (w[1].value - w[0].value).abs())
        .collect();

    let time_glitch = glitches(
        &time_diff,
        options.reset_threshold_stds,
        options.reset_threshold_seconds,
    );
    let value_glitch = glitches(
        &value_diff,
        options.reset_threshold_offset_stds,
        options.reset_threshold_offset_seconds,
    );

    let mut ranges = Vec::new();
    let mut start = 0;
    for (i, (t, v)) in time_glitch.iter().zip(&value_glitch).enumerate() {
        if *t && *v {
            ranges.push((start, i));
            start = i + 1;
        }
    }
    ranges.push((start, offsets.len() - 1));

    if ranges.len() > 1 {
        log::info!("Detected {} clock reset(s)", ranges.len() - 1);
    }
    ranges
}

/// Differences deviating from their median by more than `stds` MADs and
/// `seconds` absolute, or negative ones.
fn glitches(diffs: &[f64], stds: f64, seconds: f64) -> Vec<bool> {
    let center = median(diffs);
    let deviations: Vec<f64> = diffs.iter().map(|d| (d - center).abs()).collect();
    let mad = median(&deviations) + f64::EPSILON;
    diffs
        .iter()
        .map(|&d| d < 0.0 || ((d - center) / mad > stds && d - center > seconds))
        .collect()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Huber-loss line fit via ADMM. Residuals are measured in units of
/// `winsor_threshold`, which is where the loss turns linear.
pub fn robust_fit(offsets: &[ClockOffset], winsor_threshold: f64) -> Option<(f64, f64)> {
    match offsets {
        [] => return None,
        [only] => return Some((only.value, 0.0)),
        _ => {}
    }

    // Center the capture times to keep the normal equations well conditioned.
    let n = offsets.len();
    let center = offsets.iter().map(|o| o.time).sum::<f64>() / n as f64;
    let scale = 1.0 / winsor_threshold;
    let xs: Vec<f64> = offsets.iter().map(|o| (o.time - center) * scale).collect();
    let ys: Vec<f64> = offsets.iter().map(|o| o.value * scale).collect();

    let ata = Matrix2::new(
        n as f64 * scale * scale,
        xs.iter().sum::<f64>() * scale,
        xs.iter().sum::<f64>() * scale,
        xs.iter().map(|x| x * x).sum::<f64>(),
    );
    let cholesky = ata.cholesky()?;

    let mut z = vec![0.0; n];
    let mut u = vec![0.0; n];
    let mut coef = Vector2::zeros();

    for _ in 0..ROBUST_FIT_ITERATIONS {
        // A^T (y + z - u), A = [scale, x]
        let mut rhs = Vector2::zeros();
        for i in 0..n {
            let target = ys[i] + z[i] - u[i];
            rhs[0] += scale * target;
            rhs[1] += xs[i] * target;
        }
        coef = cholesky.solve(&rhs);

        for i in 0..n {
            let d = scale * coef[0] + xs[i] * coef[1] - ys[i] + u[i];
            let shrink = (1.0 - (1.0 + 1.0 / ROBUST_FIT_RHO) / d.abs()).max(0.0);
            z[i] = ROBUST_FIT_RHO / (1.0 + ROBUST_FIT_RHO) * d + shrink * d / (1.0 + ROBUST_FIT_RHO);
            u[i] = d - z[i];
        }
    }

    // The fitted model is value = coef[0] + coef[1] * (t - center).
    let slope = coef[1];
    let intercept = coef[0] - slope * center;
    (intercept.is_finite() && slope.is_finite()).then_some((intercept, slope))
}

/// Fit one model per reset-free segment.
pub fn fit_segments(offsets: &[ClockOffset], options: &ClockSyncOptions) -> Vec<OffsetModel> {
    let ranges = if options.handle_clock_resets {
        detect_resets(offsets, options)
    } else {
        vec![(0, offsets.len().saturating_sub(1))]
    };

    ranges
        .into_iter()
        .filter_map(|(first, last)| {
            let segment = offsets.get(first..=last)?;
            let (intercept, slope) = robust_fit(segment, options.winsor_threshold)?;
            Some(OffsetModel {
                start: segment[0].time,
                intercept,
                slope,
            })
        })
        .collect()
}

fn model_for(models: &[OffsetModel], t: f64) -> Option<&OffsetModel> {
    let idx = models.partition_point(|m| m.start <= t);
    models.get(idx.saturating_sub(1))
}

impl Stream {
    /// Correct raw timestamps with this stream's clock offsets. A second call
    /// is a no-op and returns `false`.
    pub fn synchronize_clock(&mut self, options: &ClockSyncOptions) -> bool {
        if self.clock_synchronized {
            log::debug!("Stream {} is already clock-synchronized; skipping", self.id);
            return false;
        }

        let offsets = normalize_offsets(&self.clock_offsets);
        let Some(timestamps) = self.timestamps.as_mut_slice() else {
            log::warn!(
                "Stream {} timestamps were released; cannot synchronize",
                self.id
            );
            return false;
        };

        match options.method {
            ClockSyncMethod::Interpolate => {
                for t in timestamps.iter_mut() {
                    *t += interpolate_offset(&offsets, *t);
                }
            }
            ClockSyncMethod::RobustFit => {
                let models = fit_segments(&offsets, options);
                if !models.is_empty() {
                    for t in timestamps.iter_mut() {
                        if let Some(model) = model_for(&models, *t) {
                            *t += model.offset_at(*t);
                        }
                    }
                }
            }
        }

        log::debug!(
            "Synchronized stream {} using {} clock offsets ({:?})",
            self.id,
            offsets.len(),
            options.method
        );
        self.clock_synchronized = true;
        true
    }
}
