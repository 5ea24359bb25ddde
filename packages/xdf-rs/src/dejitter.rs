//! Jitter removal and effective sampling rate.

use crate::stream::Stream;
use nalgebra::{Matrix2, Vector2};

/// Split points of a timestamp vector: `(first, last)` index ranges separated
/// by gaps larger than `threshold` seconds.
pub fn segments(timestamps: &[f64], threshold: f64) -> Vec<(usize, usize)> {
    if timestamps.is_empty() {
        return Vec::new();
    }
    let mut ranges = Vec::new();
    let mut start = 0;
    for (i, w) in timestamps.windows(2).enumerate() {
        if w[1] - w[0] > threshold {
            ranges.push((start, i));
            start = i + 1;
        }
    }
    ranges.push((start, timestamps.len() - 1));
    ranges
}

/// Least-squares line `t = intercept + slope * k` through `(k, timestamps[k])`.
fn fit_line(timestamps: &[f64]) -> Option<(f64, f64)> {
    let n = timestamps.len() as f64;
    let center = (n - 1.0) / 2.0;
    let (mut sxx, mut sy, mut sxy) = (0.0, 0.0, 0.0);
    for (k, &t) in timestamps.iter().enumerate() {
        let x = k as f64 - center;
        sxx += x * x;
        sy += t;
        sxy += x * t;
    }
    // Centered indices make the normal matrix diagonal.
    let normal = Matrix2::new(n, 0.0, 0.0, sxx);
    let coef = normal.try_inverse()? * Vector2::new(sy, sxy);
    Some((coef[0] - coef[1] * center, coef[1]))
}

impl Stream {
    /// Replace timestamps of a regularly sampled stream by per-segment linear
    /// fits and record the effective rate. Irregular streams get only the
    /// measured rate.
    pub fn remove_jitter(&mut self, break_seconds: f64, break_samples: usize) {
        if !self.info.is_regular() {
            self.measure_effective_rate();
            return;
        }
        let threshold = break_seconds.max(break_samples as f64 / self.info.nominal_srate);
        let id = self.id;
        let Some(timestamps) = self.timestamps.as_mut_slice() else {
            return;
        };

        let mut weighted_rate = 0.0;
        let mut counted = 0usize;
        let ranges = segments(timestamps, threshold);

        for &(first, last) in &ranges {
            if last <= first {
                continue;
            }
            let segment = &mut timestamps[first..=last];
            let duration = segment[segment.len() - 1] - segment[0];
            if duration > 0.0 {
                weighted_rate += (segment.len() - 1) as f64 / duration * segment.len() as f64;
                counted += segment.len();
            }
            if let Some((intercept, slope)) = fit_line(segment) {
                for (k, t) in segment.iter_mut().enumerate() {
                    *t = intercept + slope * k as f64;
                }
            }
        }

        log::debug!("Removed jitter from stream {} ({} segment(s))", id, ranges.len());
        self.info.effective_srate = (counted > 0).then(|| weighted_rate / counted as f64);
    }

    /// Effective rate `(n - 1) / duration`, when it is defined.
    pub fn measure_effective_rate(&mut self) {
        let duration = self.duration();
        let n = self.sample_count();
        self.info.effective_srate = (n > 1 && duration > 0.0).then(|| (n - 1) as f64 / duration);
    }
}
