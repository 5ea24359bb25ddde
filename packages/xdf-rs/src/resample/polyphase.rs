//! Polyphase rational resampling.

use super::design::{design_lowpass, prime_factors};
use serde::{Deserialize, Serialize};

/// One interpolate-by-`up`, filter, decimate-by-`down` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub up: usize,
    pub down: usize,
}

/// Number of output samples for `n` inputs: `floor((n - 1) * up / down) + 1`.
pub fn output_len(n: usize, up: usize, down: usize) -> usize {
    if n == 0 || down == 0 {
        return 0;
    }
    ((n as u128 - 1) * up as u128 / down as u128) as usize + 1
}

/// Split `up / down` into stages of at most one prime factor each way.
///
/// Stages are ordered so that the intermediate rate never falls below the
/// lower of the source and target rates.
pub fn plan_stages(up: u64, down: u64) -> Vec<Stage> {
    let mut ups = prime_factors(up);
    let mut downs = prime_factors(down);
    // Relative rate so far, as a fraction of the source rate.
    let (mut num, mut den) = (1u128, 1u128);
    let (target_up, target_down) = (up as u128, down as u128);

    let above_floor = |n: u128, d: u128| {
        if target_up >= target_down {
            n >= d
        } else {
            n * target_down >= d * target_up
        }
    };

    let mut stages = Vec::new();
    while !ups.is_empty() || !downs.is_empty() {
        let u = if ups.is_empty() { 1 } else { ups.remove(0) };
        let pick = downs
            .iter()
            .position(|&d| above_floor(num * u as u128, den * d as u128));
        let d = pick.map(|i| downs.remove(i)).unwrap_or(1);

        if u == 1 && d == 1 {
            // Unreachable for a valid ratio; bail out rather than loop.
            log::error!("Cannot plan resampling stages for {}/{}", up, down);
            break;
        }

        num *= u as u128;
        den *= d as u128;
        stages.push(Stage {
            up: u as usize,
            down: d as usize,
        });
    }
    stages
}

/// Resample one channel by `up / down` with the given taps.
///
/// Output sample `m` sits at input position `m * down / up` (zero phase).
/// Inputs beyond either end repeat the edge values.
pub fn upfirdn(input: &[f64], up: usize, down: usize, taps: &[f64]) -> Vec<f64> {
    let n = input.len();
    let out_len = output_len(n, up, down);
    if out_len == 0 || up == 0 {
        return Vec::new();
    }
    if up == 1 && down == 1 {
        return input.to_vec();
    }

    let half = (taps.len() / 2) as i64;
    let (up_i, down_i) = (up as i64, down as i64);
    let last = n as i64 - 1;

    (0..out_len as i64)
        .map(|m| {
            let pos = m * down_i;
            // Input samples i whose upsampled index i*up falls within the filter span.
            let first = (pos - half).div_euclid(up_i) + i64::from((pos - half).rem_euclid(up_i) != 0);
            let end = (pos + half).div_euclid(up_i);
            (first..=end)
                .map(|i| {
                    let k = (pos - i * up_i + half) as usize;
                    taps[k] * input[i.clamp(0, last) as usize]
                })
                .sum()
        })
        .collect()
}

/// Run every stage over one channel and fix the length to the exact
/// single-step output size.
pub fn resample_channel(input: &[f64], stages: &[(Stage, Vec<f64>)], expected_len: usize) -> Vec<f64> {
    let mut signal = input.to_vec();
    for (stage, taps) in stages {
        signal = upfirdn(&signal, stage.up, stage.down, taps);
    }
    match signal.last().copied() {
        Some(edge) => signal.resize(expected_len, edge),
        None => signal.clear(),
    }
    signal
}

/// Stage plan together with each stage's filter.
pub fn design_stages(up: u64, down: u64) -> Vec<(Stage, Vec<f64>)> {
    plan_stages(up, down)
        .into_iter()
        .map(|stage| (stage, design_lowpass(stage.up, stage.down)))
        .collect()
}
