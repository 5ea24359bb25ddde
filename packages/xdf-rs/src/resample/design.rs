//! FIR Filter Design
//!
//! Kaiser-windowed sinc low-pass filters for rational rate conversion, and the
//! reduction of a rate ratio to a small `up / down` fraction.

use std::f64::consts::PI;

/// Kaiser window shape parameter.
pub const KAISER_BETA: f64 = 5.0;

/// Filter half-length, in multiples of `max(up, down)`.
pub const HALF_LEN_FACTOR: usize = 10;

/// Zeroth-order modified Bessel function of the first kind (power series).
pub fn bessel_i0(x: f64) -> f64 {
    let half_sq = (x / 2.0) * (x / 2.0);
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 1..200 {
        term *= half_sq / (k as f64 * k as f64);
        sum += term;
        if term < sum * 1e-17 {
            break;
        }
    }
    sum
}

/// Symmetric Kaiser window of `len` points.
pub fn kaiser_window(len: usize, beta: f64) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let denom = bessel_i0(beta);
    let m = (len - 1) as f64;
    (0..len)
        .map(|n| {
            let r = 2.0 * n as f64 / m - 1.0;
            bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / denom
        })
        .collect()
}

#[inline]
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Low-pass taps for an `up / down` conversion stage.
///
/// The cutoff sits at the Nyquist frequency of the lower of the two rates
/// (relative to the upsampled rate: `1 / max(up, down)`). Taps are scaled to
/// sum to `up`, which restores unit gain after zero-stuffing.
pub fn design_lowpass(up: usize, down: usize) -> Vec<f64> {
    let max_rate = up.max(down).max(1);
    let half_len = HALF_LEN_FACTOR * max_rate;
    let len = 2 * half_len + 1;
    let cutoff = 1.0 / max_rate as f64;
    let window = kaiser_window(len, KAISER_BETA);

    let mut taps: Vec<f64> = window
        .iter()
        .enumerate()
        .map(|(k, w)| cutoff * sinc(cutoff * (k as f64 - half_len as f64)) * w)
        .collect();

    let sum: f64 = taps.iter().sum();
    if sum != 0.0 {
        let gain = up as f64 / sum;
        taps.iter_mut().for_each(|t| *t *= gain);
    }
    taps
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Closest fraction `up / down` to `ratio` with `down <= max_denominator`,
/// in lowest terms. Continued-fraction expansion with a final
/// semiconvergent check.
pub fn rational_ratio(ratio: f64, max_denominator: u64) -> Option<(u64, u64)> {
    if !ratio.is_finite() || ratio <= 0.0 || max_denominator == 0 {
        return None;
    }

    let (mut p0, mut q0, mut p1, mut q1) = (0u64, 1u64, 1u64, 0u64);
    let mut value = ratio;
    let mut exhausted = false;

    loop {
        let whole = value.floor();
        if whole > u32::MAX as f64 {
            break;
        }
        let a = whole as u64;
        let q2 = q0 + a * q1;
        if q2 > max_denominator {
            exhausted = true;
            break;
        }
        let p2 = p0 + a * p1;
        (p0, q0, p1, q1) = (p1, q1, p2, q2);

        let frac = value - whole;
        if frac < 1e-10 {
            break;
        }
        value = 1.0 / frac;
    }

    if q1 == 0 {
        return None;
    }

    let (mut num, mut den) = (p1, q1);
    if exhausted {
        let k = (max_denominator - q0) / q1;
        let (sp, sq) = (p0 + k * p1, q0 + k * q1);
        let semi_err = (sp as f64 / sq as f64 - ratio).abs();
        let conv_err = (p1 as f64 / q1 as f64 - ratio).abs();
        if semi_err < conv_err {
            (num, den) = (sp, sq);
        }
    }

    if num == 0 {
        return None;
    }
    let g = gcd(num, den);
    Some((num / g, den / g))
}

/// Prime factors in descending order.
pub fn prime_factors(mut n: u64) -> Vec<u64> {
    let mut factors = Vec::new();
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors.reverse();
    factors
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Center and left half of the 41-tap Kaiser (beta 5) windowed sinc with
    /// cutoff 1/2, scaled to sum 2. Center first.
    const TAPS_2_1: [f64; 21] = [
        1.00051747059606022e+00, 6.33400691360601509e-01, 0.0, -2.01860394795467635e-01,
        0.0, 1.10576567823714014e-01, 0.0, -6.86803597634897817e-02,
        0.0, 4.40462411481492358e-02, 0.0, -2.79799464768703023e-02,
        0.0, 1.71131180049628046e-02, 0.0, -9.78966867857514016e-03,
        0.0, 5.01793362429542745e-03, 0.0, -2.10291754535024255e-03,
        0.0,
    ];

    /// Same design for 1/3: 61 taps, cutoff 1/3, scaled to sum 1.
    const TAPS_1_3: [f64; 31] = [
        3.33535391184592522e-01, 2.75147722678933782e-01, 1.36552215142397626e-01, 0.0,
        -6.62632387751258128e-02, -5.18280918536453555e-02, 0.0, 3.48413387987225806e-02,
        2.93410384085419328e-02, 0.0, -2.13858296429692944e-02, -1.83984884149754058e-02,
        0.0, 1.36906703111384642e-02, 1.18076364635328942e-02, 0.0,
        -8.72911314408613900e-03, -7.46728859359711058e-03, 0.0, 5.38274708007010789e-03,
        4.52642270135855326e-03, 0.0, -3.12116590772447584e-03, -2.55169020814870933e-03,
        0.0, 1.63632575362762374e-03, 1.27583092788420300e-03, 0.0,
        -7.17161508011700645e-04, -5.07575810220031059e-04, 0.0,
    ];

    fn assert_matches_table(taps: &[f64], table: &[f64]) {
        let half = table.len() - 1;
        assert_eq!(taps.len(), 2 * half + 1);
        for (offset, expected) in table.iter().enumerate() {
            for tap in [taps[half - offset], taps[half + offset]] {
                assert!(
                    (tap - expected).abs() < 1e-12,
                    "offset {}: {} != {}",
                    offset,
                    tap,
                    expected
                );
            }
        }
    }

    #[test]
    fn test_upsample_by_two_matches_reference_taps() {
        assert_matches_table(&design_lowpass(2, 1), &TAPS_2_1);
    }

    #[test]
    fn test_downsample_by_three_matches_reference_taps() {
        assert_matches_table(&design_lowpass(1, 3), &TAPS_1_3);
    }

    #[test]
    fn test_halfband_zero_at_even_offsets() {
        let taps = design_lowpass(2, 1);
        let center = taps.len() / 2;
        for offset in (2..center).step_by(2) {
            assert!(taps[center + offset].abs() < 1e-12, "offset {}", offset);
            assert!(taps[center - offset].abs() < 1e-12, "offset {}", offset);
        }
        assert!(taps[center + 1].abs() > 1e-3);
    }

    #[test]
    fn test_taps_sum_to_up() {
        for (up, down) in [(1, 2), (3, 2), (5, 1), (2, 7)] {
            let sum: f64 = design_lowpass(up, down).iter().sum();
            assert!((sum - up as f64).abs() < 1e-9, "{}/{}: {}", up, down, sum);
        }
    }

    #[test]
    fn test_taps_are_symmetric() {
        let taps = design_lowpass(3, 4);
        let n = taps.len();
        for k in 0..n / 2 {
            assert!((taps[k] - taps[n - 1 - k]).abs() < 1e-15);
        }
    }

    #[test]
    fn test_rational_ratio() {
        assert_eq!(rational_ratio(2.5, 1000), Some((5, 2)));
        assert_eq!(rational_ratio(1.0 / 3.0, 1000), Some((1, 3)));
        assert_eq!(rational_ratio(48000.0 / 44100.0, 1000), Some((160, 147)));
        assert_eq!(rational_ratio(std::f64::consts::PI, 100), Some((311, 99)));
        assert_eq!(rational_ratio(0.0, 1000), None);
        assert_eq!(rational_ratio(f64::NAN, 1000), None);
    }

    #[test]
    fn test_prime_factors() {
        assert_eq!(prime_factors(360), vec![5, 3, 3, 2, 2, 2]);
        assert_eq!(prime_factors(1), Vec::<u64>::new());
        assert_eq!(prime_factors(97), vec![97]);
    }

    #[test]
    fn test_bessel_i0_known_values() {
        assert!((bessel_i0(0.0) - 1.0).abs() < 1e-15);
        assert!((bessel_i0(1.0) - 1.266_065_877_752_008).abs() < 1e-12);
        assert!((bessel_i0(5.0) - 27.239_871_823_604_44).abs() < 1e-9);
    }
}
