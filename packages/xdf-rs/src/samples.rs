//! Typed time-series buffers and the samples chunk decoder.
//!
//! Values are stored sample-major in one flat vector per stream:
//! `[s0c0, s0c1, ..., s1c0, s1c1, ...]`.

use crate::chunk::read_varlen_int;
use crate::types::{ChannelFormat, StreamInfo};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{self, Cursor, Read};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "values", rename_all = "snake_case")]
pub enum TimeSeries {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Double64(Vec<f64>),
    String(Vec<String>),
}

macro_rules! for_each_numeric {
    ($series:expr, $v:ident => $body:expr, $string:ident => $sbody:expr) => {
        match $series {
            TimeSeries::Int8($v) => $body,
            TimeSeries::Int16($v) => $body,
            TimeSeries::Int32($v) => $body,
            TimeSeries::Int64($v) => $body,
            TimeSeries::Float32($v) => $body,
            TimeSeries::Double64($v) => $body,
            TimeSeries::String($string) => $sbody,
        }
    };
}

impl TimeSeries {
    pub fn empty(format: ChannelFormat) -> Self {
        Self::with_capacity(format, 0)
    }

    pub fn with_capacity(format: ChannelFormat, capacity: usize) -> Self {
        match format {
            ChannelFormat::Int8 => TimeSeries::Int8(Vec::with_capacity(capacity)),
            ChannelFormat::Int16 => TimeSeries::Int16(Vec::with_capacity(capacity)),
            ChannelFormat::Int32 => TimeSeries::Int32(Vec::with_capacity(capacity)),
            ChannelFormat::Int64 => TimeSeries::Int64(Vec::with_capacity(capacity)),
            ChannelFormat::Float32 => TimeSeries::Float32(Vec::with_capacity(capacity)),
            ChannelFormat::Double64 => TimeSeries::Double64(Vec::with_capacity(capacity)),
            ChannelFormat::String => TimeSeries::String(Vec::with_capacity(capacity)),
        }
    }

    pub fn format(&self) -> ChannelFormat {
        match self {
            TimeSeries::Int8(_) => ChannelFormat::Int8,
            TimeSeries::Int16(_) => ChannelFormat::Int16,
            TimeSeries::Int32(_) => ChannelFormat::Int32,
            TimeSeries::Int64(_) => ChannelFormat::Int64,
            TimeSeries::Float32(_) => ChannelFormat::Float32,
            TimeSeries::Double64(_) => ChannelFormat::Double64,
            TimeSeries::String(_) => ChannelFormat::String,
        }
    }

    /// Total number of stored values (samples × channels).
    pub fn value_count(&self) -> usize {
        for_each_numeric!(self, v => v.len(), s => s.len())
    }

    pub fn is_numeric(&self) -> bool {
        self.format().is_numeric()
    }

    /// Append another buffer of the same format.
    pub(crate) fn append(&mut self, other: TimeSeries) {
        match (self, other) {
            (TimeSeries::Int8(a), TimeSeries::Int8(b)) => a.extend(b),
            (TimeSeries::Int16(a), TimeSeries::Int16(b)) => a.extend(b),
            (TimeSeries::Int32(a), TimeSeries::Int32(b)) => a.extend(b),
            (TimeSeries::Int64(a), TimeSeries::Int64(b)) => a.extend(b),
            (TimeSeries::Float32(a), TimeSeries::Float32(b)) => a.extend(b),
            (TimeSeries::Double64(a), TimeSeries::Double64(b)) => a.extend(b),
            (TimeSeries::String(a), TimeSeries::String(b)) => a.extend(b),
            (a, b) => log::error!(
                "Refusing to append {} values to a {} buffer",
                b.format(),
                a.format()
            ),
        }
    }

    /// One value as f64; `None` for strings or out of range.
    pub fn value_f64(&self, index: usize) -> Option<f64> {
        match self {
            TimeSeries::Int8(v) => v.get(index).map(|&x| x as f64),
            TimeSeries::Int16(v) => v.get(index).map(|&x| x as f64),
            TimeSeries::Int32(v) => v.get(index).map(|&x| x as f64),
            TimeSeries::Int64(v) => v.get(index).map(|&x| x as f64),
            TimeSeries::Float32(v) => v.get(index).map(|&x| x as f64),
            TimeSeries::Double64(v) => v.get(index).copied(),
            TimeSeries::String(_) => None,
        }
    }

    /// De-interleave into one f64 vector per channel. `None` for strings.
    pub fn to_f64_channels(&self, channel_count: usize) -> Option<Vec<Vec<f64>>> {
        if !self.is_numeric() || channel_count == 0 {
            return None;
        }
        let num_samples = self.value_count() / channel_count;
        let mut channels = vec![Vec::with_capacity(num_samples); channel_count];
        for sample in 0..num_samples {
            for (ch, channel) in channels.iter_mut().enumerate() {
                channel.push(self.value_f64(sample * channel_count + ch)?);
            }
        }
        Some(channels)
    }

    /// Interleave per-channel f64 data into a `Double64` buffer. All channels
    /// are cut to the shortest one.
    pub fn from_f64_channels(channels: &[Vec<f64>]) -> Self {
        let num_samples = channels.iter().map(Vec::len).min().unwrap_or(0);
        let mut values = Vec::with_capacity(num_samples * channels.len());
        for sample in 0..num_samples {
            for channel in channels {
                values.push(channel[sample]);
            }
        }
        TimeSeries::Double64(values)
    }

    /// String values of one sample; `None` for numeric buffers.
    pub fn string_sample(&self, sample: usize, channel_count: usize) -> Option<&[String]> {
        match self {
            TimeSeries::String(v) => v.get(sample * channel_count..(sample + 1) * channel_count),
            _ => None,
        }
    }

    /// Keep only samples in `start..end`.
    pub(crate) fn retain_samples(&mut self, start: usize, end: usize, channel_count: usize) {
        let (a, b) = (start * channel_count, end * channel_count);
        for_each_numeric!(self, v => { v.truncate(b); v.drain(..a.min(v.len())); }, s => {
            s.truncate(b);
            s.drain(..a.min(s.len()));
        })
    }
}

/// Why a samples chunk could not be decoded.
#[derive(Debug)]
pub(crate) enum DecodeError {
    /// The payload is internally inconsistent; the chunk is dropped.
    Malformed(String),
    /// A sample without a timestamp and nothing to deduce it from.
    MissingTimestamp { sample: u64 },
}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        DecodeError::Malformed(err.to_string())
    }
}

/// Per-stream state carried across samples chunks for timestamp deduction.
#[derive(Debug, Clone, Default)]
pub(crate) struct TimestampState {
    last_explicit: Option<f64>,
    since_explicit: u64,
    decoded: u64,
}

/// Layout samples chunks are decoded with, fixed when the header is read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WireLayout {
    pub format: ChannelFormat,
    pub channel_count: usize,
    pub nominal_srate: f64,
}

impl Default for WireLayout {
    fn default() -> Self {
        Self {
            format: ChannelFormat::Double64,
            channel_count: 0,
            nominal_srate: 0.0,
        }
    }
}

impl From<&StreamInfo> for WireLayout {
    fn from(info: &StreamInfo) -> Self {
        Self {
            format: info.channel_format,
            channel_count: info.channel_count,
            nominal_srate: info.nominal_srate,
        }
    }
}

/// A decoded run of samples, ready to be appended to a stream.
#[derive(Debug)]
pub(crate) struct SampleRun {
    pub values: TimeSeries,
    pub timestamps: Vec<f64>,
}

/// Decode a samples chunk payload (stream id already stripped).
///
/// A sample without an explicit timestamp gets
/// `last_explicit + k / nominal_srate`, `k` counting samples since the last
/// explicit timestamp. The state is only committed when the whole chunk
/// decodes.
pub(crate) fn decode_samples(
    payload: &[u8],
    format: ChannelFormat,
    channel_count: usize,
    nominal_srate: f64,
    state: &mut TimestampState,
) -> Result<SampleRun, DecodeError> {
    let mut cursor = Cursor::new(payload);
    let num_samples = read_varlen_int(&mut cursor)?;

    // Each sample needs at least its timestamp-size byte.
    let remaining = payload.len() as u64 - cursor.position();
    if num_samples > remaining {
        return Err(DecodeError::Malformed(format!(
            "chunk declares {} samples but holds only {} bytes",
            num_samples, remaining
        )));
    }

    // Lower bound on the payload size: one timestamp byte plus the values of
    // every sample (a string value takes at least its length byte).
    let value_size = format.value_size().unwrap_or(1) as u64;
    let min_bytes = (channel_count as u64)
        .checked_mul(value_size)
        .and_then(|per_sample| per_sample.checked_add(1))
        .and_then(|per_sample| per_sample.checked_mul(num_samples));
    match min_bytes {
        Some(needed) if needed <= remaining => {}
        _ => {
            return Err(DecodeError::Malformed(format!(
                "{} samples of {} {} channels cannot fit in {} bytes",
                num_samples, channel_count, format, remaining
            )))
        }
    }

    let num_samples = num_samples as usize;
    let mut values = TimeSeries::with_capacity(format, num_samples * channel_count);
    let mut timestamps = Vec::with_capacity(num_samples);
    let mut local = state.clone();

    for _ in 0..num_samples {
        let timestamp = match cursor.read_u8()? {
            8 => {
                let ts = cursor.read_f64::<LittleEndian>()?;
                local.last_explicit = Some(ts);
                local.since_explicit = 0;
                ts
            }
            // Irregular streams repeat the previous timestamp.
            0 => match local.last_explicit {
                Some(anchor) if nominal_srate > 0.0 => {
                    local.since_explicit += 1;
                    anchor + local.since_explicit as f64 / nominal_srate
                }
                Some(anchor) => anchor,
                None => {
                    return Err(DecodeError::MissingTimestamp {
                        sample: local.decoded,
                    })
                }
            },
            other => {
                return Err(DecodeError::Malformed(format!(
                    "invalid timestamp size {}",
                    other
                )))
            }
        };
        timestamps.push(timestamp);
        read_values(&mut cursor, &mut values, channel_count)?;
        local.decoded += 1;
    }

    if (cursor.position() as usize) < payload.len() {
        log::debug!(
            "Samples chunk has {} trailing bytes",
            payload.len() - cursor.position() as usize
        );
    }

    *state = local;
    Ok(SampleRun { values, timestamps })
}

fn read_values(
    cursor: &mut Cursor<&[u8]>,
    values: &mut TimeSeries,
    channel_count: usize,
) -> Result<(), DecodeError> {
    for _ in 0..channel_count {
        match values {
            TimeSeries::Int8(v) => v.push(cursor.read_i8()?),
            TimeSeries::Int16(v) => v.push(cursor.read_i16::<LittleEndian>()?),
            TimeSeries::Int32(v) => v.push(cursor.read_i32::<LittleEndian>()?),
            TimeSeries::Int64(v) => v.push(cursor.read_i64::<LittleEndian>()?),
            TimeSeries::Float32(v) => v.push(cursor.read_f32::<LittleEndian>()?),
            TimeSeries::Double64(v) => v.push(cursor.read_f64::<LittleEndian>()?),
            TimeSeries::String(v) => {
                let len = read_varlen_int(cursor)?;
                let remaining = cursor.get_ref().len() as u64 - cursor.position();
                if len > remaining {
                    return Err(DecodeError::Malformed(format!(
                        "string value of {} bytes exceeds chunk",
                        len
                    )));
                }
                let mut raw = vec![0u8; len as usize];
                cursor.read_exact(&mut raw)?;
                v.push(String::from_utf8_lossy(&raw).into_owned());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_payload(samples: &[(Option<f64>, [f32; 2])]) -> Vec<u8> {
        let mut out = vec![4u8];
        out.extend_from_slice(&(samples.len() as u32).to_le_bytes());
        for (ts, vals) in samples {
            match ts {
                Some(t) => {
                    out.push(8);
                    out.extend_from_slice(&t.to_le_bytes());
                }
                None => out.push(0),
            }
            for v in vals {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }

    #[test]
    fn test_decode_deduces_missing_timestamps() {
        let payload = numeric_payload(&[
            (Some(10.0), [1.0, 2.0]),
            (None, [3.0, 4.0]),
            (None, [5.0, 6.0]),
        ]);
        let mut state = TimestampState::default();
        let run = decode_samples(&payload, ChannelFormat::Float32, 2, 100.0, &mut state).unwrap();
        assert_eq!(run.values, TimeSeries::Float32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        let expected = [10.0, 10.01, 10.02];
        for (ts, want) in run.timestamps.iter().zip(expected) {
            assert!((ts - want).abs() < 1e-12, "{} != {}", ts, want);
        }

        // The anchor carries over into the next chunk.
        let next = numeric_payload(&[(None, [0.0, 0.0])]);
        let run = decode_samples(&next, ChannelFormat::Float32, 2, 100.0, &mut state).unwrap();
        assert_eq!(run.timestamps.len(), 1);
        assert!((run.timestamps[0] - 10.03).abs() < 1e-12);
    }

    #[test]
    fn test_first_sample_without_timestamp() {
        let payload = numeric_payload(&[(None, [1.0, 2.0])]);
        let mut state = TimestampState::default();
        let err = decode_samples(&payload, ChannelFormat::Float32, 2, 100.0, &mut state).unwrap_err();
        assert!(matches!(err, DecodeError::MissingTimestamp { sample: 0 }));
    }

    #[test]
    fn test_irregular_stream_repeats_previous_timestamp() {
        let payload = numeric_payload(&[
            (Some(5.0), [1.0, 1.0]),
            (None, [2.0, 2.0]),
            (Some(7.5), [3.0, 3.0]),
            (None, [4.0, 4.0]),
        ]);
        let mut state = TimestampState::default();
        let run = decode_samples(&payload, ChannelFormat::Float32, 2, 0.0, &mut state).unwrap();
        assert_eq!(run.timestamps, vec![5.0, 5.0, 7.5, 7.5]);

        let mut fresh = TimestampState::default();
        let first = numeric_payload(&[(None, [0.0, 0.0])]);
        assert!(matches!(
            decode_samples(&first, ChannelFormat::Float32, 2, 0.0, &mut fresh),
            Err(DecodeError::MissingTimestamp { sample: 0 })
        ));
    }

    #[test]
    fn test_oversized_channel_count_is_malformed() {
        let payload = numeric_payload(&[(Some(1.0), [1.0, 2.0])]);
        let mut state = TimestampState::default();
        let err = decode_samples(
            &payload,
            ChannelFormat::Float32,
            200_000_000_000,
            100.0,
            &mut state,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));

        let err = decode_samples(&payload, ChannelFormat::Double64, usize::MAX, 100.0, &mut state)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_short_payload_is_malformed_and_state_untouched() {
        let mut payload = numeric_payload(&[(Some(1.0), [1.0, 2.0]), (Some(2.0), [3.0, 4.0])]);
        payload.truncate(payload.len() - 3);
        let mut state = TimestampState::default();
        let err = decode_samples(&payload, ChannelFormat::Float32, 2, 0.0, &mut state).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
        assert!(state.last_explicit.is_none());
    }

    #[test]
    fn test_decode_strings() {
        let mut payload = vec![1u8, 2];
        for (ts, s) in [(1.5f64, "start"), (2.5, "stop")] {
            payload.push(8);
            payload.extend_from_slice(&ts.to_le_bytes());
            payload.push(1);
            payload.push(s.len() as u8);
            payload.extend_from_slice(s.as_bytes());
        }
        let mut state = TimestampState::default();
        let run = decode_samples(&payload, ChannelFormat::String, 1, 0.0, &mut state).unwrap();
        assert_eq!(
            run.values,
            TimeSeries::String(vec!["start".to_string(), "stop".to_string()])
        );
        assert_eq!(run.values.string_sample(1, 1), Some(&["stop".to_string()][..]));
    }

    #[test]
    fn test_channel_conversion() {
        let series = TimeSeries::Int16(vec![1, 10, 2, 20, 3, 30]);
        let channels = series.to_f64_channels(2).unwrap();
        assert_eq!(channels, vec![vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]]);
        assert_eq!(
            TimeSeries::from_f64_channels(&channels),
            TimeSeries::Double64(vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0])
        );
        assert!(TimeSeries::String(vec![]).to_f64_channels(1).is_none());
    }

    #[test]
    fn test_retain_samples() {
        let mut series = TimeSeries::Int32(vec![0, 0, 1, 1, 2, 2, 3, 3]);
        series.retain_samples(1, 3, 2);
        assert_eq!(series, TimeSeries::Int32(vec![1, 1, 2, 2]));
    }
}
