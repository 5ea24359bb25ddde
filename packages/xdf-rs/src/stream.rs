use crate::error::{Result, XDFError};
use crate::samples::{TimeSeries, TimestampState, WireLayout};
use crate::types::{ChannelDescriptor, ChannelFormat, ClockOffset, FooterInfo, StreamInfo};
use serde::{Deserialize, Serialize};

/// Per-sample timestamps of a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Timestamps {
    /// One timestamp per sample, in seconds.
    Explicit { values: Vec<f64> },
    /// Uniform grid left behind once the explicit vector has been released.
    Uniform { first: f64, rate: f64, count: usize },
}

impl Default for Timestamps {
    fn default() -> Self {
        Timestamps::Explicit { values: Vec::new() }
    }
}

impl Timestamps {
    pub fn len(&self) -> usize {
        match self {
            Timestamps::Explicit { values } => values.len(),
            Timestamps::Uniform { count, .. } => *count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        match self {
            Timestamps::Explicit { values } => values.get(index).copied(),
            Timestamps::Uniform { first, rate, count } => {
                (index < *count).then(|| first + index as f64 / rate)
            }
        }
    }

    pub fn first(&self) -> Option<f64> {
        self.get(0)
    }

    pub fn last(&self) -> Option<f64> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// The explicit vector, if it has not been released.
    pub fn as_slice(&self) -> Option<&[f64]> {
        match self {
            Timestamps::Explicit { values } => Some(values),
            Timestamps::Uniform { .. } => None,
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> Option<&mut [f64]> {
        match self {
            Timestamps::Explicit { values } => Some(values),
            Timestamps::Uniform { .. } => None,
        }
    }

    /// Materialize every timestamp.
    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Timestamps::Explicit { values } => values.clone(),
            Timestamps::Uniform { count, .. } => (0..*count).filter_map(|i| self.get(i)).collect(),
        }
    }

    /// Index of the sample closest in time to `t`. Timestamps are assumed to
    /// be non-decreasing; ties resolve to the earlier sample.
    pub fn nearest_index(&self, t: f64) -> Option<usize> {
        let n = self.len();
        if n == 0 || !t.is_finite() {
            return None;
        }

        let upper = match self {
            Timestamps::Explicit { values } => values.partition_point(|&x| x < t),
            Timestamps::Uniform { first, rate, count } => {
                let pos = ((t - first) * rate).ceil();
                pos.clamp(0.0, *count as f64) as usize
            }
        };

        if upper == 0 {
            return Some(0);
        }
        if upper >= n {
            return Some(n - 1);
        }
        let before = self.get(upper - 1)?;
        let after = self.get(upper)?;
        if (t - before) <= (after - t) {
            Some(upper - 1)
        } else {
            Some(upper)
        }
    }
}

/// One stream of the container: metadata, typed samples and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub id: u32,
    pub info: StreamInfo,
    pub footer: Option<FooterInfo>,
    pub time_series: TimeSeries,
    pub timestamps: Timestamps,
    /// Clock-offset observations in file order.
    pub clock_offsets: Vec<ClockOffset>,
    /// Recoverable problems found while assembling this stream.
    pub issues: Vec<String>,
    /// Whether a footer chunk was seen.
    pub closed: bool,
    pub clock_synchronized: bool,
    /// Target rate of the last resampling, if any.
    pub resampled_rate: Option<f64>,
    #[serde(skip)]
    pub(crate) timestamp_state: TimestampState,
    #[serde(skip)]
    pub(crate) wire: WireLayout,
}

impl Stream {
    pub fn new(id: u32, info: StreamInfo) -> Self {
        let time_series = TimeSeries::empty(info.channel_format);
        let wire = WireLayout::from(&info);
        Self {
            id,
            info,
            footer: None,
            time_series,
            timestamps: Timestamps::default(),
            clock_offsets: Vec::new(),
            issues: Vec::new(),
            closed: false,
            clock_synchronized: false,
            resampled_rate: None,
            timestamp_state: TimestampState::default(),
            wire,
        }
    }

    /// Placeholder for a stream whose header could not be parsed. Its data
    /// chunks are skipped, so it stays empty.
    pub(crate) fn with_invalid_header(id: u32, error: &XDFError) -> Self {
        let info = StreamInfo {
            name: String::new(),
            content_type: String::new(),
            channel_count: 0,
            channel_format: ChannelFormat::Double64,
            nominal_srate: 0.0,
            effective_srate: None,
            source_id: None,
            hostname: None,
            created_at: None,
            channels: Vec::new(),
            desc: None,
        };
        let mut stream = Self::new(id, info);
        stream.issues.push(error.to_string());
        stream
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn content_type(&self) -> &str {
        &self.info.content_type
    }

    pub fn channel_count(&self) -> usize {
        self.info.channel_count
    }

    pub fn format(&self) -> ChannelFormat {
        self.time_series.format()
    }

    pub fn sample_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    /// Flagged streams had a header problem or a chunk that could not be decoded.
    pub fn is_malformed(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Rate of the current sample grid: the resampling target if the stream
    /// was resampled, otherwise the nominal rate.
    pub fn current_rate(&self) -> f64 {
        self.resampled_rate.unwrap_or(self.info.nominal_srate)
    }

    pub fn duration(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// One channel as f64. `None` for string streams or a bad index.
    pub fn channel(&self, index: usize) -> Option<Vec<f64>> {
        let count = self.channel_count();
        if index >= count || !self.time_series.is_numeric() {
            return None;
        }
        (0..self.sample_count())
            .map(|s| self.time_series.value_f64(s * count + index))
            .collect()
    }

    /// Append a decoded run, keeping samples and timestamps in lockstep.
    pub(crate) fn push_run(&mut self, values: TimeSeries, timestamps: Vec<f64>) {
        self.time_series.append(values);
        if let Timestamps::Explicit { values } = &mut self.timestamps {
            values.extend(timestamps);
        }
    }

    /// Subtract each channel's mean from its samples. Integer buffers are
    /// promoted to double64.
    pub fn subtract_mean(&mut self) -> Result<()> {
        if self.channel_count() == 0 {
            return Err(XDFError::precondition(self.id, "stream has no valid header"));
        }
        if !self.time_series.is_numeric() {
            return Err(XDFError::TypeMismatch {
                stream_id: self.id,
                operation: "mean subtraction",
                format: self.format(),
            });
        }
        if self.is_empty() {
            return Ok(());
        }
        let channels = self
            .time_series
            .to_f64_channels(self.channel_count())
            .unwrap_or_default();

        let centered: Vec<Vec<f64>> = channels
            .into_iter()
            .map(|mut channel| {
                let mean = channel.iter().sum::<f64>() / channel.len() as f64;
                channel.iter_mut().for_each(|x| *x -= mean);
                channel
            })
            .collect();

        self.time_series = TimeSeries::from_f64_channels(&centered);
        log::debug!("Subtracted channel means from stream {}", self.id);
        Ok(())
    }

    /// Give every channel without a label the positional name `Ch{n}`.
    /// Returns the number of labels generated.
    pub fn synthesize_labels(&mut self) -> usize {
        let count = self.channel_count();
        if self.info.channels.len() < count {
            self.info.channels.resize_with(count, ChannelDescriptor::default);
        }

        let mut generated = 0;
        for (i, channel) in self.info.channels.iter_mut().take(count).enumerate() {
            let missing = channel.label.as_deref().map_or(true, |l| l.trim().is_empty());
            if missing {
                channel.label = Some(format!("Ch{}", i + 1));
                generated += 1;
            }
        }
        generated
    }

    /// Drop the explicit timestamp vector in favour of the uniform grid it
    /// describes. Only valid after resampling; cannot be undone.
    pub fn release_timestamps(&mut self) -> Result<()> {
        let rate = self.resampled_rate.ok_or_else(|| {
            XDFError::precondition(
                self.id,
                "timestamps can only be released once the stream is uniformly resampled",
            )
        })?;

        if let Timestamps::Explicit { values } = &self.timestamps {
            let first = values.first().copied().unwrap_or(0.0);
            let count = values.len();
            self.timestamps = Timestamps::Uniform { first, rate, count };
            log::debug!(
                "Released {} explicit timestamps of stream {}",
                count,
                self.id
            );
        }
        Ok(())
    }

    /// Timestamps of the first and last sample holding at least one non-NaN
    /// value. String samples always count as valid.
    pub fn valid_time_range(&self) -> Option<(f64, f64)> {
        let count = self.channel_count();
        let series = &self.time_series;
        let valid = |sample: usize| {
            !series.is_numeric()
                || (0..count).any(|ch| {
                    series
                        .value_f64(sample * count + ch)
                        .is_some_and(|v| !v.is_nan())
                })
        };
        let first = (0..self.sample_count()).find(|&s| valid(s))?;
        let last = (0..self.sample_count()).rev().find(|&s| valid(s))?;
        Some((self.timestamps.get(first)?, self.timestamps.get(last)?))
    }

    /// Keep only the samples whose timestamps lie in `[start, end]`.
    pub(crate) fn retain_time_range(&mut self, start: f64, end: f64) {
        let first = (0..self.sample_count())
            .find(|&i| self.timestamps.get(i).is_some_and(|t| t >= start))
            .unwrap_or(self.sample_count());
        let last = (0..self.sample_count())
            .rev()
            .find(|&i| self.timestamps.get(i).is_some_and(|t| t <= end))
            .map(|i| i + 1)
            .unwrap_or(0);
        let last = last.max(first);

        let count = self.channel_count();
        self.time_series.retain_samples(first, last, count);
        self.timestamps = match std::mem::take(&mut self.timestamps) {
            Timestamps::Explicit { mut values } => {
                values.truncate(last);
                values.drain(..first.min(values.len()));
                Timestamps::Explicit { values }
            }
            Timestamps::Uniform { first: t0, rate, .. } => Timestamps::Uniform {
                first: t0 + first as f64 / rate,
                rate,
                count: last - first,
            },
        };
    }
}
