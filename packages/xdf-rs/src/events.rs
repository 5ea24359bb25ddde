//! Aligning marker events to the samples of a data stream.

use crate::container::Container;
use crate::error::{Result, XDFError};
use crate::stream::Stream;
use serde::{Deserialize, Serialize};

/// One marker mapped onto the nearest sample of a data stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedEvent {
    /// Position of the marker in its own stream.
    pub marker_index: usize,
    pub marker_time: f64,
    pub label: Option<String>,
    pub sample_index: usize,
    pub sample_time: f64,
    /// `sample_time - marker_time`
    pub lag: f64,
}

/// Nearest data-stream sample for each time in `times`.
pub fn nearest_indices(data: &Stream, times: &[f64]) -> Vec<Option<usize>> {
    times
        .iter()
        .map(|&t| data.timestamps.nearest_index(t))
        .collect()
}

fn marker_label(markers: &Stream, index: usize) -> Option<String> {
    let count = markers.channel_count();
    if let Some(values) = markers.time_series.string_sample(index, count) {
        return values.first().cloned();
    }
    markers
        .time_series
        .value_f64(index * count)
        .map(|v| v.to_string())
}

/// Map every marker onto `data`. Markers farther than `max_lag` seconds from
/// their nearest sample are dropped.
pub fn align_events(markers: &Stream, data: &Stream, max_lag: Option<f64>) -> Vec<AlignedEvent> {
    let marker_times = markers.timestamps.to_vec();
    let nearest = nearest_indices(data, &marker_times);

    let events: Vec<AlignedEvent> = marker_times
        .iter()
        .zip(nearest)
        .enumerate()
        .filter_map(|(marker_index, (&marker_time, sample_index))| {
            let sample_index = sample_index?;
            let sample_time = data.timestamps.get(sample_index)?;
            let lag = sample_time - marker_time;
            if max_lag.is_some_and(|limit| lag.abs() > limit) {
                return None;
            }
            Some(AlignedEvent {
                marker_index,
                marker_time,
                label: marker_label(markers, marker_index),
                sample_index,
                sample_time,
                lag,
            })
        })
        .collect();

    log::debug!(
        "Aligned {}/{} markers of stream {} to stream {}",
        events.len(),
        markers.sample_count(),
        markers.id,
        data.id
    );
    events
}

impl Container {
    /// Align the markers of stream `marker_id` to the samples of `data_id`.
    pub fn align_events(
        &self,
        marker_id: u32,
        data_id: u32,
        max_lag: Option<f64>,
    ) -> Result<Vec<AlignedEvent>> {
        let lookup = |id: u32| {
            self.stream(id).ok_or_else(|| XDFError::precondition(id, "no such stream"))
        };
        Ok(align_events(lookup(marker_id)?, lookup(data_id)?, max_lag))
    }
}
