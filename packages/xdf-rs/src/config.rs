//! Load and post-processing options.
//!
//! All fields carry serde defaults so a partial JSON document is a valid
//! configuration.

use crate::error::{Result, XDFError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How clock-offset observations are turned into timestamp corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSyncMethod {
    /// Piecewise-linear interpolation between observations.
    #[default]
    Interpolate,
    /// Huber-loss linear fit per segment between detected clock resets.
    RobustFit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockSyncOptions {
    #[serde(default)]
    pub method: ClockSyncMethod,

    /// Split the offset series at clock resets (robust fit only)
    #[serde(default = "default_true")]
    pub handle_clock_resets: bool,

    /// Interval glitch threshold, in median absolute deviations
    #[serde(default = "default_reset_threshold_stds")]
    pub reset_threshold_stds: f64,

    /// Interval glitch threshold, in seconds
    #[serde(default = "default_reset_threshold_seconds")]
    pub reset_threshold_seconds: f64,

    /// Offset jump threshold, in median absolute deviations
    #[serde(default = "default_reset_threshold_offset_stds")]
    pub reset_threshold_offset_stds: f64,

    /// Offset jump threshold, in seconds
    #[serde(default = "default_reset_threshold_offset_seconds")]
    pub reset_threshold_offset_seconds: f64,

    /// Residual (seconds) above which the fit treats an observation as an outlier
    #[serde(default = "default_winsor_threshold")]
    pub winsor_threshold: f64,
}

fn default_true() -> bool {
    true
}
fn default_reset_threshold_stds() -> f64 {
    5.0
}
fn default_reset_threshold_seconds() -> f64 {
    5.0
}
fn default_reset_threshold_offset_stds() -> f64 {
    10.0
}
fn default_reset_threshold_offset_seconds() -> f64 {
    1.0
}
fn default_winsor_threshold() -> f64 {
    0.0001
}

impl Default for ClockSyncOptions {
    fn default() -> Self {
        Self {
            method: ClockSyncMethod::default(),
            handle_clock_resets: true,
            reset_threshold_stds: default_reset_threshold_stds(),
            reset_threshold_seconds: default_reset_threshold_seconds(),
            reset_threshold_offset_stds: default_reset_threshold_offset_stds(),
            reset_threshold_offset_seconds: default_reset_threshold_offset_seconds(),
            winsor_threshold: default_winsor_threshold(),
        }
    }
}

/// Options applied while loading a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Correct timestamps with the recorded clock offsets
    #[serde(default = "default_true")]
    pub synchronize_clocks: bool,

    #[serde(default)]
    pub clock_sync: ClockSyncOptions,

    /// Regularize timestamps of regularly sampled streams
    #[serde(default)]
    pub dejitter_timestamps: bool,

    /// Gap (seconds) that starts a new segment during jitter removal
    #[serde(default = "default_break_seconds")]
    pub jitter_break_threshold_seconds: f64,

    /// Gap (in nominal sample periods) that starts a new segment
    #[serde(default = "default_break_samples")]
    pub jitter_break_threshold_samples: usize,

    /// Trim streams to their common time range after loading
    #[serde(default)]
    pub limit_to_overlap: bool,
}

fn default_break_seconds() -> f64 {
    1.0
}
fn default_break_samples() -> usize {
    500
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            synchronize_clocks: true,
            clock_sync: ClockSyncOptions::default(),
            dejitter_timestamps: false,
            jitter_break_threshold_seconds: default_break_seconds(),
            jitter_break_threshold_samples: default_break_samples(),
            limit_to_overlap: false,
        }
    }
}

/// Post-processing stages, each independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    #[serde(default)]
    pub subtract_mean: bool,

    #[serde(default)]
    pub synthesize_labels: bool,

    /// Put all streams on one grid at the fastest effective rate
    #[serde(default)]
    pub sync_timestamps: bool,

    /// Uniform target rate in Hz
    #[serde(default)]
    pub resample_rate: Option<f64>,

    /// Replace explicit timestamps of resampled streams by their grid
    #[serde(default)]
    pub release_timestamps: bool,
}

impl ProcessingOptions {
    pub fn is_noop(&self) -> bool {
        !self.subtract_mean
            && !self.synthesize_labels
            && !self.sync_timestamps
            && self.resample_rate.is_none()
            && !self.release_timestamps
    }
}

/// A JSON configuration file holding both option groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    #[serde(default)]
    pub load: LoadOptions,
    #[serde(default)]
    pub processing: ProcessingOptions,
}

impl ReaderConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(XDFError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            XDFError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Invalid configuration {}: {}", path.display(), e),
            ))
        })
    }
}
