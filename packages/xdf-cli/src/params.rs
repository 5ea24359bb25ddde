use crate::cli::{ClockSyncArg, LoadArgs, ProcessArgs};
use crate::exit_codes;
use std::path::Path;
use xdf_rs::{ClockSyncMethod, Container, ParseOutcome, ReaderConfig, XDFError, XDFReader};

/// Check that the input exists and is a regular file.
pub fn validate_file(file: &str) -> Result<(), String> {
    let path = Path::new(file);
    if !path.exists() {
        return Err(format!("Input file not found: {}", file));
    }
    if !path.is_file() {
        return Err(format!("Input path is not a file: {}", file));
    }
    Ok(())
}

/// Merge the optional config file with command-line flags. Flags win.
pub fn build_config(load: &LoadArgs, process: Option<&ProcessArgs>) -> Result<ReaderConfig, String> {
    let mut config = match load.config {
        Some(ref path) => ReaderConfig::from_json_file(Path::new(path))
            .map_err(|e| format!("Failed to read config '{}': {}", path, e))?,
        None => ReaderConfig::default(),
    };

    if load.no_sync {
        config.load.synchronize_clocks = false;
    }
    if let Some(method) = load.clock_sync {
        config.load.clock_sync.method = match method {
            ClockSyncArg::Interpolate => ClockSyncMethod::Interpolate,
            ClockSyncArg::RobustFit => ClockSyncMethod::RobustFit,
        };
    }
    config.load.dejitter_timestamps |= load.dejitter;
    config.load.limit_to_overlap |= load.limit_overlap;

    if let Some(process) = process {
        let processing = &mut config.processing;
        processing.subtract_mean |= process.subtract_mean;
        processing.synthesize_labels |= process.synthesize_labels;
        processing.release_timestamps |= process.release_timestamps;
        processing.sync_timestamps |= process.sync_timestamps;
        if process.resample.is_some() {
            processing.resample_rate = process.resample;
        }
    }

    if let Some(rate) = config.processing.resample_rate {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(format!("Resample rate must be positive, got {}", rate));
        }
        if config.processing.sync_timestamps {
            return Err("Timeline sync and resampling cannot be combined".to_string());
        }
    }
    Ok(config)
}

/// Exit code for a library error.
pub fn exit_code_for(err: &XDFError) -> i32 {
    match err {
        XDFError::FileNotFound(_) => exit_codes::INPUT_ERROR,
        XDFError::ProtocolError { .. } | XDFError::MetadataError { .. } => exit_codes::PARSE_ERROR,
        _ => exit_codes::EXECUTION_ERROR,
    }
}

/// Load a recording strictly: any fatal parse error fails the command.
pub fn load_recording(file: &str, config: &ReaderConfig) -> Result<Container, (i32, String)> {
    validate_file(file).map_err(|msg| (exit_codes::INPUT_ERROR, msg))?;
    XDFReader::new(config.load.clone())
        .load(Path::new(file))
        .map_err(|e| (exit_code_for(&e), format!("Failed to read '{}': {}", file, e)))
}

/// Load a recording, keeping whatever was assembled before a parse error.
pub fn load_partial(file: &str, config: &ReaderConfig) -> Result<ParseOutcome, (i32, String)> {
    validate_file(file).map_err(|msg| (exit_codes::INPUT_ERROR, msg))?;
    XDFReader::new(config.load.clone())
        .load_partial(Path::new(file))
        .map_err(|e| (exit_code_for(&e), format!("Failed to read '{}': {}", file, e)))
}
