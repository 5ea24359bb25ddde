use crate::cli::ExportArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use serde::Serialize;
use xdf_rs::{FileHeader, ProcessingReport, ReaderConfig, Stream};

/// JSON document written for one recording.
#[derive(Serialize)]
pub struct ExportOutput {
    pub file: String,
    pub file_header: Option<FileHeader>,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing: Option<ProcessingReport>,
    pub streams: Vec<Stream>,
}

/// Load, select and post-process one recording.
pub fn export_recording(
    file: &str,
    config: &ReaderConfig,
    stream_ids: Option<&[u32]>,
) -> Result<ExportOutput, (i32, String)> {
    let mut container = params::load_recording(file, config)?;

    if let Some(ids) = stream_ids {
        if let Some(missing) = ids.iter().find(|id| container.stream(**id).is_none()) {
            return Err((
                exit_codes::INPUT_ERROR,
                format!("Stream {} not found in '{}'", missing, file),
            ));
        }
        container.streams.retain(|s| ids.contains(&s.id));
    }

    let processing = if config.processing.is_noop() {
        None
    } else {
        let report = container
            .process(&config.processing, None)
            .map_err(|e| (params::exit_code_for(&e), format!("Processing failed: {}", e)))?;
        for (id, reason) in &report.skipped {
            log::warn!("Stream {} skipped: {}", id, reason);
        }
        Some(report)
    };

    Ok(ExportOutput {
        file: file.to_string(),
        file_header: container.file_header,
        truncated: container.truncated,
        processing,
        streams: container.streams,
    })
}

pub fn execute(args: ExportArgs) -> i32 {
    let config = match params::build_config(&args.load, Some(&args.process)) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let exported = match export_recording(&args.file, &config, args.streams.as_deref()) {
        Ok(e) => e,
        Err((code, msg)) => {
            eprintln!("Error: {}", msg);
            return code;
        }
    };

    let code = output::emit(&exported, args.compact, args.output.as_deref());
    if code == exit_codes::SUCCESS {
        if let Some(ref path) = args.output {
            eprintln!("Exported {} stream(s) to {}", exported.streams.len(), path);
        }
    }
    code
}
