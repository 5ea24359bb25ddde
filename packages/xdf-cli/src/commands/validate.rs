use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use serde::Serialize;
use std::path::Path;
use xdf_rs::{LoadOptions, ReaderConfig};

#[derive(Serialize)]
struct ValidateOutput {
    file: String,
    exists: bool,
    size_bytes: Option<u64>,
    valid: bool,
    streams: usize,
    total_samples: usize,
    truncated: bool,
    skipped_chunks: usize,
    warnings: Vec<String>,
    error: Option<String>,
}

impl ValidateOutput {
    fn missing(file: &str, error: String) -> Self {
        Self {
            file: file.to_string(),
            exists: Path::new(file).exists(),
            size_bytes: None,
            valid: false,
            streams: 0,
            total_samples: 0,
            truncated: false,
            skipped_chunks: 0,
            warnings: Vec::new(),
            error: Some(error),
        }
    }
}

fn report(args: &ValidateArgs, result: &ValidateOutput) -> Result<(), String> {
    if args.json {
        return output::to_json(result, false).and_then(|json| output::write_output(&json, None));
    }
    for warning in &result.warnings {
        eprintln!("Warning: {}", warning);
    }
    match result.error {
        Some(ref err) => eprintln!("Error: {}", err),
        None => println!(
            "File '{}' is valid ({} stream(s), {} samples, {} bytes)",
            result.file,
            result.streams,
            result.total_samples,
            result.size_bytes.unwrap_or(0)
        ),
    }
    Ok(())
}

pub fn execute(args: ValidateArgs) -> i32 {
    // Raw timestamps are enough to check the framing.
    let config = ReaderConfig {
        load: LoadOptions {
            synchronize_clocks: false,
            ..Default::default()
        },
        ..Default::default()
    };

    let (result, code) = match params::load_partial(&args.file, &config) {
        Err((code, msg)) => (ValidateOutput::missing(&args.file, msg), code),
        Ok(outcome) => {
            let container = &outcome.container;
            let mut warnings = Vec::new();
            if container.truncated {
                warnings.push("recording is truncated; the last chunk is incomplete".to_string());
            }
            if container.skipped_chunks > 0 {
                warnings.push(format!("{} chunk(s) of unknown type skipped", container.skipped_chunks));
            }
            for stream in &container.streams {
                for issue in &stream.issues {
                    warnings.push(format!("stream {}: {}", stream.id, issue));
                }
            }

            let error = outcome.error.as_ref().map(|e| e.to_string());
            let code = if error.is_some() {
                exit_codes::PARSE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let result = ValidateOutput {
                file: args.file.clone(),
                exists: true,
                size_bytes: std::fs::metadata(&args.file).ok().map(|m| m.len()),
                valid: error.is_none(),
                streams: container.len(),
                total_samples: container.total_samples(),
                truncated: container.truncated,
                skipped_chunks: container.skipped_chunks,
                warnings,
                error,
            };
            (result, code)
        }
    };

    if let Err(e) = report(&args, &result) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }
    code
}
