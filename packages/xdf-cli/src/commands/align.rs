use crate::cli::AlignArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use serde::Serialize;
use xdf_rs::AlignedEvent;

#[derive(Serialize)]
struct AlignOutput {
    file: String,
    marker_stream: u32,
    data_stream: u32,
    max_lag: Option<f64>,
    events: Vec<AlignedEvent>,
}

pub fn execute(args: AlignArgs) -> i32 {
    if let Some(lag) = args.max_lag {
        if !lag.is_finite() || lag < 0.0 {
            eprintln!("Error: --max-lag must be non-negative, got {}", lag);
            return exit_codes::INPUT_ERROR;
        }
    }

    let config = match params::build_config(&args.load, None) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let container = match params::load_recording(&args.file, &config) {
        Ok(c) => c,
        Err((code, msg)) => {
            eprintln!("Error: {}", msg);
            return code;
        }
    };

    let events = match container.align_events(args.markers, args.data, args.max_lag) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    if args.json {
        let result = AlignOutput {
            file: args.file.clone(),
            marker_stream: args.markers,
            data_stream: args.data,
            max_lag: args.max_lag,
            events,
        };
        return output::emit(&result, false, None);
    }

    println!(
        "{} event(s) from stream {} aligned to stream {}",
        events.len(),
        args.markers,
        args.data
    );
    println!(
        "  {:>6}  {:>14}  {:>8}  {:>14}  {:>10}  Label",
        "Marker", "Marker time", "Sample", "Sample time", "Lag (ms)"
    );
    for event in &events {
        println!(
            "  {:>6}  {:>14.6}  {:>8}  {:>14.6}  {:>10.3}  {}",
            event.marker_index,
            event.marker_time,
            event.sample_index,
            event.sample_time,
            event.lag * 1000.0,
            event.label.as_deref().unwrap_or("-")
        );
    }

    exit_codes::SUCCESS
}
