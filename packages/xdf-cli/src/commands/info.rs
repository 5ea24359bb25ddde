use crate::cli::InfoArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use serde::Serialize;
use xdf_rs::{Container, Stream};

#[derive(Serialize)]
struct StreamSummary {
    id: u32,
    name: String,
    content_type: String,
    channel_count: usize,
    channel_format: &'static str,
    nominal_srate: f64,
    effective_srate: Option<f64>,
    sample_count: usize,
    first_timestamp: Option<f64>,
    last_timestamp: Option<f64>,
    duration: f64,
    clock_offsets: usize,
    labels: Vec<Option<String>>,
    issues: Vec<String>,
}

impl From<&Stream> for StreamSummary {
    fn from(stream: &Stream) -> Self {
        Self {
            id: stream.id,
            name: stream.name().to_string(),
            content_type: stream.content_type().to_string(),
            channel_count: stream.channel_count(),
            channel_format: stream.format().as_str(),
            nominal_srate: stream.info.nominal_srate,
            effective_srate: stream.info.effective_srate,
            sample_count: stream.sample_count(),
            first_timestamp: stream.timestamps.first(),
            last_timestamp: stream.timestamps.last(),
            duration: stream.duration(),
            clock_offsets: stream.clock_offsets.len(),
            labels: stream
                .info
                .channel_labels()
                .into_iter()
                .map(|l| l.map(str::to_string))
                .collect(),
            issues: stream.issues.clone(),
        }
    }
}

#[derive(Serialize)]
struct InfoOutput {
    file: String,
    version: Option<String>,
    datetime: Option<String>,
    truncated: bool,
    skipped_chunks: usize,
    total_samples: usize,
    streams: Vec<StreamSummary>,
}

fn summarize(file: &str, container: &Container) -> InfoOutput {
    let header = container.file_header.as_ref();
    InfoOutput {
        file: file.to_string(),
        version: header.and_then(|h| h.version.clone()),
        datetime: header.and_then(|h| h.datetime.clone()),
        truncated: container.truncated,
        skipped_chunks: container.skipped_chunks,
        total_samples: container.total_samples(),
        streams: container.streams.iter().map(StreamSummary::from).collect(),
    }
}

pub fn execute(args: InfoArgs) -> i32 {
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

    let info = summarize(&args.file, &container);

    if args.json {
        return output::emit(&info, false, None);
    }

    println!("File: {}", info.file);
    if let Some(ref version) = info.version {
        println!("XDF version: {}", version);
    }
    if let Some(ref datetime) = info.datetime {
        println!("Recorded: {}", datetime);
    }
    if info.truncated {
        println!("Warning: recording is truncated");
    }
    println!("Streams: {}", info.streams.len());
    println!();
    println!(
        "  {:>4}  {:<24} {:<12} {:>4} {:<9} {:>10} {:>10} {:>10}",
        "ID", "Name", "Type", "Ch", "Format", "Srate", "Samples", "Duration"
    );
    println!("  {}", "-".repeat(92));
    for s in &info.streams {
        let srate = match s.effective_srate {
            _ if s.nominal_srate <= 0.0 => "irregular".to_string(),
            Some(rate) => format!("{:.3}", rate),
            None => format!("{}", s.nominal_srate),
        };
        println!(
            "  {:>4}  {:<24} {:<12} {:>4} {:<9} {:>10} {:>10} {:>9.2}s",
            s.id,
            s.name,
            s.content_type,
            s.channel_count,
            s.channel_format,
            srate,
            s.sample_count,
            s.duration
        );
        for issue in &s.issues {
            println!("        ! {}", issue);
        }
    }

    exit_codes::SUCCESS
}
