use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "xdfreader",
    version,
    about = "Inspect, validate and export XDF (Lab Streaming Layer) recordings",
    long_about = "Read XDF recordings: list streams, check file integrity, export \
                  clock-synchronized (and optionally resampled) data as JSON, and \
                  align marker events to data streams."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the streams of a recording
    Info(InfoArgs),
    /// Check a recording for framing and metadata problems
    Validate(ValidateArgs),
    /// Export streams as JSON, optionally post-processed
    Export(ExportArgs),
    /// Export many recordings at once
    Batch(BatchArgs),
    /// Map marker events onto the samples of a data stream
    Align(AlignArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClockSyncArg {
    /// Piecewise-linear interpolation of clock offsets
    Interpolate,
    /// Robust linear fit with clock-reset detection
    RobustFit,
}

/// Options controlling how a recording is loaded.
#[derive(Args, Clone, Debug, Default)]
pub struct LoadArgs {
    /// JSON configuration file ({"load": {...}, "processing": {...}})
    #[arg(long)]
    pub config: Option<String>,

    /// Keep raw timestamps (no clock synchronization)
    #[arg(long, default_value_t = false)]
    pub no_sync: bool,

    /// Clock synchronization method
    #[arg(long, value_enum)]
    pub clock_sync: Option<ClockSyncArg>,

    /// Regularize timestamps of regularly sampled streams
    #[arg(long, default_value_t = false)]
    pub dejitter: bool,

    /// Trim all streams to their common time range
    #[arg(long, default_value_t = false)]
    pub limit_overlap: bool,
}

/// Post-processing stages applied before export.
#[derive(Args, Clone, Debug, Default)]
pub struct ProcessArgs {
    /// Subtract each channel's mean
    #[arg(long, default_value_t = false)]
    pub subtract_mean: bool,

    /// Name unlabeled channels Ch1, Ch2, ...
    #[arg(long, default_value_t = false)]
    pub synthesize_labels: bool,

    /// Put every stream on one grid at the fastest effective rate
    #[arg(long, default_value_t = false, conflicts_with = "resample")]
    pub sync_timestamps: bool,

    /// Resample regular numeric streams to this rate (Hz)
    #[arg(long, value_parser = parse_rate)]
    pub resample: Option<f64>,

    /// Drop explicit timestamps of resampled streams
    #[arg(long, default_value_t = false)]
    pub release_timestamps: bool,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Input XDF file
    #[arg(long)]
    pub file: String,

    #[command(flatten)]
    pub load: LoadArgs,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Input XDF file
    #[arg(long)]
    pub file: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Input XDF file
    #[arg(long)]
    pub file: String,

    /// Stream ids to export (default: all)
    #[arg(long, num_args = 1..)]
    pub streams: Option<Vec<u32>>,

    #[command(flatten)]
    pub load: LoadArgs,

    #[command(flatten)]
    pub process: ProcessArgs,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern selecting input files (e.g. "data/**/*.xdf")
    #[arg(long, conflicts_with = "files")]
    pub glob: Option<String>,

    /// Explicit list of input files
    #[arg(long, num_args = 1..)]
    pub files: Option<Vec<String>>,

    #[command(flatten)]
    pub load: LoadArgs,

    #[command(flatten)]
    pub process: ProcessArgs,

    /// Directory for per-file JSON output (default: JSON lines on stdout)
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Keep going after a file fails
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// Only list the files that would be processed
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct AlignArgs {
    /// Input XDF file
    #[arg(long)]
    pub file: String,

    /// Id of the marker stream
    #[arg(long)]
    pub markers: u32,

    /// Id of the data stream
    #[arg(long)]
    pub data: u32,

    /// Drop markers farther than this many seconds from any sample
    #[arg(long)]
    pub max_lag: Option<f64>,

    #[command(flatten)]
    pub load: LoadArgs,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Parse a strictly positive, finite rate in Hz.
pub fn parse_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid rate '{}': not a number", s))?;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(format!("Invalid rate '{}': must be positive", s));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate_valid() {
        assert_eq!(parse_rate("250").unwrap(), 250.0);
        assert_eq!(parse_rate(" 512.5 ").unwrap(), 512.5);
    }

    #[test]
    fn test_parse_rate_invalid() {
        assert!(parse_rate("abc").is_err());
        assert!(parse_rate("0").is_err());
        assert!(parse_rate("-100").is_err());
        assert!(parse_rate("inf").is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
