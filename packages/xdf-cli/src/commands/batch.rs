use crate::cli::BatchArgs;
use crate::commands::export::export_recording;
use crate::exit_codes;
use crate::output;
use crate::params;
use std::path::Path;
use std::time::Instant;

pub fn execute(args: BatchArgs) -> i32 {
    let files = match resolve_files(&args) {
        Ok(f) => f,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if files.is_empty() {
        eprintln!("Error: No matching files found");
        return exit_codes::INPUT_ERROR;
    }

    if args.dry_run {
        for f in &files {
            println!("{}", f);
        }
        if !args.quiet {
            eprintln!("Found {} file(s)", files.len());
        }
        return exit_codes::SUCCESS;
    }

    let config = match params::build_config(&args.load, Some(&args.process)) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if let Some(ref dir) = args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Error: Failed to create output directory '{}': {}", dir, e);
            return exit_codes::EXECUTION_ERROR;
        }
    }

    let total = files.len();
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let start_time = Instant::now();

    for (i, file_path) in files.iter().enumerate() {
        if !args.quiet {
            eprintln!("[{}/{}] {}...", i + 1, total, file_path);
        }

        match process_one(&args, file_path, &config) {
            Ok(()) => succeeded += 1,
            Err(msg) => {
                eprintln!("  Error: {}", msg);
                failed += 1;
                if !args.continue_on_error {
                    break;
                }
            }
        }
    }

    if !args.quiet {
        eprintln!(
            "Batch complete: {}/{} succeeded, {}/{} failed, {:.1}s",
            succeeded,
            total,
            failed,
            total,
            start_time.elapsed().as_secs_f64()
        );
    }

    if failed == 0 {
        exit_codes::SUCCESS
    } else if succeeded > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}

fn process_one(args: &BatchArgs, file_path: &str, config: &xdf_rs::ReaderConfig) -> Result<(), String> {
    let exported = export_recording(file_path, config, None).map_err(|(_, msg)| msg)?;

    match args.output_dir {
        Some(ref dir) => {
            let json = output::to_json(&exported, args.compact)?;
            let out_path = Path::new(dir).join(output_name(file_path));
            output::write_output(&json, out_path.to_str())
        }
        // JSON lines on stdout
        None => {
            let json = output::to_json(&exported, true)?;
            output::write_output(&json, None)
        }
    }
}

fn output_name(file_path: &str) -> String {
    let stem = Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    format!("{}.json", stem)
}

fn resolve_files(args: &BatchArgs) -> Result<Vec<String>, String> {
    if let Some(ref pattern) = args.glob {
        resolve_glob(pattern)
    } else if let Some(ref files) = args.files {
        Ok(files.clone())
    } else {
        Err("One of --glob or --files must be specified".to_string())
    }
}

fn resolve_glob(pattern: &str) -> Result<Vec<String>, String> {
    let paths = glob::glob(pattern)
        .map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))?;

    let mut files: Vec<String> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    if let Some(s) = path.to_str() {
                        files.push(s.to_string());
                    }
                }
            }
            Err(e) => log::warn!("glob error: {}", e),
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{LoadArgs, ProcessArgs};
    use std::fs;

    fn make_batch_args() -> BatchArgs {
        BatchArgs {
            glob: None,
            files: None,
            load: LoadArgs::default(),
            process: ProcessArgs::default(),
            output_dir: None,
            continue_on_error: false,
            dry_run: false,
            compact: false,
            quiet: false,
        }
    }

    #[test]
    fn test_resolve_files_no_input() {
        let args = make_batch_args();
        let result = resolve_files(&args);
        assert!(result.unwrap_err().contains("must be specified"));
    }

    #[test]
    fn test_resolve_files_explicit_list() {
        let mut args = make_batch_args();
        args.files = Some(vec!["/tmp/a.xdf".to_string(), "/tmp/b.xdf".to_string()]);
        let result = resolve_files(&args).unwrap();
        assert_eq!(result, vec!["/tmp/a.xdf", "/tmp/b.xdf"]);
    }

    #[test]
    fn test_resolve_glob_no_matches() {
        let result = resolve_glob("/nonexistent_dir_12345/*.xdf").unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_resolve_glob_invalid_pattern() {
        assert!(resolve_glob("[unclosed").is_err());
    }

    #[test]
    fn test_resolve_glob_with_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("b.xdf"), "").unwrap();
        fs::write(tmp.path().join("a.xdf"), "").unwrap();
        fs::write(tmp.path().join("notes.txt"), "").unwrap();

        let pattern = format!("{}/*.xdf", tmp.path().to_str().unwrap());
        let result = resolve_glob(&pattern).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result[0].ends_with("a.xdf"));
    }

    #[test]
    fn test_output_name_uses_stem() {
        assert_eq!(output_name("/data/sub-01_task-rest.xdf"), "sub-01_task-rest.json");
        assert_eq!(output_name("recording"), "recording.json");
    }
}
