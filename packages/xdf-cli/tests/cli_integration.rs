use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

fn xdfreader() -> Command {
    Command::cargo_bin("xdfreader").unwrap()
}

// =============================================================================
// FIXTURES
// =============================================================================

fn chunk(out: &mut Vec<u8>, tag: u16, content: &[u8]) {
    out.push(4);
    out.extend_from_slice(&((content.len() + 2) as u32).to_le_bytes());
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(content);
}

fn stream_chunk(out: &mut Vec<u8>, tag: u16, id: u32, body: &[u8]) {
    let mut content = id.to_le_bytes().to_vec();
    content.extend_from_slice(body);
    chunk(out, tag, &content);
}

fn header(name: &str, kind: &str, channels: usize, format: &str, srate: f64) -> String {
    format!(
        "<?xml version=\"1.0\"?><info><name>{}</name><type>{}</type>\
         <channel_count>{}</channel_count><channel_format>{}</channel_format>\
         <nominal_srate>{}</nominal_srate></info>",
        name, kind, channels, format, srate
    )
}

/// Two streams: 200 samples of 2-channel float64 EEG at 100 Hz starting at
/// t=10, and two string markers.
fn recording() -> Vec<u8> {
    let mut out = b"XDF:".to_vec();
    chunk(
        &mut out,
        1,
        b"<?xml version=\"1.0\"?><info><version>1.0</version></info>",
    );
    stream_chunk(&mut out, 2, 1, header("EEG", "EEG", 2, "double64", 100.0).as_bytes());
    stream_chunk(&mut out, 2, 2, header("Markers", "Markers", 1, "string", 0.0).as_bytes());

    let mut body = vec![4];
    body.extend_from_slice(&200u32.to_le_bytes());
    for i in 0..200 {
        if i == 0 {
            body.push(8);
            body.extend_from_slice(&10.0f64.to_le_bytes());
        } else {
            body.push(0);
        }
        body.extend_from_slice(&(i as f64).to_le_bytes());
        body.extend_from_slice(&(1.0f64).to_le_bytes());
    }
    stream_chunk(&mut out, 3, 1, &body);

    let mut markers = vec![1, 2];
    for (t, label) in [(10.5f64, "start"), (11.25f64, "stop")] {
        markers.push(8);
        markers.extend_from_slice(&t.to_le_bytes());
        markers.push(1);
        markers.push(label.len() as u8);
        markers.extend_from_slice(label.as_bytes());
    }
    stream_chunk(&mut out, 3, 2, &markers);
    out
}

fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    serde_json::from_str(&stdout).unwrap()
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    xdfreader()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    xdfreader()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("xdfreader"));
}

#[test]
fn test_help_lists_subcommands() {
    xdfreader()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("XDF"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("align"));
}

// =============================================================================
// INFO SUBCOMMAND
// =============================================================================

#[test]
fn test_info_json() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path(), "rec.xdf", &recording());

    let parsed = json_stdout(xdfreader().args(["info", "--json", "--file"]).arg(&file));
    assert_eq!(parsed["version"], "1.0");
    let streams = parsed["streams"].as_array().unwrap();
    assert_eq!(streams.len(), 2);
    assert_eq!(streams[0]["name"], "EEG");
    assert_eq!(streams[0]["sample_count"], 200);
    assert_eq!(streams[0]["channel_format"], "double64");
    assert_eq!(streams[1]["content_type"], "Markers");
    assert_eq!(parsed["total_samples"], 202);
}

#[test]
fn test_info_text() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path(), "rec.xdf", &recording());

    xdfreader()
        .args(["info", "--file"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Streams: 2"))
        .stdout(predicate::str::contains("Markers"))
        .stdout(predicate::str::contains("irregular"));
}

#[test]
fn test_info_missing_file() {
    xdfreader()
        .args(["info", "--file", "/nonexistent/rec.xdf"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

// =============================================================================
// VALIDATE SUBCOMMAND
// =============================================================================

#[test]
fn test_validate_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path(), "rec.xdf", &recording());

    xdfreader()
        .args(["validate", "--file"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn test_validate_not_xdf() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path(), "fake.xdf", b"0,1,2\n3,4,5\n");

    xdfreader()
        .args(["validate", "--file"])
        .arg(&file)
        .assert()
        .code(3);
}

#[test]
fn test_validate_truncated_json() {
    let dir = tempfile::tempdir().unwrap();
    let mut bytes = recording();
    bytes.truncate(bytes.len() - 3);
    let file = write_fixture(dir.path(), "cut.xdf", &bytes);

    let parsed = json_stdout(xdfreader().args(["validate", "--json", "--file"]).arg(&file));
    assert_eq!(parsed["valid"], true);
    assert_eq!(parsed["truncated"], true);
    assert_eq!(parsed["total_samples"], 200);
    assert!(!parsed["warnings"].as_array().unwrap().is_empty());
}

// =============================================================================
// EXPORT SUBCOMMAND
// =============================================================================

#[test]
fn test_export_selected_stream() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path(), "rec.xdf", &recording());

    let parsed = json_stdout(
        xdfreader()
            .args(["export", "--compact", "--streams", "2", "--file"])
            .arg(&file),
    );
    let streams = parsed["streams"].as_array().unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0]["time_series"]["format"], "string");
    assert_eq!(streams[0]["time_series"]["values"][1], "stop");
    assert!(parsed.get("processing").is_none());
}

#[test]
fn test_export_resample_and_release() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path(), "rec.xdf", &recording());
    let out = dir.path().join("out.json");

    xdfreader()
        .args(["export", "--resample", "50", "--release-timestamps", "--file"])
        .arg(&file)
        .arg("--output")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("Exported 2 stream(s)"));

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    let eeg = &parsed["streams"][0];
    assert_eq!(eeg["resampled_rate"], 50.0);
    assert_eq!(eeg["timestamps"]["kind"], "uniform");
    assert_eq!(eeg["timestamps"]["count"], 100);
    assert_eq!(parsed["processing"]["resampled"][0], 1);
    assert_eq!(parsed["processing"]["skipped"][0][0], 2);
}

#[test]
fn test_export_sync_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path(), "rec.xdf", &recording());

    let parsed = json_stdout(
        xdfreader()
            .args(["export", "--compact", "--sync-timestamps", "--file"])
            .arg(&file),
    );
    assert_eq!(parsed["processing"]["synced"][0], 1);
    assert_eq!(parsed["processing"]["synced"][1], 2);
    let markers = &parsed["streams"][1];
    assert_eq!(markers["timestamps"]["values"].as_array().unwrap().len(), 200);
    assert_eq!(markers["time_series"]["values"][50], "start");
    assert_eq!(markers["time_series"]["values"][125], "stop");
}

#[test]
fn test_export_sync_conflicts_with_resample() {
    xdfreader()
        .args(["export", "--file", "x.xdf", "--sync-timestamps", "--resample", "50"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_export_unknown_stream() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path(), "rec.xdf", &recording());

    xdfreader()
        .args(["export", "--streams", "9", "--file"])
        .arg(&file)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Stream 9 not found"));
}

#[test]
fn test_export_rejects_bad_rate() {
    xdfreader()
        .args(["export", "--file", "x.xdf", "--resample", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid rate"));
}

// =============================================================================
// BATCH SUBCOMMAND
// =============================================================================

#[test]
fn test_batch_dry_run() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), "a.xdf", &recording());
    write_fixture(dir.path(), "b.xdf", &recording());
    let pattern = format!("{}/*.xdf", dir.path().display());

    xdfreader()
        .args(["batch", "--dry-run", "--glob", &pattern])
        .assert()
        .success()
        .stdout(predicate::str::contains("a.xdf"))
        .stdout(predicate::str::contains("b.xdf"));
}

#[test]
fn test_batch_writes_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fixture(dir.path(), "a.xdf", &recording());
    let b = write_fixture(dir.path(), "b.xdf", &recording());
    let out_dir = dir.path().join("out");

    xdfreader()
        .args(["batch", "--quiet", "--files"])
        .arg(&a)
        .arg(&b)
        .arg("--output-dir")
        .arg(&out_dir)
        .assert()
        .success();

    assert!(out_dir.join("a.json").is_file());
    assert!(out_dir.join("b.json").is_file());
}

#[test]
fn test_batch_partial_failure() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_fixture(dir.path(), "good.xdf", &recording());
    let bad = write_fixture(dir.path(), "bad.xdf", b"not a recording");

    let output = xdfreader()
        .args(["batch", "--continue-on-error", "--files"])
        .arg(&bad)
        .arg(&good)
        .assert()
        .code(4);

    // One JSON line for the file that succeeded.
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    assert_eq!(stdout.lines().count(), 1);
}

#[test]
fn test_batch_stops_on_first_error() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_fixture(dir.path(), "good.xdf", &recording());
    let bad = write_fixture(dir.path(), "bad.xdf", b"not a recording");

    xdfreader()
        .args(["batch", "--files"])
        .arg(&bad)
        .arg(&good)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("0/2 succeeded"));
}

// =============================================================================
// ALIGN SUBCOMMAND
// =============================================================================

#[test]
fn test_align_json() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path(), "rec.xdf", &recording());

    let parsed = json_stdout(
        xdfreader()
            .args(["align", "--json", "--markers", "2", "--data", "1", "--file"])
            .arg(&file),
    );
    let events = parsed["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["label"], "start");
    assert_eq!(events[0]["sample_index"], 50);
    assert_eq!(events[1]["sample_index"], 125);
}

#[test]
fn test_align_unknown_stream() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(dir.path(), "rec.xdf", &recording());

    xdfreader()
        .args(["align", "--markers", "5", "--data", "1", "--file"])
        .arg(&file)
        .assert()
        .code(2);
}
