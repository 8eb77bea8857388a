use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn daysmith(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_daysmith"))
        .args(args)
        .output()
        .expect("failed to spawn daysmith")
}

fn synthetic_args<'a>(output_dir: &'a str, extra: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec![
        "prepare",
        "--synthetic",
        "--symbol",
        "SYN",
        "--start",
        "2022-01-03",
        "--end",
        "2023-06-30",
        "--output-dir",
        output_dir,
        "--workers",
        "1",
    ];
    args.extend_from_slice(extra);
    args
}

fn read_summary(path: &Path) -> serde_json::Value {
    let raw = std::fs::read_to_string(path).expect("summary readable");
    serde_json::from_str(&raw).expect("summary is JSON")
}

#[test]
fn synthetic_run_writes_dataset_summary_and_log() {
    let temp_dir = tempdir().expect("temp output dir");
    let output_dir = temp_dir.path().join("daysmith_output");
    let out = output_dir.to_str().expect("output");

    let result = daysmith(&synthetic_args(out, &["--top-k", "5"]));
    assert!(
        result.status.success(),
        "daysmith failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let prepared = output_dir.join("SYN_prepared.csv");
    let header = std::fs::read_to_string(&prepared).expect("prepared csv");
    let first_line = header.lines().next().expect("header line");
    assert!(first_line.starts_with("Date,Close,Open,High,Low,Volume,Target,"));

    let summary = read_summary(&output_dir.join("SYN_summary.json"));
    assert_eq!(summary["symbol"], "SYN");
    assert_eq!(summary["selected_features"].as_array().map(Vec::len), Some(5));
    let rows = summary["rows"].as_u64().expect("rows");
    let up = summary["class_balance"]["up"].as_u64().expect("up");
    let down = summary["class_balance"]["down"].as_u64().expect("down");
    assert_eq!(up + down, rows);
    assert_eq!(summary["first_date"], "2022-01-03");

    assert!(output_dir.join("daysmith.log").exists());
}

#[test]
fn rerun_with_different_settings_requires_acknowledgement() {
    let temp_dir = tempdir().expect("temp output dir");
    let out = temp_dir.path().to_str().expect("output");

    let first = daysmith(&synthetic_args(out, &["--no-file-log"]));
    assert!(first.status.success());
    let original = std::fs::read(temp_dir.path().join("SYN_prepared.csv")).expect("prepared");

    let same = daysmith(&synthetic_args(out, &["--no-file-log"]));
    assert!(same.status.success(), "identical rerun should reuse the file");

    let changed = daysmith(&synthetic_args(out, &["--no-file-log", "--lookback", "3,5"]));
    assert!(!changed.status.success());
    let after_refusal = std::fs::read(temp_dir.path().join("SYN_prepared.csv")).expect("prepared");
    assert_eq!(original, after_refusal);

    let acknowledged = daysmith(&synthetic_args(
        out,
        &["--no-file-log", "--lookback", "3,5", "--ack-new-df"],
    ));
    assert!(acknowledged.status.success());
    let replaced = std::fs::read(temp_dir.path().join("SYN_prepared.csv")).expect("prepared");
    assert_ne!(original, replaced);
}

#[test]
fn prepared_csv_can_be_prepared_again() {
    let temp_dir = tempdir().expect("temp output dir");
    let first_dir = temp_dir.path().join("first");
    let second_dir = temp_dir.path().join("second");
    let first = first_dir.to_str().expect("first");

    assert!(daysmith(&synthetic_args(first, &["--no-file-log"])).status.success());

    let source = first_dir.join("SYN_prepared.csv");
    let result = daysmith(&[
        "prepare",
        "--csv",
        source.to_str().expect("source"),
        "--output-dir",
        second_dir.to_str().expect("second"),
        "--no-file-log",
    ]);
    assert!(
        result.status.success(),
        "daysmith failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    let summary = read_summary(&second_dir.join("SYN_prepared_summary.json"));
    let original = read_summary(&first_dir.join("SYN_summary.json"));
    assert_eq!(summary["rows"], original["rows"]);
}

#[test]
fn short_history_fails_with_sample_count() {
    let temp_dir = tempdir().expect("temp output dir");
    let result = daysmith(&[
        "prepare",
        "--synthetic",
        "--start",
        "2024-01-01",
        "--end",
        "2024-02-09",
        "--output-dir",
        temp_dir.path().to_str().expect("output"),
        "--no-file-log",
    ]);
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("Insufficient data after cleaning: 30 samples"), "{stderr}");
}
