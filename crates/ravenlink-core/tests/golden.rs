use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use ravenlink_core::{NotificationSplit, ReplayOptions, ReplayReport, replay_file};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

fn load_expected_report(dir: &str) -> ReplayReport {
    let expected_path = workspace_root().join(dir).join("expected_report.json");

    let expected_json = fs::read_to_string(&expected_path).expect("read expected_report.json");
    serde_json::from_str(&expected_json).expect("parse expected report")
}

fn run_golden(dir: &str, options: ReplayOptions) {
    let input = workspace_root().join(dir).join("input.xml");
    let expected = load_expected_report(dir);

    let mut actual = replay_file(&input, &options).expect("replay capture");
    actual.input.path = expected.input.path.clone();
    actual.tool.version = expected.tool.version.clone();

    let actual_value = serde_json::to_value(actual).expect("serialize actual");
    let expected_value = serde_json::to_value(expected).expect("serialize expected");

    assert_eq!(actual_value, expected_value, "golden mismatch in {dir}");
}

#[test]
fn golden_demand_stream() {
    run_golden("tests/golden/demand_stream", ReplayOptions::default());
}

#[test]
fn golden_malformed_input() {
    run_golden("tests/golden/malformed_input", ReplayOptions::default());
}

#[test]
fn golden_split_reads() {
    let options = ReplayOptions {
        batch_size: 8,
        split: NotificationSplit::Bytes(NonZeroUsize::new(128).expect("non-zero")),
        ..ReplayOptions::default()
    };
    run_golden("tests/golden/split_reads", options);
}

#[test]
fn golden_malformed_input_keeps_later_reading() {
    let report = load_expected_report("tests/golden/malformed_input");
    assert_eq!(report.summary.malformed_blocks, 1);
    assert_eq!(report.summary.parse_failures, 1);
    assert_eq!(report.readings.len(), 1);
    assert_eq!(report.readings[0].value, 100_000);
}
