//! End-to-end tests for `zl cluster` and `zl inspect`.
//!
//! Each test runs the binary as a subprocess against files in a temp dir.

use assert_cmd::Command;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

fn zl_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("zl"));
    cmd.current_dir(dir);
    cmd.env("ZIPLINE_LOG", "error");
    cmd.env_remove("FORMAT");
    cmd
}

fn write_input(dir: &Path, name: &str, lines: &[&str]) {
    std::fs::write(dir.join(name), lines.join("\n")).expect("write input");
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let output = zl_cmd(dir).args(args).output().expect("zl should not crash");
    assert!(
        output.status.success(),
        "zl {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON on stdout")
}

const LOG: [&str; 7] = [
    "disk full on node seven",
    "disk full on node seven",
    "",
    "user admin logged in from office",
    "disk full on node seven",
    "user admin logged in from office",
    "disk full on node seven",
];

#[test]
fn cluster_json_reports_every_line() {
    let dir = TempDir::new().expect("temp dir");
    write_input(dir.path(), "app.log", &LOG);

    let report = run_json(dir.path(), &["cluster", "app.log", "--format", "json"]);
    assert_eq!(report["lines"], 6);
    let clusters = report["clusters"].as_array().expect("clusters");
    assert_eq!(clusters.len(), 2);

    let total: u64 = clusters.iter().map(|c| c["size"].as_u64().expect("size")).sum();
    assert_eq!(total, 6);
    let disk = &clusters[0];
    assert_eq!(disk["members"], serde_json::json!(["L1", "L2", "L5", "L7"]));
    assert_eq!(disk["example"], "disk full on node seven");
}

#[test]
fn saved_state_resumes_and_inspects() {
    let dir = TempDir::new().expect("temp dir");
    write_input(dir.path(), "day1.log", &LOG);
    write_input(dir.path(), "day2.log", &["", "", "", "", "", "", "", "disk full on node seven"]);

    zl_cmd(dir.path())
        .args(["cluster", "day1.log", "--save", "state.json", "--format", "text"])
        .assert()
        .success();
    assert!(dir.path().join("state.json").exists());

    let report = run_json(
        dir.path(),
        &["cluster", "day2.log", "--state", "state.json", "--save", "state.json", "--json"],
    );
    assert_eq!(report["lines"], 1);
    assert_eq!(report["admitted"], 1);
    assert_eq!(report["clusters"].as_array().map(Vec::len), Some(2));

    let state = run_json(dir.path(), &["inspect", "state.json", "--format", "json"]);
    assert_eq!(state["items"], 7);
    assert_eq!(state["clusters"][0]["size"], 5);
    assert!(state["clusters"][0]["tree_nodes"].as_u64().expect("nodes") > 0);
}

#[test]
fn text_output_is_one_row_per_cluster() {
    let dir = TempDir::new().expect("temp dir");
    write_input(dir.path(), "app.log", &LOG);

    let output = zl_cmd(dir.path())
        .args(["cluster", "app.log", "--format", "text"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let rows: Vec<&str> = stdout.lines().collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[1].ends_with("L4,L6"), "{stdout}");
}

#[test]
fn config_file_is_applied_and_validated() {
    let dir = TempDir::new().expect("temp dir");
    write_input(dir.path(), "app.log", &LOG);
    std::fs::write(dir.path().join("bad.toml"), "min_cluster_affinity = 3.0\n").expect("write");

    zl_cmd(dir.path())
        .args(["cluster", "app.log", "--config", "bad.toml"])
        .assert()
        .failure();

    std::fs::write(dir.path().join("ok.toml"), "max_parallelism = 1\n").expect("write");
    let report = run_json(
        dir.path(),
        &["cluster", "app.log", "--config", "ok.toml", "--format", "json"],
    );
    assert_eq!(report["lines"], 6);
}

#[test]
fn missing_input_fails_with_context() {
    let dir = TempDir::new().expect("temp dir");
    let output = zl_cmd(dir.path())
        .args(["cluster", "absent.log"])
        .output()
        .expect("run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read"), "{stderr}");
}

#[test]
fn corrupt_state_reports_error_code() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("state.json"), "{\"config\": {}, \"vocabulary\": 1}")
        .expect("write");

    let output = zl_cmd(dir.path())
        .args(["inspect", "state.json", "--format", "json"])
        .output()
        .expect("run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ZL3001"), "{stderr}");
}
