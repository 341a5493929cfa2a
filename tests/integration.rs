use std::fs;
use std::process::Command;

use serde_json::Value;

fn forcegraph() -> Command {
    Command::new(env!("CARGO_BIN_EXE_forcegraph"))
}

#[test]
fn layout_writes_positions_for_every_node() {
    let output_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output_path = output_dir.path().join("layout.json");

    let status = forcegraph()
        .args([
            "layout",
            "--input",
            "tests/fixtures/triangle.json",
            "--params",
            "tests/fixtures/params.json",
            "--ticks",
            "5",
            "--executor",
            "sequential",
            "--output",
            output_path.to_str().unwrap(),
        ])
        .status()
        .expect("Failed to execute forcegraph");

    assert!(status.success(), "forcegraph exited with error");
    assert!(output_path.exists(), "layout.json was not written");

    let text = fs::read_to_string(&output_path).expect("Failed to read layout.json");
    let layout: Value = serde_json::from_str(&text).expect("Output is not JSON");

    assert_eq!(layout["executor"]["kind"], "sequential");
    assert_eq!(layout["executor"]["backend"], "cpu");
    assert_eq!(layout["ticks"], 45, "settle iterations plus extra ticks");

    let positions = layout["positions"].as_array().expect("Missing positions");
    assert_eq!(positions.len(), 3);
    let mut ids: Vec<&str> = positions
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["alpha", "beta", "gamma"]);
    for p in positions {
        for axis in ["x", "y", "z"] {
            assert!(
                p[axis].as_f64().is_some_and(f64::is_finite),
                "non-finite {axis} for {}",
                p["id"]
            );
        }
    }
}

#[test]
fn seeded_layout_is_reproducible() {
    let run = || {
        let output = forcegraph()
            .args([
                "layout",
                "-i",
                "tests/fixtures/triangle.json",
                "-p",
                "tests/fixtures/params.json",
                "-e",
                "sequential",
            ])
            .output()
            .expect("Failed to execute forcegraph");
        assert!(output.status.success());
        String::from_utf8(output.stdout).expect("stdout is not UTF-8")
    };

    assert_eq!(run(), run());
}

#[test]
fn ghost_endpoint_fails_with_message() {
    let output = forcegraph()
        .args(["layout", "--input", "tests/fixtures/ghost.json"])
        .output()
        .expect("Failed to execute forcegraph");

    assert!(!output.status.success(), "ghost topology was accepted");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("unknown node 'ghost'"),
        "Missing error message, got: {stderr}"
    );
}

#[test]
fn missing_input_file_fails() {
    let output = forcegraph()
        .args(["layout", "--input", "tests/fixtures/does-not-exist.json"])
        .output()
        .expect("Failed to execute forcegraph");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read topology"), "got: {stderr}");
}

#[test]
fn path_prints_lowest_weight_route() {
    let output = forcegraph()
        .args([
            "path",
            "--input",
            "tests/fixtures/triangle.json",
            "--from",
            "alpha",
            "--to",
            "gamma",
        ])
        .output()
        .expect("Failed to execute forcegraph");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    // Direct edge costs 3, the detour through beta costs 2
    assert_eq!(stdout.trim(), "alpha -> beta -> gamma");
}
