use std::fs;
use std::process::Command;

use survmed::config::SimulationConfig;
use survmed::io::read_dataset_file;
use tempfile::tempdir;

fn survmed() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_survmed"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn run_prints_point_and_interval_and_writes_tables() {
    let tmp = tempdir().expect("temporary directory");
    let population = tmp.path().join("population.tsv");
    let replicates = tmp.path().join("replicates.tsv");

    let output = survmed()
        .args([
            "run",
            "--sample-size",
            "1500",
            "--replicates",
            "5",
            "--seed",
            "3",
            "--population-out",
            population.to_str().expect("path str"),
            "--replicates-out",
            replicates.to_str().expect("path str"),
        ])
        .output()
        .expect("run survmed cli");
    assert!(output.status.success(), "CLI failed: {output:?}");

    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    let values: Vec<f64> = stdout
        .trim()
        .split('\t')
        .map(|v| v.parse().expect("numeric output"))
        .collect();
    assert_eq!(values.len(), 3);
    assert!(values[1] < values[0] && values[0] < values[2]);

    let data = read_dataset_file(&population).expect("population TSV");
    assert_eq!(data.len(), 1500);
    let table = fs::read_to_string(&replicates).expect("replicate TSV");
    assert_eq!(table.lines().count(), 6);
}

#[test]
fn simulate_then_estimate_reads_the_written_population() {
    let tmp = tempdir().expect("temporary directory");
    let population = tmp.path().join("cohort.tsv");
    let path = population.to_str().expect("path str");

    let status = survmed()
        .args(["simulate", "--sample-size", "1200", path])
        .status()
        .expect("run simulate");
    assert!(status.success());

    let output = survmed()
        .args(["estimate", path])
        .output()
        .expect("run estimate");
    assert!(output.status.success(), "CLI failed: {output:?}");
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert_eq!(stdout.trim().split('\t').count(), 3);
}

#[test]
fn config_output_parses_back_to_defaults() {
    let output = survmed().arg("config").output().expect("run config");
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).expect("utf8 stdout");
    let parsed: SimulationConfig = toml::from_str(&text).expect("valid TOML");
    assert_eq!(parsed, SimulationConfig::default());
}

#[test]
fn invalid_settings_exit_with_an_error_message() {
    let output = survmed()
        .args(["run", "--replicates", "0"])
        .output()
        .expect("run survmed cli");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("utf8 stderr");
    assert!(stderr.contains("Error:"), "stderr: {stderr}");
    assert!(output.stdout.is_empty());
}
