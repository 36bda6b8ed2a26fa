//! Integration tests for the CLI application
//!
//! These tests verify that the CLI commands work correctly with real data files.

use std::io::Write;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

/// Histogram data in LibSVM format
fn histogram_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(file, "+1 1:0.6 2:0.4").expect("Failed to write");
    writeln!(file, "-1 1:0.5 3:0.5").expect("Failed to write");
    writeln!(file, "+1 2:0.2 3:0.3 4:0.5").expect("Failed to write");
    writeln!(file, "-1 4:1.0").expect("Failed to write");
    writeln!(file, "+1 1:0.25 2:0.25 3:0.25 4:0.25").expect("Failed to write");
    file.flush().expect("Failed to flush");
    file
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kmsvm"))
        .args(args)
        .output()
        .expect("Failed to run CLI")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_cli_help() {
    let output = run(&["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("layout"));
    assert!(text.contains("products"));
}

#[test]
fn test_layout_command() {
    let data = histogram_file();
    let path = data.path().to_str().unwrap();

    let output = run(&["layout", "--data", path, "-t", "2", "-s", "2"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let text = stdout(&output);
    assert!(text.contains("Layout:          SlEll"));
    assert!(text.contains("Vectors:         5"));
    assert!(text.contains("Slices:          3"));
    assert!(text.contains("Nonzeros:        12"));
}

#[test]
fn test_layout_command_sertilp_from_config() {
    let data = histogram_file();
    let mut config = NamedTempFile::new().expect("Failed to create temp file");
    write!(
        config,
        r#"{{"format": "sertilp", "threads_per_row": 2, "slice_size": 4, "prefetch_size": 2}}"#
    )
    .expect("Failed to write");
    config.flush().expect("Failed to flush");

    let output = run(&[
        "layout",
        "--data",
        data.path().to_str().unwrap(),
        "--config",
        config.path().to_str().unwrap(),
    ]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Layout:          SERTILP"));
    assert!(text.contains("Prefetch size:   2"));
    assert!(text.contains("Slices:          2"));
}

#[test]
fn test_products_command() {
    let data = histogram_file();
    let output = run(&[
        "products",
        "--data",
        data.path().to_str().unwrap(),
        "--kernel",
        "linear",
        "--index",
        "1",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let text = stdout(&output);
    let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0], "0 0.300000");
    assert_eq!(rows[1], "1 0.500000");
}

#[test]
fn test_products_command_top() {
    let data = histogram_file();
    let output = run(&[
        "products",
        "--data",
        data.path().to_str().unwrap(),
        "--kernel",
        "rbf",
        "--gamma",
        "1.0",
        "--index",
        "3",
        "--top",
        "2",
        "--format",
        "sertilp",
    ]);
    assert!(output.status.success());

    let text = stdout(&output);
    let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(rows.len(), 2);
    // the element itself ranks first
    assert_eq!(rows[0], "3 1.000000");
}

#[test]
fn test_products_index_out_of_range() {
    let data = histogram_file();
    let output = run(&[
        "products",
        "--data",
        data.path().to_str().unwrap(),
        "--kernel",
        "nchi2",
        "--index",
        "9",
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_missing_data_file() {
    let output = run(&["layout", "--data", "/non/existent/file.libsvm"]);
    assert!(!output.status.success());
}

#[test]
fn test_invalid_threads_per_row() {
    let data = histogram_file();
    let output = run(&[
        "layout",
        "--data",
        data.path().to_str().unwrap(),
        "-t",
        "3",
    ]);
    assert!(!output.status.success());
}
