/// Smoke tests to verify the binary runs without panicking
use std::process::Command;

#[test]
fn binary_shows_help() {
    let output = Command::new("cargo")
        .args(["run", "--", "--help"])
        .output()
        .expect("Failed to execute cargo run");

    assert!(
        output.status.success(),
        "Binary failed to run --help: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("twinscope"),
        "Help output should mention twinscope"
    );
    assert!(
        stdout.contains("oscillator"),
        "Help output should list the oscillator source"
    );
}

#[test]
fn binary_shows_version() {
    let output = Command::new("cargo")
        .args(["run", "--", "--version"])
        .output()
        .expect("Failed to execute cargo run");

    assert!(
        output.status.success(),
        "Binary failed to run --version: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn invalid_subcommand_fails_gracefully() {
    let output = Command::new("cargo")
        .args(["run", "--", "nonexistent-command"])
        .output()
        .expect("Failed to execute cargo run");

    // Should fail with error, not panic
    assert!(
        !output.status.success(),
        "Invalid subcommand should return error status"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        !stderr.contains("panicked at"),
        "Invalid subcommand should not cause panic"
    );
}

#[test]
fn missing_file_fails_gracefully() {
    let output = Command::new("cargo")
        .args(["run", "--", "file", "/nonexistent/input.wav"])
        .output()
        .expect("Failed to execute cargo run");

    assert!(
        !output.status.success(),
        "Missing input file should return error status"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        !stderr.contains("panicked at"),
        "Missing input file should not cause panic"
    );
}
