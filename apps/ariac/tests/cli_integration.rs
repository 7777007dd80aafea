//! Integration tests for the Aria compiler CLI.
//!
//! These tests exercise the `aria` binary in a realistic environment by
//! spawning the compiled executable and validating its behavior through
//! stdout, stderr, and exit codes.
//!
//! ## Test Infrastructure
//!
//! - Uses `assert_cmd` for spawning and asserting on command execution
//! - Uses `assert_fs` for temporary filesystem operations
//! - Uses `predicates` for flexible output matching
//! - Test data located in `tests/test_data/aria/` at workspace root

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

/// Resolves the path to a test data file in the workspace.
///
/// ```text
/// env!("CARGO_MANIFEST_DIR")  // apps/ariac/
///   .parent()                 // apps/
///   .parent()                 // workspace root
///   .join("tests")
///   .join("test_data")
///   .join("aria")
///   .join(name)
/// ```
fn example_file(name: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")) // apps/ariac
        .parent()
        .unwrap() // apps
        .parent()
        .unwrap() // workspace root
        .join("tests")
        .join("test_data")
        .join("aria")
        .join(name)
}

/// At least one input file is required; clap's usage error maps to exit 1,
/// not its own default exit code, per spec section 6 ("unknown flags
/// produce a usage message and exit 1" — the same contract governs a
/// missing required argument).
#[test]
fn fails_with_usage_when_no_input_given() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("aria"));
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

/// Verifies that an unrecognized flag produces a usage message and exit 1.
#[test]
fn fails_on_unknown_flag() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("aria"));
    cmd.arg("--bogus-flag").arg(example_file("example.aria"));
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

/// Verifies that a missing input file is reported without touching the
/// linker.
#[test]
fn fails_when_input_file_missing() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("aria"));
    cmd.arg("this-file-does-not-exist.aria");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
}

/// A program the type checker rejects exits with a nonzero code equal to
/// its error count, and prints the diagnostic to stderr — never reaching
/// the linker.
#[test]
fn fails_with_frontend_errors_on_a_type_error() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("aria"));
    cmd.arg(example_file("type_error.aria"));
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error"));
}

/// The happy path: a well-typed program should clear every frontend stage
/// and reach the linker. Whether `ld -o <output> <obj> <runtime-obj>`
/// itself succeeds depends on a real architecture-specific runtime object
/// being available in the test environment, which this workspace does not
/// bundle, so both a clean link and a linker-stage failure are accepted
/// here — the property under test is that the frontend accepted the
/// program, not that this environment can finish linking it.
#[test]
fn accepts_a_well_typed_program_through_the_frontend() {
    let temp = assert_fs::TempDir::new().unwrap();
    let dest = temp.child("example.aria");
    std::fs::copy(example_file("example.aria"), dest.path()).unwrap();

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("aria"));
    cmd.current_dir(temp.path())
        .arg(dest.path())
        .arg("-o")
        .arg("example.out");
    // A frontend rejection renders a diagnostic with a `--> file:line:col`
    // locator; that marker should never appear for a well-typed program.
    cmd.assert().stderr(predicate::str::contains("-->").not());
}

/// Verifies that `--version` displays the crate's version and exits 0.
#[test]
fn shows_version() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("aria"));
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
