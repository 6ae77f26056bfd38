//! Shared integration-test harness for running the `loadlens` binary.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};

use serde_json::Value;

/// Returns the path to a test fixture.
#[must_use]
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Returns a fixture path as a `&str` argument.
#[allow(clippy::missing_panics_doc)]
#[must_use]
pub fn fixture_arg(name: &str) -> String {
    fixture_path(name)
        .to_str()
        .expect("non-UTF-8 fixture path")
        .to_string()
}

/// Runs `loadlens` with `args` and waits for it to exit.
///
/// Runs from the crate directory with the `LOADLENS_*` environment
/// cleared so a developer's settings cannot leak into assertions.
#[allow(clippy::missing_panics_doc)]
pub fn run_loadlens(args: &[&str]) -> Output {
    run_loadlens_in(Path::new(env!("CARGO_MANIFEST_DIR")), args)
}

/// Runs `loadlens` from `dir`.
#[allow(clippy::missing_panics_doc)]
pub fn run_loadlens_in(dir: &Path, args: &[&str]) -> Output {
    loadlens_command(dir, args)
        .output()
        .expect("failed to spawn loadlens")
}

/// Starts `loadlens` without waiting, with stdout and stderr piped.
#[allow(clippy::missing_panics_doc)]
pub fn spawn_loadlens(args: &[&str]) -> Child {
    loadlens_command(Path::new(env!("CARGO_MANIFEST_DIR")), args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn loadlens")
}

fn loadlens_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_loadlens"));
    cmd.args(args).current_dir(dir).arg("--quiet");
    for (key, _) in std::env::vars() {
        if key.starts_with("LOADLENS_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

/// Returns `true` once `pid` has exited (a zombie counts as exited).
#[allow(clippy::missing_panics_doc)]
#[must_use]
pub fn process_gone(pid: u32) -> bool {
    let output = Command::new("ps")
        .args(["-o", "stat=", "-p", &pid.to_string()])
        .output()
        .expect("failed to run ps");
    let stat = String::from_utf8_lossy(&output.stdout);
    stat.trim().is_empty() || stat.trim_start().starts_with('Z')
}

/// Parses stdout as JSON, panicking with the captured output otherwise.
#[allow(clippy::missing_panics_doc)]
#[must_use]
pub fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {stdout}\nstderr: {}",
            String::from_utf8_lossy(&output.stderr)
        )
    })
}
