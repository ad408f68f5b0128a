//! End-to-end tests for the `exm` binary.
//!
//! Each run gets an isolated `XDG_CONFIG_HOME` so no real config file is
//! picked up. Credentials come from the environment, and the console stop
//! source ends the run once stdin delivers a line.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

const BIN: &str = env!("CARGO_BIN_EXE_exm");

fn manifests(dir: &Path) -> Vec<PathBuf> {
    ["config", "evconf", "dmconf", "phmcfg"]
        .iter()
        .map(|name| {
            let path = dir.join(format!("{name}.arxml"));
            std::fs::write(&path, "<AUTOSAR/>").expect("failed to write manifest");
            path
        })
        .collect()
}

/// Run `exm` with `args`, feeding `stdin` and closing it.
fn run_exm(config_home: &Path, args: &[PathBuf], envs: &[(&str, &str)], stdin: &str) -> Output {
    let mut child = Command::new(BIN)
        .args(args)
        .env_clear()
        .env("XDG_CONFIG_HOME", config_home)
        .env("RUST_LOG", "info")
        .env("EXM_VCC_API_KEY", "test-api-key")
        .env("EXM_BEARER_TOKEN", "test-bearer-token")
        .env("EXM_STOP_SOURCE", "console")
        .env("EXM_STOP_POLL_INTERVAL_MS", "10")
        .env("EXM_CYCLE_DELAY_MS", "10")
        .envs(envs.iter().copied())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn exm");

    let mut pipe = child.stdin.take().expect("stdin not piped");
    // The process may already have exited on bad arguments.
    let _ = pipe.write_all(stdin.as_bytes());
    drop(pipe);

    child.wait_with_output().expect("failed to wait for exm")
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn wrong_argument_count_prints_usage_and_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    let args = [PathBuf::from("a.arxml"), PathBuf::from("b.arxml")];

    let output = run_exm(tmp.path(), &args, &[], "\n");
    let stderr = stderr_of(&output);

    assert!(!output.status.success());
    assert_ne!(output.status.code(), Some(0));
    assert!(
        stderr.contains("[ERROR]: Incorrect number of arguments provided!"),
        "stderr: {stderr}"
    );
    assert!(
        stderr.contains("Expected 4 arguments, but received 2."),
        "stderr: {stderr}"
    );
    assert!(stderr.contains("exm <config> <evconf> <dmconf> <phmcfg>"), "stderr: {stderr}");
    assert!(
        stderr.contains("configuration/health_monitoring_manifest.arxml"),
        "stderr: {stderr}"
    );
    assert!(stderr.contains("OAuth 2.0 bearer token"), "stderr: {stderr}");
}

#[cfg(unix)]
#[test]
fn non_utf8_path_reaches_the_arity_check() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let tmp = tempfile::TempDir::new().unwrap();
    let args = [
        PathBuf::from(OsStr::from_bytes(b"caf\xe9.arxml")),
        PathBuf::from("b.arxml"),
    ];

    let output = run_exm(tmp.path(), &args, &[], "\n");
    let stderr = stderr_of(&output);

    assert_ne!(output.status.code(), Some(2), "stderr: {stderr}");
    assert!(
        stderr.contains("Expected 4 arguments, but received 2."),
        "stderr: {stderr}"
    );
}

#[test]
fn hyphenated_paths_are_positional() {
    let tmp = tempfile::TempDir::new().unwrap();
    let args: Vec<PathBuf> = ["config", "-evconf", "-dmconf", "-phmcfg"]
        .iter()
        .map(|name| PathBuf::from(format!("{name}-missing.arxml")))
        .collect();

    let output = run_exm(tmp.path(), &args, &[], "\n");
    let stderr = stderr_of(&output);

    assert_ne!(output.status.code(), Some(2), "stderr: {stderr}");
    assert!(!stderr.contains("Incorrect number of arguments"), "stderr: {stderr}");
    assert!(
        stderr.contains("platform initialization failed"),
        "stderr: {stderr}"
    );
}

#[test]
fn missing_manifests_fail_initialization() {
    let tmp = tempfile::TempDir::new().unwrap();
    let args: Vec<PathBuf> = ["config", "evconf", "dmconf", "phmcfg"]
        .iter()
        .map(|name| tmp.path().join(format!("{name}-missing.arxml")))
        .collect();

    let output = run_exm(tmp.path(), &args, &[], "\n");
    let stderr = stderr_of(&output);

    assert!(!output.status.success());
    assert_eq!(
        stderr.matches("platform initialization failed").count(),
        1,
        "stderr: {stderr}"
    );
}

#[test]
fn console_stop_exits_cleanly() {
    let tmp = tempfile::TempDir::new().unwrap();
    let args = manifests(tmp.path());

    let output = run_exm(tmp.path(), &args, &[], "\n");
    let stderr = stderr_of(&output);

    assert_eq!(output.status.code(), Some(0), "stderr: {stderr}");
    assert!(stderr.contains("execution management initialized"), "stderr: {stderr}");
    assert!(stderr.contains("execution management terminated"), "stderr: {stderr}");
}

#[test]
fn invalid_stop_source_is_a_configuration_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let args = manifests(tmp.path());

    let output = run_exm(tmp.path(), &args, &[("EXM_STOP_SOURCE", "keyboard")], "\n");
    let stderr = stderr_of(&output);

    assert!(!output.status.success());
    assert!(stderr.contains("EXM_STOP_SOURCE"), "stderr: {stderr}");
    assert!(
        !stderr.contains("execution management initialized"),
        "stderr: {stderr}"
    );
}

#[cfg(feature = "credential-gate")]
#[test]
fn closed_stdin_cancels_the_api_key_prompt() {
    let tmp = tempfile::TempDir::new().unwrap();
    let args = manifests(tmp.path());

    let output = Command::new(BIN)
        .args(&args)
        .env_clear()
        .env("XDG_CONFIG_HOME", tmp.path())
        .stdin(Stdio::null())
        .output()
        .expect("failed to run exm");
    let stderr = stderr_of(&output);

    assert!(!output.status.success());
    assert!(stderr.contains("VCC API key"), "stderr: {stderr}");
    assert!(
        !stderr.contains("execution management initialized"),
        "stderr: {stderr}"
    );
}
