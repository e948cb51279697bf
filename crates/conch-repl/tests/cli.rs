//! End-to-end tests of the `conch` binary.

use std::process::{Command, Output};

use tempfile::TempDir;

fn conch(args: &[&str], dir: &TempDir) -> Output {
    Command::new(env!("CARGO_BIN_EXE_conch"))
        .args(args)
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run conch")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn command_mode_runs_and_exits_with_last_status() {
    let dir = TempDir::new().unwrap();
    let output = conch(&["-c", "echo hi; status 3"], &dir);
    assert_eq!(stdout(&output), "hi\n");
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn external_commands_share_the_terminal() {
    let dir = TempDir::new().unwrap();
    let output = conch(&["-c", "printf '%s-%s' a b | tr a-z A-Z"], &dir);
    assert_eq!(stdout(&output), "A-B");
    assert!(output.status.success());
}

#[test]
fn script_file_runs_units_in_order() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("hello.conch");
    std::fs::write(
        &script,
        "#!/usr/bin/env conch\n# greet twice\ndefine greet: method (who) { echo hello $who }\ngreet a\ngreet b\n",
    )
    .unwrap();
    let output = conch(&[script.to_str().unwrap()], &dir);
    assert_eq!(stdout(&output), "hello a\nhello b\n");
    assert!(output.status.success());
}

#[test]
fn language_error_aborts_the_script() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("broken.conch");
    std::fs::write(&script, "echo before\nset nope 1\necho after\n").unwrap();
    let output = conch(&[script.to_str().unwrap()], &dir);
    assert_eq!(stdout(&output), "before\n");
    assert!(stderr(&output).contains("conch: unbound name: nope"));
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn unreadable_script_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let output = conch(&["missing.conch"], &dir);
    assert_eq!(stdout(&output), "");
    assert!(output.status.success());
}

#[test]
fn background_jobs_finish_before_exit() {
    let dir = TempDir::new().unwrap();
    let output = conch(&["-c", "{ sleep 0.1; echo late > out.txt } &"], &dir);
    assert!(output.status.success());
    let written = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
    assert_eq!(written, "late\n");
}

#[test]
fn version_and_usage_errors() {
    let dir = TempDir::new().unwrap();
    let version = conch(&["--version"], &dir);
    assert!(stdout(&version).starts_with("conch "));

    let missing = conch(&["-c"], &dir);
    assert_eq!(missing.status.code(), Some(1));
    assert!(stderr(&missing).contains("-c requires a source argument"));

    let unknown = conch(&["--bogus"], &dir);
    assert_eq!(unknown.status.code(), Some(2));
}
