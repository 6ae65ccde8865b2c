//! CLI surface smoke tests

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("vmfleet")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("ssh"))
        .stdout(predicate::str::contains("tunnel"));
}

#[test]
fn version_flag_works() {
    Command::cargo_bin("vmfleet")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vmfleet"));
}

#[test]
fn unknown_subcommand_fails() {
    Command::cargo_bin("vmfleet")
        .unwrap()
        .arg("frobnicate")
        .assert()
        .failure();
}

#[test]
fn completions_emit_bash_script() {
    Command::cargo_bin("vmfleet")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vmfleet"));
}

#[test]
fn run_requires_a_command() {
    Command::cargo_bin("vmfleet")
        .unwrap()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("COMMAND"));
}
