//! CLI surface tests

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_all_commands() {
    let mut cmd = Command::cargo_bin("airlift").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("abort"))
        .stdout(predicate::str::contains("delete"));
}

#[test]
fn test_bare_invocation_shows_usage() {
    let mut cmd = Command::cargo_bin("airlift").unwrap();
    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_invalid_entity_id_is_rejected_before_any_work() {
    // Argument validation happens before the state database is opened, so a
    // bad id never creates one.
    let mut cmd = Command::cargo_bin("airlift").unwrap();
    cmd.args(["status", "not-a-uuid"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not a valid entity id"));
}

#[test]
fn test_create_requires_kind_and_source() {
    let mut cmd = Command::cargo_bin("airlift").unwrap();
    cmd.arg("create")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_kind_values_are_validated() {
    let mut cmd = Command::cargo_bin("airlift").unwrap();
    cmd.args(["create", "repository", "acme/widgets"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("possible values"));
}
