use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn cli_no_args() {
    Command::new(env!("CARGO"))
        .arg("run")
        .arg("--quiet")
        .arg("-p")
        .arg("reginspect-cli")
        .arg("--")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"))
        .stdout(predicate::str::is_empty());
}

#[test]
fn cli_help() {
    Command::new(env!("CARGO"))
        .arg("run")
        .arg("--quiet")
        .arg("-p")
        .arg("reginspect-cli")
        .arg("--")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("REGINSPECT_REGISTRIES"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn cli_bad_reference() {
    Command::new(env!("CARGO"))
        .arg("run")
        .arg("--quiet")
        .arg("-p")
        .arg("reginspect-cli")
        .arg("--")
        .arg("inspect")
        .arg("Not/A/Valid:Ref:")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid image reference format"))
        .stdout(predicate::str::is_empty());
}

#[test]
fn cli_unusable_registry_candidate() {
    Command::new(env!("CARGO"))
        .arg("run")
        .arg("--quiet")
        .arg("-p")
        .arg("reginspect-cli")
        .arg("--")
        .arg("-l")
        .arg("off")
        .arg("--registry")
        .arg("bad registry name")
        .arg("tags")
        .arg("busybox")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid image reference format"))
        .stdout(predicate::str::is_empty());
}
