//! Process-level checks of the `ember` binary's exit contract.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn ember(workdir: &TempDir) -> Command {
    let mut command = Command::cargo_bin("ember").expect("binary builds");
    command.current_dir(workdir.path());
    command
}

#[test]
fn help_exits_cleanly_with_a_usage_banner() {
    let workdir = TempDir::new().expect("workdir");
    ember(&workdir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn single_dash_help_is_accepted() {
    let workdir = TempDir::new().expect("workdir");
    ember(&workdir)
        .arg("-help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn broken_log_filter_is_a_software_failure() {
    let workdir = TempDir::new().expect("workdir");
    ember(&workdir)
        .env("EMBER_LOG", "not==a==filter")
        .args(["ember:heartbeat"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid log filter"));
}

#[test]
fn no_deployable_and_no_manifest_fails_deployment() {
    let workdir = TempDir::new().expect("workdir");
    ember(&workdir)
        .assert()
        .code(15)
        .stderr(predicate::str::contains("no deployable"));
}

#[test]
fn malformed_instance_count_is_a_usage_error() {
    let workdir = TempDir::new().expect("workdir");
    ember(&workdir)
        .args(["ember:heartbeat", "-instances", "BOOM"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Usage:"))
        .stderr(predicate::str::contains("BOOM"));
}

#[test]
fn unregistered_deployable_fails_deployment() {
    let workdir = TempDir::new().expect("workdir");
    ember(&workdir)
        .args(["ember:Ghost"])
        .assert()
        .code(15)
        .stderr(predicate::str::contains("ember:Ghost"));
}

#[test]
fn manifest_in_the_working_directory_resolves_the_deployable() {
    let workdir = TempDir::new().expect("workdir");
    std::fs::write(
        workdir.path().join("ember-manifest.json"),
        r#"{"mainDeployable":"ember:Ghost"}"#,
    )
    .expect("write manifest");
    // The stock binary only registers the heartbeat deployable, so the
    // manifest entry resolves but deployment fails on lookup.
    ember(&workdir)
        .assert()
        .code(15)
        .stderr(predicate::str::contains("ember:Ghost"));
}
