use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::{contains, starts_with};

fn autologin() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("autologin"));
    for var in [
        "GH_USERNAME",
        "GH_PASSWORD",
        "GH_SESSION",
        "TG_BOT_TOKEN",
        "TG_CHAT_ID",
        "REPO_TOKEN",
        "GITHUB_REPOSITORY",
        "AUTOLOGIN_LOG_DIR",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_cli_help() {
    autologin()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Autologin"))
        .stdout(contains("--two-factor-wait"));
}

#[test]
fn test_cli_version() {
    autologin().arg("--version").assert().success();
}

#[test]
fn test_cli_completions() {
    autologin()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(starts_with("_autologin"));
}

#[test]
fn test_missing_credentials_exit_one() {
    let dir = tempfile::tempdir().unwrap();
    autologin()
        .env("CAPTURE_DIR", dir.path())
        .assert()
        .code(1)
        .stderr(contains("GH_USERNAME"));
}

#[test]
fn test_password_without_username_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    autologin()
        .env("GH_PASSWORD", "hunter2")
        .env("CAPTURE_DIR", dir.path())
        .arg("run")
        .assert()
        .code(1)
        .stderr(contains("Missing configuration: GH_USERNAME"))
        .stderr(contains("hunter2").not());
}

#[test]
fn test_invalid_wait_is_rejected_by_parser() {
    autologin()
        .env("TWO_FACTOR_WAIT", "soon")
        .assert()
        .failure()
        .stderr(contains("TWO_FACTOR_WAIT").or(contains("two-factor-wait")));
}
