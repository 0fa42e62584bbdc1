//! Integration tests for the rplay CLI
//!
//! These tests run the actual binary against plans that only use probes, so
//! nothing on the host is modified.

mod common;

use assert_cmd::Command;
use common::{create_test_plan, create_test_plan_in_subdir};
use predicates::prelude::*;
use std::fs;

/// Get the binary to test
fn rplay_cmd() -> Command {
    let mut cmd = Command::cargo_bin("rplay").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

const PROBE_PLAN: &str = r#"
name: probes
tasks:
  - name: greet
    probe: echo hello
    register: greet
  - name: missing tool
    probe: exit 3
    register: tool
    ignore_errors: true
  - name: react
    probe: echo tool is missing
    when: tool.failed and 'hello' in greet.output
  - name: never
    probe: echo unreachable
    when: tool.rc == 0
"#;

#[test]
fn test_help_flag() {
    rplay_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("show"));
}

#[test]
fn test_validate_lists_tasks() {
    let (_temp_dir, plan_path) = create_test_plan(PROBE_PLAN);

    rplay_cmd()
        .arg("-f")
        .arg(&plan_path)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid (4 tasks)"))
        .stdout(predicate::str::contains("missing tool"));
}

#[test]
fn test_validate_discovers_plan_upwards() {
    let (_temp_dir, _plan_path, sub_dir) = create_test_plan_in_subdir(PROBE_PLAN);

    rplay_cmd()
        .current_dir(&sub_dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("greet"));
}

#[test]
fn test_validate_rejects_forward_reference() {
    let (_temp_dir, plan_path) = create_test_plan(
        r#"
tasks:
  - name: install
    package: { name: docker.io }
    when: output.failed
  - name: check
    probe: docker --version
    register: output
"#,
    );

    rplay_cmd()
        .arg("-f")
        .arg(&plan_path)
        .arg("validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("'output'"));
}

#[test]
fn test_missing_plan_file() {
    let temp_dir = tempfile::TempDir::new().unwrap();

    rplay_cmd()
        .arg("-f")
        .arg(temp_dir.path().join("nope.yml"))
        .arg("validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to load plan"));
}

#[test]
fn test_show_prints_normalized_plan() {
    let (_temp_dir, plan_path) = create_test_plan(PROBE_PLAN);

    rplay_cmd()
        .arg("-f")
        .arg(&plan_path)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("package_manager: apt"))
        .stdout(predicate::str::contains("tool.failed and"));
}

#[test]
fn test_run_human_report() {
    let (_temp_dir, plan_path) = create_test_plan(PROBE_PLAN);

    rplay_cmd()
        .arg("-f")
        .arg(&plan_path)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Run completed"))
        .stdout(predicate::str::contains("ignored"))
        .stdout(predicate::str::contains("skipped"));
}

#[test]
fn test_run_yaml_report() {
    let (_temp_dir, plan_path) = create_test_plan(PROBE_PLAN);

    rplay_cmd()
        .arg("-f")
        .arg(&plan_path)
        .args(["run", "--format", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("state: completed"))
        .stdout(predicate::str::contains("aborted: false"))
        .stdout(predicate::str::contains("output: hello"))
        .stdout(predicate::str::contains("exit_code: 3"))
        .stdout(predicate::str::contains("output: tool is missing"));
}

#[test]
fn test_run_aborts_on_failure() {
    let (_temp_dir, plan_path) = create_test_plan(
        r#"
tasks:
  - name: broken
    probe: "false"
  - name: after
    probe: echo after
"#,
    );

    rplay_cmd()
        .arg("-f")
        .arg(&plan_path)
        .arg("run")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Run aborted by task 'broken'"))
        .stdout(predicate::str::contains("after").not());
}

#[test]
fn test_run_rescue_recovers() {
    let (_temp_dir, plan_path) = create_test_plan(
        r#"
tasks:
  - name: guarded
    block:
      - name: broken
        probe: "false"
    rescue:
      - name: recover
        probe: echo recovered
    always:
      - name: cleanup
        probe: echo cleaned
"#,
    );

    rplay_cmd()
        .arg("-f")
        .arg(&plan_path)
        .args(["run", "--format", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("status: rescued"))
        .stdout(predicate::str::contains("output: cleaned"));
}

#[test]
fn test_run_timeout_override() {
    let (_temp_dir, plan_path) = create_test_plan(
        r#"
tasks:
  - name: slow
    probe: sleep 5
"#,
    );

    rplay_cmd()
        .arg("-f")
        .arg(&plan_path)
        .args(["run", "--format", "yaml", "--timeout", "200ms"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("error: timeout"));
}

#[test]
fn test_run_loads_env_file() {
    let (temp_dir, plan_path) = create_test_plan(
        r#"
tasks:
  - name: greeting
    probe: test "$GREETING" = hi
"#,
    );
    fs::write(temp_dir.path().join(".env"), "GREETING=hi\n").unwrap();

    rplay_cmd()
        .arg("-f")
        .arg(&plan_path)
        .arg("run")
        .assert()
        .success();
}

#[test]
fn test_silent_run_prints_nothing() {
    let (_temp_dir, plan_path) = create_test_plan(PROBE_PLAN);

    rplay_cmd()
        .arg("-s")
        .arg("-f")
        .arg(&plan_path)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_empty());
}

#[test]
fn test_completions() {
    rplay_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rplay"));
}
