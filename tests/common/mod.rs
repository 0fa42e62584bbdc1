//! Common test utilities
#![allow(dead_code)]

use rplay::config::parse_plan;
use rplay::runner::{run_plan, Context, FakeTarget, Plan, RunOutcome};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Create a temporary directory with an rplay.yml file
pub fn create_test_plan(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let plan_path = temp_dir.path().join("rplay.yml");
    fs::write(&plan_path, content).unwrap();
    (temp_dir, plan_path)
}

/// Create a test plan with a subdirectory to run from
pub fn create_test_plan_in_subdir(content: &str) -> (TempDir, PathBuf, PathBuf) {
    let (temp_dir, plan_path) = create_test_plan(content);
    let sub_dir = temp_dir.path().join("subdir");
    fs::create_dir(&sub_dir).unwrap();
    (temp_dir, plan_path, sub_dir)
}

/// Parse and build a runtime plan from YAML
pub fn load_plan(yaml: &str) -> Plan {
    Plan::from_config(&parse_plan(yaml).unwrap()).unwrap()
}

/// Run YAML against a fake target with no timeout
pub fn run_yaml(yaml: &str, target: &mut FakeTarget) -> RunOutcome {
    run_plan(&load_plan(yaml), target, Context::new())
}

/// The provisioning scenario: refresh ssh packages, probe docker, install it if missing
pub const PROVISION_PLAN: &str = r#"
name: provision
tasks:
  - name: Ensure ssh tooling is current
    package: { name: "{{ item }}", state: latest }
    loop: [openssh-server, openssl]
    ignore_errors: true
  - name: Check docker
    probe: docker --version
    register: output
    ignore_errors: true
  - name: Refresh package index
    update_cache: true
  - name: Install docker
    package: { name: docker.io }
    when: output.failed
"#;

/// A host with outdated ssh packages and docker available but not installed
pub fn host_without_docker() -> FakeTarget {
    FakeTarget::new()
        .with_outdated("openssh-server")
        .with_installed("openssl")
        .with_available("docker.io")
        .with_stale_cache()
}

/// Same host with docker installed and answering `--version`
pub fn host_with_docker() -> FakeTarget {
    host_without_docker()
        .with_installed("docker.io")
        .with_command("docker --version", 0, "Docker version 24.0.7, build afdd53b\n")
}
