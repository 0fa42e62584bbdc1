//! Integration tests for YAML parsing

mod common;

use common::{create_test_plan, create_test_plan_in_subdir, load_plan, PROVISION_PLAN};
use rplay::config::{
    find_plan_file_from, load_env_file, parse_plan, parse_plan_file, serialize_plan,
    validate_plan, PackageManager, PackageStateDef,
};
use rplay::error::{ConfigError, PlanError, RplayError};
use rplay::runner::{Action, Plan, Step};
use std::fs;
use std::time::Duration;

#[test]
fn test_parse_complete_plan() {
    let yaml = r#"
name: provision
interpreter: [bash, -c]
package_manager: dnf
timeout: 10m
tasks:
  - name: packages
    package: { name: "{{ item }}", state: latest }
    loop: [openssh-server, openssl]
    ignore_errors: true
  - name: check
    probe: docker --version
    register: output
    timeout: 30s
  - name: refresh
    update_cache: true
  - name: guarded
    when: output.failed
    block:
      - name: install
        package: { name: docker.io }
    rescue:
      - name: give up
        fail: could not install docker
"#;

    let file = parse_plan(yaml).unwrap();
    validate_plan(&file).unwrap();

    assert_eq!(file.name.as_deref(), Some("provision"));
    assert_eq!(file.package_manager, Some(PackageManager::Dnf));
    assert_eq!(file.tasks.len(), 4);

    let packages = &file.tasks[0];
    assert_eq!(
        packages.loop_items,
        Some(vec!["openssh-server".to_string(), "openssl".to_string()])
    );
    assert_eq!(packages.package.as_ref().unwrap().state, PackageStateDef::Latest);

    let guarded = &file.tasks[3];
    assert!(guarded.is_block());
    assert_eq!(guarded.rescue.len(), 1);

    let plan = Plan::from_config(&file).unwrap();
    assert_eq!(plan.settings().timeout, Some(Duration::from_secs(600)));
    assert_eq!(
        plan.settings().interpreter,
        Some(vec!["bash".to_string(), "-c".to_string()])
    );
    assert_eq!(plan.tasks().len(), 5);
    assert_eq!(
        plan.task("check").unwrap().timeout,
        Some(Duration::from_secs(30))
    );
}

#[test]
fn test_runtime_plan_shape() {
    let plan = load_plan(PROVISION_PLAN);

    assert_eq!(plan.name(), Some("provision"));
    assert_eq!(plan.steps().len(), 4);
    assert!(matches!(plan.steps()[0], Step::Task(_)));

    let install = plan.task("Install docker").unwrap();
    assert_eq!(
        install.action,
        Action::PackagePresent {
            name: "docker.io".to_string()
        }
    );
    assert_eq!(install.when.as_ref().unwrap().to_string(), "output.failed");
}

#[test]
fn test_plan_file_round_trip() {
    let file = parse_plan(PROVISION_PLAN).unwrap();
    let yaml = serialize_plan(&file).unwrap();
    assert_eq!(parse_plan(&yaml).unwrap(), file);
}

#[test]
fn test_runtime_plan_round_trip() {
    let plan = load_plan(PROVISION_PLAN);
    let yaml = serialize_plan(&plan.to_config()).unwrap();
    assert_eq!(load_plan(&yaml), plan);
}

#[test]
fn test_empty_loop_survives_round_trip() {
    let plan = load_plan(
        r#"
tasks:
  - name: nothing to install
    package: { name: "{{ item }}" }
    loop: []
"#,
    );
    assert_eq!(plan.task("nothing to install").unwrap().loop_items, Some(Vec::new()));

    let yaml = serialize_plan(&plan.to_config()).unwrap();
    assert!(yaml.contains("loop: []"));
    assert_eq!(load_plan(&yaml), plan);
}

#[test]
fn test_parse_plan_file_from_disk() {
    let (_temp_dir, plan_path) = create_test_plan(PROVISION_PLAN);

    let file = parse_plan_file(&plan_path).unwrap();
    assert_eq!(file.tasks.len(), 4);
}

#[test]
fn test_find_plan_file_in_parent() {
    let (_temp_dir, plan_path, sub_dir) = create_test_plan_in_subdir(PROVISION_PLAN);

    let found = find_plan_file_from(sub_dir).unwrap();
    assert_eq!(found, plan_path);
}

#[test]
fn test_env_file_next_to_plan() {
    let (temp_dir, plan_path) = create_test_plan(PROVISION_PLAN);
    fs::write(temp_dir.path().join(".env"), "DEBIAN_FRONTEND=noninteractive\n").unwrap();

    let env = load_env_file(&plan_path).unwrap();
    assert_eq!(
        env,
        vec![(
            "DEBIAN_FRONTEND".to_string(),
            "noninteractive".to_string()
        )]
    );
}

#[test]
fn test_unknown_keys_rejected() {
    let yaml = r#"
tasks:
  - name: typo
    probe: "true"
    registr: output
"#;
    assert!(matches!(parse_plan(yaml), Err(RplayError::Yaml(_))));
}

#[test]
fn test_entry_with_two_actions_rejected() {
    let yaml = r#"
tasks:
  - name: both
    probe: "true"
    update_cache: true
"#;
    let file = parse_plan(yaml).unwrap();
    assert!(matches!(
        validate_plan(&file),
        Err(ConfigError::AmbiguousEntry(name)) if name == "both"
    ));
}

#[test]
fn test_rescue_without_block_rejected() {
    let yaml = r#"
tasks:
  - name: check
    probe: "true"
    rescue:
      - name: fix
        probe: "true"
"#;
    let file = parse_plan(yaml).unwrap();
    assert!(matches!(
        validate_plan(&file),
        Err(ConfigError::MisplacedField { field, .. }) if field == "rescue"
    ));
}

#[test]
fn test_register_on_block_rejected() {
    let yaml = r#"
tasks:
  - register: group
    block:
      - name: check
        probe: "true"
"#;
    let file = parse_plan(yaml).unwrap();
    assert!(matches!(
        validate_plan(&file),
        Err(ConfigError::MisplacedField { field, .. }) if field == "register"
    ));
}

#[test]
fn test_invalid_timeout_rejected() {
    let yaml = r#"
tasks:
  - name: check
    probe: "true"
    timeout: forever
"#;
    let file = parse_plan(yaml).unwrap();
    assert!(matches!(
        validate_plan(&file),
        Err(ConfigError::InvalidTimeout(value)) if value == "forever"
    ));
}

fn plan_error(yaml: &str) -> PlanError {
    match Plan::from_config(&parse_plan(yaml).unwrap()) {
        Err(RplayError::Plan(err)) => err,
        other => panic!("expected a plan error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_duplicate_task_name_rejected() {
    let err = plan_error(
        r#"
tasks:
  - name: check
    probe: "true"
  - block:
      - name: check
        probe: "false"
"#,
    );
    assert_eq!(err, PlanError::DuplicateTaskName("check".to_string()));
}

#[test]
fn test_forward_reference_rejected() {
    let err = plan_error(
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
    assert_eq!(
        err,
        PlanError::UnknownReference {
            task: "install".to_string(),
            name: "output".to_string(),
        }
    );
}

#[test]
fn test_bad_predicate_rejected() {
    let err = plan_error(
        r#"
tasks:
  - name: check
    probe: "true"
    register: check
  - name: next
    probe: "true"
    when: check.failed and
"#,
    );
    assert!(matches!(err, PlanError::InvalidPredicate { task, .. } if task == "next"));
}

#[test]
fn test_keyword_register_name_rejected() {
    let err = plan_error(
        r#"
tasks:
  - name: check
    probe: "true"
    register: not
"#,
    );
    assert!(matches!(err, PlanError::InvalidRegisterName { name, .. } if name == "not"));
}

#[test]
fn test_empty_plan_rejected() {
    assert_eq!(plan_error("tasks: []\n"), PlanError::EmptyPlan);
}

#[test]
fn test_rescue_may_reference_block_registration() {
    let plan = load_plan(
        r#"
tasks:
  - block:
      - name: check
        probe: docker --version
        register: docker
    rescue:
      - name: report
        fail: "docker probe failed"
        when: docker.failed
"#,
    );
    assert_eq!(plan.tasks().len(), 2);
}
