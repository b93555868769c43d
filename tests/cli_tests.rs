use assert_cmd::cargo;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// A copy of a demo stack with its own state directory
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new(demo: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
        fs::copy(demos.join(demo), dir.path().join("stack.toml")).unwrap();
        fs::copy(demos.join("web-server.sh"), dir.path().join("web-server.sh")).unwrap();
        Self { dir }
    }

    fn with_stack(content: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stack.toml"), content).unwrap();
        Self { dir }
    }

    fn state_dir(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(cargo::cargo_bin!("stackform"));
        cmd.current_dir(self.dir.path())
            .env("NO_COLOR", "1")
            .env("STACKFORM_STATE_DIR", self.state_dir())
            .env_remove("STACKFORM_FILE")
            .env_remove("STACKFORM_FAIL")
            .env_remove("STACKFORM_FLAKY");
        cmd
    }
}

#[test]
fn test_help() {
    let mut cmd = Command::new(cargo::cargo_bin!("stackform"));
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Declarative provisioning"));
}

#[test]
fn test_version() {
    let mut cmd = Command::new(cargo::cargo_bin!("stackform"));
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stackform"));
}

#[test]
fn test_validate_demo() {
    let sandbox = Sandbox::new("immersion-day.toml");
    sandbox
        .cmd()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("8 resources, 2 outputs"));
    assert!(!sandbox.state_dir().exists());
}

#[test]
fn test_graph_lists_layout_subnets() {
    let sandbox = Sandbox::new("immersion-day.toml");
    sandbox
        .cmd()
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::contains("vpc-public-1"))
        .stdout(predicate::str::contains("vpc-private-2"));
}

#[test]
fn test_plan_on_empty_state() {
    let sandbox = Sandbox::new("immersion-day.toml");
    sandbox
        .cmd()
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("8 to create"));
}

#[test]
fn test_apply_is_idempotent_and_outputs_resolve() {
    let sandbox = Sandbox::new("immersion-day.toml");
    sandbox
        .cmd()
        .args(["apply", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("8 resources created"));

    assert!(sandbox.state_dir().join("immersion-day.cloud.json").exists());
    let record = fs::read_to_string(sandbox.state_dir().join("immersion-day.state.toml")).unwrap();
    assert!(record.contains("success = true"));

    // Nothing left to do, so no prompt even without --yes
    sandbox
        .cmd()
        .arg("apply")
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes"));

    let output = sandbox.cmd().args(["output", "--json"]).output().unwrap();
    assert!(output.status.success());
    let values: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(values["ec2PublicIp"]["value"].as_str().unwrap().starts_with("3."));
    assert_eq!(values["ec2PublicIp"]["export_name"], "ec2PublicIp");
    assert!(
        values["ec2PublicDnsName"]["value"]
            .as_str()
            .unwrap()
            .ends_with(".compute-1.amazonaws.com")
    );

    sandbox
        .cmd()
        .arg("output")
        .assert()
        .success()
        .stdout(predicate::str::contains("exported as ec2PublicDnsName"));

    let record = fs::read_to_string(sandbox.state_dir().join("immersion-day.state.toml")).unwrap();
    assert!(record.contains("[exports]"));
}

#[test]
fn test_apply_requires_confirmation_without_tty() {
    let sandbox = Sandbox::new("immersion-day.toml");
    sandbox
        .cmd()
        .arg("apply")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn test_dry_run_changes_nothing() {
    let sandbox = Sandbox::new("immersion-day.toml");
    sandbox
        .cmd()
        .args(["apply", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"));

    sandbox
        .cmd()
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("8 to create"));
}

#[test]
fn test_failed_network_skips_dependents() {
    let sandbox = Sandbox::new("immersion-day.toml");
    sandbox
        .cmd()
        .env("STACKFORM_FAIL", "vpc")
        .args(["apply", "--yes"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("skipped"))
        .stderr(predicate::str::contains("operations failed"));

    let record = fs::read_to_string(sandbox.state_dir().join("immersion-day.state.toml")).unwrap();
    assert!(record.contains("success = false"));
}

#[test]
fn test_flaky_provider_is_retried() {
    let sandbox = Sandbox::new("immersion-day.toml");
    sandbox
        .cmd()
        .env("STACKFORM_FLAKY", "web-sg:2")
        .args(["apply", "--yes"])
        .assert()
        .success();
}

#[test]
fn test_destroy_removes_everything() {
    let sandbox = Sandbox::new("immersion-day.toml");
    sandbox.cmd().args(["apply", "--yes"]).assert().success();
    sandbox
        .cmd()
        .args(["destroy", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("8 resources deleted"));

    sandbox
        .cmd()
        .args(["output", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("{}"));
}

#[test]
fn test_targeted_apply_includes_prerequisites() {
    let sandbox = Sandbox::new("immersion-day.toml");
    sandbox
        .cmd()
        .args(["apply", "--yes", "--target", "security_group.web-sg"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 resources created"));
}

#[test]
fn test_fleet_demo_applies() {
    let sandbox = Sandbox::new("web-fleet.toml");
    sandbox
        .cmd()
        .args(["apply", "--yes", "--jobs", "8"])
        .assert()
        .success()
        .stdout(predicate::str::contains("loadBalancerDns"));
}

#[test]
fn test_dangling_reference_is_rejected() {
    let sandbox = Sandbox::with_stack(
        r#"
[stack]
name = "broken"

[[resources]]
name = "web-sg"
kind = "security_group"
network = "vpc"
"#,
    );
    sandbox
        .cmd()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown resource 'vpc'"));
}

#[test]
fn test_invariant_violations_are_listed() {
    let sandbox = Sandbox::with_stack(
        r#"
[stack]
name = "broken"

[[resources]]
name = "vpc"
kind = "network"
cidr = "10.0.0.0/16"

[[resources]]
name = "a"
kind = "subnet"
network = "vpc"
cidr = "10.1.0.0/24"
availability_zone = "us-east-1a"
tier = "public"
"#,
    );
    sandbox
        .cmd()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside network vpc"));
}

#[test]
fn test_missing_stack_file() {
    let sandbox = Sandbox::with_stack("");
    sandbox
        .cmd()
        .args(["-f", "nope.toml", "plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Stack file not found"));
}

#[test]
fn test_completions() {
    let mut cmd = Command::new(cargo::cargo_bin!("stackform"));
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stackform"));
}
