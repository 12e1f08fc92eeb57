use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use std::fs;
use tempfile::TempDir;

const BIN: &str = "chainbuild";

const DOCUMENT: &str = r#"
source_dirs: [src]
output:
  path: dist
  handlers:
    - test: { $regex: "\\.yaml$" }
      use: [yaml-to-json]
"#;

fn project(document: &str) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    fs::create_dir_all(dir.path().join("src")).expect("mkdir");
    fs::write(dir.path().join("src/a.yaml"), "k: v\n").expect("write");
    fs::write(dir.path().join("chainbuild.yaml"), document).expect("write");
    dir
}

fn chainbuild(dir: &TempDir) -> Command {
    let mut command = Command::cargo_bin(BIN).expect("binary should build");
    command.current_dir(dir.path()).env("HOME", dir.path());
    command
}

#[test]
fn version_flag_prints_crate_version() {
    Command::cargo_bin(BIN)
        .expect("binary should build")
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(format!("{BIN} {}", chainbuild::VERSION)));
}

#[test]
fn build_writes_outputs() {
    let dir = project(DOCUMENT);
    chainbuild(&dir)
        .arg("build")
        .assert()
        .success()
        .stdout(contains("wrote dist/a.yaml"));
    let written = fs::read_to_string(dir.path().join("dist/a.yaml")).expect("output");
    assert_eq!(written, r#"{"k":"v"}"#);
}

#[test]
fn collisions_exit_with_code_two() {
    let document = format!("{}    - use: [length]\n", DOCUMENT);
    let dir = project(&document);
    chainbuild(&dir)
        .arg("build")
        .assert()
        .code(2)
        .stdout(contains("aborted"));
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn builds_over_the_project_root_skip_its_own_logs() {
    let document = "source_dirs: [.]\noutput:\n  path: dist\n  handlers:\n    - {}\n";
    let dir = project(document);
    chainbuild(&dir)
        .arg("build")
        .assert()
        .success()
        .stdout(contains("wrote dist/src/a.yaml"))
        .stdout(contains(".chainbuild").not());
    assert!(dir.path().join(".chainbuild/logs").is_dir());
    assert!(!dir.path().join("dist/.chainbuild").exists());
}

#[test]
fn plan_json_reports_without_writing() {
    let dir = project(DOCUMENT);
    let output = chainbuild(&dir)
        .args(["plan", "--json"])
        .output()
        .expect("plan runs");
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["status"], "Succeeded");
    assert_eq!(report["outputs"][0]["bytes"], 9);
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn missing_documents_fail() {
    let dir = TempDir::new().expect("tempdir");
    Command::cargo_bin(BIN)
        .expect("binary should build")
        .current_dir(dir.path())
        .env("HOME", dir.path())
        .args(["build", "--config", "absent.yaml"])
        .assert()
        .code(1)
        .stderr(contains("CB-CFG-001"));
}

#[test]
fn loaders_lists_builtins() {
    let dir = TempDir::new().expect("tempdir");
    Command::cargo_bin(BIN)
        .expect("binary should build")
        .env("HOME", dir.path())
        .arg("loaders")
        .assert()
        .success()
        .stdout(contains("yaml-to-json"))
        .stdout(contains("length"));
}
