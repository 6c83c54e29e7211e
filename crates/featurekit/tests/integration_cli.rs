//! Integration tests for the listing and lookup commands

mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use support::Fixture;

#[test]
fn test_help() {
    let mut cmd = Command::cargo_bin("featurekit").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("cache"));
}

#[test]
fn test_missing_install_root() {
    let mut cmd = Command::cargo_bin("featurekit").unwrap();
    cmd.arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--install-root"));
}

#[test]
fn test_list_text() {
    let fixture = Fixture::new();
    fixture
        .command()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("servlet-4.0"))
        .stdout(predicate::str::contains("usr:custom-1.0"))
        .stdout(predicate::str::contains("com.example.servlet.jsp"))
        .stdout(predicate::str::contains("auto"));
}

#[test]
fn test_list_public_json() {
    let fixture = Fixture::new();
    let output = fixture
        .command()
        .args(["list", "--public", "--json", "--log-level", "error"])
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    let json: Value = serde_json::from_str(&stdout).expect("Should be valid JSON");
    let rows = json.as_array().expect("array of features");
    let names: Vec<&str> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["jsp-2.3", "servlet-4.0", "usr:custom-1.0"]);
    assert_eq!(rows[2]["repoType"], "usr");
    assert_eq!(rows[2]["version"], "2.1.0");
    assert_eq!(rows[0]["visibility"], "PUBLIC");
    assert!(rows[0].get("repoType").is_none());
}

#[test]
fn test_show_by_short_and_alternate_name() {
    let fixture = Fixture::new();
    for name in ["SERVLET-4.0", "com.example.servlet-4.0", "webContainer-4.0"] {
        fixture
            .command()
            .args(["show", name])
            .assert()
            .success()
            .stdout(predicate::str::contains("Symbolic name:   com.example.servlet-4.0"))
            .stdout(predicate::str::contains("com.example.servlet (osgi.bundle) [1.0.0,2.0.0)"))
            .stdout(predicate::str::contains("com.example.jsp-2.3 (osgi.subsystem.feature)"));
    }
}

#[test]
fn test_show_unknown_feature_exits_2() {
    let fixture = Fixture::new();
    fixture
        .command()
        .args(["show", "nope-1.0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("feature not found: nope-1.0"));
}

#[test]
fn test_json_logs_stay_on_stderr() {
    let fixture = Fixture::new();
    fixture.write("wlp/lib/features/broken.mf", "Subsystem-Type: osgi.subsystem.feature\n");
    let output = fixture
        .command()
        .args(["list", "--json", "--log-format", "json", "--log-level", "debug"])
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    serde_json::from_str::<Value>(&stdout).expect("stdout is pure JSON");
    let stderr = String::from_utf8_lossy(&output.get_output().stderr);
    assert!(stderr.lines().any(|l| l.contains("broken.mf")));
}
