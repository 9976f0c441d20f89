use assert_cmd::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

fn write_inventory(dir: &Path) -> PathBuf {
    let toml = r#"
[[ingredient]]
id = 7
name = "Hedione"
stock_g = 50.0
large = { uid = "0x3c", pin = 30, ms_per_gram = 10 }

[[ingredient]]
id = 8
name = "Iso E Super"
stock_g = 50.0

[[recipe]]
id = 4
name = "Trial"
reference_batch_g = 10.0
[[recipe.item]]
ingredient_id = 7
duration_ms = 150
[[recipe.item]]
ingredient_id = 8
duration_ms = 100
selected = false
"#;
    let path = dir.join("inventory.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("not JSON: {l}: {e}")))
        .collect()
}

#[test]
fn plan_json_lists_requests() {
    let dir = tempdir().unwrap();
    let out = Command::cargo_bin("mixer")
        .unwrap()
        .arg("--json")
        .arg("--inventory")
        .arg(write_inventory(dir.path()))
        .args(["plan", "Trial", "--grams", "10"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0));
    let lines = json_lines(&out.stdout);
    assert_eq!(lines.len(), 1);
    let plan = &lines[0];
    assert_eq!(plan["recipe"], "Trial");
    let requests = plan["requests"].as_array().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["uid"], "0x3c");
    assert_eq!(requests[0]["duration_ms"], 150);
    assert!(plan["errors"].as_array().unwrap().is_empty());
}

#[test]
fn selecting_an_unwired_line_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    let out = Command::cargo_bin("mixer")
        .unwrap()
        .arg("--json")
        .arg("--inventory")
        .arg(write_inventory(dir.path()))
        .args(["plan", "Trial", "--grams", "10", "--all"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(6));
    let plan = &json_lines(&out.stdout)[0];
    let errors = plan["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().contains("Iso E Super"));
}

#[test]
fn check_stock_does_not_pass_an_incomplete_plan() {
    let dir = tempdir().unwrap();
    let inventory = write_inventory(dir.path());
    let out = Command::cargo_bin("mixer")
        .unwrap()
        .arg("--json")
        .arg("--inventory")
        .arg(&inventory)
        .args(["check-stock", "Trial", "--grams", "10", "--all"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(6));
    let report = &json_lines(&out.stdout)[0];
    assert_eq!(report["complete"], false);
    let errors = report["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().contains("Iso E Super"));

    let out = Command::cargo_bin("mixer")
        .unwrap()
        .arg("--inventory")
        .arg(&inventory)
        .args(["check-stock", "Trial", "--grams", "10", "--all"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(6));
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(!text.contains("stock ok"), "{text}");
    assert!(text.contains("Iso E Super"), "{text}");
}

#[test]
fn run_json_events_end_with_finished() {
    let dir = tempdir().unwrap();
    let out = Command::cargo_bin("mixer")
        .unwrap()
        .arg("--json")
        .arg("--inventory")
        .arg(write_inventory(dir.path()))
        .args(["run", "Trial", "--grams", "10", "--simulate"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0));
    let events = json_lines(&out.stdout);
    for e in &events {
        assert!(e.get("event").is_some(), "missing event tag: {e}");
    }
    let steps: Vec<&Value> = events.iter().filter(|e| e["event"] == "step").collect();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["pin"], 30);
    let last = events.last().unwrap();
    assert_eq!(last["event"], "finished");
    assert_eq!(last["status"], "completed");
    assert_eq!(last["exit_code"], 0);
    assert_eq!(last["detail"]["consumed"][0]["consumed_g"], 15.0);
}

#[test]
fn errors_are_structured_in_json_mode() {
    let dir = tempdir().unwrap();
    let out = Command::cargo_bin("mixer")
        .unwrap()
        .arg("--json")
        .arg("--inventory")
        .arg(write_inventory(dir.path()))
        .args(["estimate", "Nope", "--grams", "10"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(6));
    let stderr = String::from_utf8_lossy(&out.stderr);
    let err_line = stderr
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with('{') && l.contains("\"reason\""))
        .expect("structured error line");
    let v: Value = serde_json::from_str(err_line).unwrap();
    assert_eq!(v["reason"], "ConfigurationError");
    assert_eq!(v["exit_code"], 6);
}
