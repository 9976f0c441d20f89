use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

// Short pulses and margins keep simulated runs fast in wall-clock time.
fn write_config(dir: &Path) -> PathBuf {
    let toml = r#"
[execution]
sequential_settle_ms = 20
parallel_margin_ms = 20
inter_command_delay_ms = 5

[pins]
max_pin = 69
restricted = [0, 1, 13]
"#;
    let path = dir.join("mixer.toml");
    fs::write(&path, toml).unwrap();
    path
}

// Bergamot: 200 ms at 100 g -> 5 g on the small pump at 50 g.
// Lemon: small pump unwired, falls back to the large one on A0.
// Neroli: far short of stock for Chypre.
fn write_inventory(dir: &Path) -> PathBuf {
    let toml = r#"
[[ingredient]]
id = 1
name = "Bergamot"
stock_g = 200.0
threshold_g = 10.0
large = { uid = "0x1f", pin = 22, ms_per_gram = 20 }
small = { uid = "0x1f", pin = 23, ms_per_gram = 50 }

[[ingredient]]
id = 2
name = "Neroli"
stock_g = 1.0
large = { uid = "0x2a", pin = 24, ms_per_gram = 10 }

[[ingredient]]
id = 3
name = "Lemon"
stock_g = 100.0
large = { uid = "0x2a", pin = 54, ms_per_gram = 10 }

[[recipe]]
id = 1
name = "Cologne"
reference_batch_g = 100.0
[[recipe.item]]
ingredient_id = 1
duration_ms = 200
order = 0
[[recipe.item]]
ingredient_id = 3
duration_ms = 100
order = 1

[[recipe]]
id = 2
name = "Chypre"
reference_batch_g = 100.0
[[recipe.item]]
ingredient_id = 2
duration_ms = 400
"#;
    let path = dir.join("inventory.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn mixer(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mixer").unwrap();
    cmd.arg("--config")
        .arg(write_config(dir))
        .arg("--inventory")
        .arg(write_inventory(dir));
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["plan", "Cologne", "--grams", "50"], 0, "Bergamot", "stdout")]
#[case(&["plan", "cologne", "--grams", "50"], 0, "(scale 0.500)", "stdout")]
#[case(&["estimate", "1", "--grams", "50"], 0, "sequential: 190 ms", "stdout")]
#[case(&["check-stock", "Cologne", "--grams", "50"], 0, "stock ok", "stdout")]
#[case(&["check-stock", "Chypre", "--grams", "100"], 3, "Neroli: need 40.00 g", "stdout")]
#[case(&["max-batch", "Cologne"], 0, "at most 1000 g", "stdout")]
#[case(&["max-batch", "Chypre"], 0, "at most 2 g", "stdout")]
#[case(&["audit"], 0, "no wiring problems", "stdout")]
#[case(&["plan", "Fougere", "--grams", "50"], 6, "No recipe", "stderr")]
#[case(&["plan", "Cologne"], 2, "--grams", "stderr")]
#[case(&["run", "Cologne", "--grams", "50", "--bogus"], 2, "unexpected argument", "stderr")]
#[case(&["run", "Cologne", "--grams", "50"], 6, "No serial device", "stderr")]
#[case(&["pulse", "--slave", "31", "--pin", "A3", "--ms", "100", "--simulate"], 0, "> pulse 31 57 100", "stdout")]
#[case(&["pulse", "--slave", "31", "--pin", "B3", "--ms", "100", "--simulate"], 6, "is not a pin", "stderr")]
#[case(&["pulse", "--slave", "31", "--pin", "22", "--ms", "70000", "--simulate"], 6, "What happened", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let mut cmd = mixer(dir.path());
    cmd.args(args);

    let assert = cmd.assert().code(exit_code);
    if stream == "stdout" {
        assert.stdout(predicate::str::contains(needle));
    } else {
        assert.stderr(predicate::str::contains(needle));
    }
}

#[test]
fn simulated_run_sends_batches_and_debits_stock() {
    let dir = tempdir().unwrap();
    mixer(dir.path())
        .args(["run", "Cologne", "--grams", "50", "--simulate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("run completed"))
        .stdout(predicate::str::contains("> batchprep 0x1f 23:100"))
        .stdout(predicate::str::contains("> batchprep 0x2a 54:50"))
        .stdout(predicate::str::contains("> batchrun"));

    let inventory = fs::read_to_string(dir.path().join("inventory.toml")).unwrap();
    assert!(inventory.contains("stock_g = 195.0"), "{inventory}");
    assert!(inventory.contains("stock_g = 1.0"), "{inventory}");
}

#[test]
fn parallel_run_prepares_every_node_before_one_trigger() {
    let dir = tempdir().unwrap();
    let out = mixer(dir.path())
        .args(["run", "Cologne", "--grams", "50", "--mode", "parallel", "--simulate"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8(out.stdout).unwrap();
    let sent: Vec<&str> = stdout
        .lines()
        .filter_map(|l| l.strip_prefix("> "))
        .collect();
    assert_eq!(
        sent,
        vec![
            "batchabort",
            "batchprep 0x1f 23:100",
            "batchprep 0x2a 54:50",
            "batchrun"
        ]
    );
}

#[test]
fn stock_shortfall_blocks_the_run_without_sending_pulses() {
    let dir = tempdir().unwrap();
    mixer(dir.path())
        .args(["run", "Chypre", "--grams", "100", "--simulate"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("not enough stock"))
        .stdout(predicate::str::contains("batchprep").not());
}

#[test]
fn restricted_pins_fail_the_audit() {
    let dir = tempdir().unwrap();
    let inv = write_inventory(dir.path());
    let text = fs::read_to_string(&inv).unwrap().replace("pin = 24", "pin = 13");
    fs::write(&inv, text).unwrap();
    Command::cargo_bin("mixer")
        .unwrap()
        .arg("--config")
        .arg(write_config(dir.path()))
        .arg("--inventory")
        .arg(&inv)
        .arg("audit")
        .assert()
        .code(6)
        .stdout(predicate::str::contains("13"));
}

#[test]
fn missing_inventory_is_a_configuration_error() {
    Command::cargo_bin("mixer")
        .unwrap()
        .args(["plan", "Cologne", "--grams", "50"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("--inventory"));
}

#[test]
fn invalid_config_is_rejected_before_anything_runs() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[execution]\nmax_batch_size = 0\n").unwrap();
    Command::cargo_bin("mixer")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .code(6)
        .stderr(predicate::str::contains("max_batch_size"));
}

#[test]
fn self_check_reports_inventory_counts() {
    let dir = tempdir().unwrap();
    mixer(dir.path())
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 ingredients, 2 recipes"));
}

#[test]
fn calibration_overrides_rates_in_memory() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("cal.csv");
    fs::write(&csv, "ingredient,pump,ms_per_gram\n3,large,20\n").unwrap();
    // Lemon at 20 ms/g: 100 ms at 100 g is 5 g, 2.5 g at half batch.
    mixer(dir.path())
        .arg("--calibration")
        .arg(&csv)
        .args(["plan", "Cologne", "--grams", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2.50 g"));
}
