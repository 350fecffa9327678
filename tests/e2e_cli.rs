use assert_cmd::{cargo, prelude::*};
use predicates::prelude::*;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

fn setup_temp_home() -> TempDir {
    TempDir::new().expect("failed to create temp home")
}

fn base_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("pinsight"));
    cmd.env("HOME", home.path());
    cmd.arg("--no-color");
    cmd
}

fn write_snapshot(home: &TempDir, json: &str) -> PathBuf {
    let path = home.path().join("snapshot.json");
    std::fs::write(&path, json).expect("failed to write snapshot fixture");
    path
}

const SNAPSHOT: &str = r#"{
    "brokerage": {
        "account": {
            "id": "questrade:Margin",
            "name": "Margin",
            "brokerage": "Questrade",
            "positions": [
                {"symbol": "VFV", "value": 100, "currency": "USD"},
                {"symbol": "XIC", "value": 200, "currency": "CAD"}
            ]
        },
        "message": {"error": null, "info": null}
    }
}"#;

#[test]
fn show_empty_store_no_color_when_piped() {
    let home = setup_temp_home();

    let mut cmd = base_cmd(&home);
    cmd.arg("show");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("No positions tracked yet"))
        .stdout(predicate::str::contains("\u{001b}[").not());
}

#[test]
fn ingest_dry_run_does_not_create_db() {
    let home = setup_temp_home();
    let snapshot = write_snapshot(&home, SNAPSHOT);
    let db_path = home.path().join(".pinsight").join("data.db");
    assert!(!db_path.exists(), "db should start absent");

    let mut cmd = base_cmd(&home);
    cmd.arg("ingest").arg(&snapshot).arg("--dry-run");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Questrade / Margin"))
        .stdout(predicate::str::contains("Dry run"))
        .stdout(predicate::str::contains("\u{001b}[").not());

    assert!(!db_path.exists(), "dry-run should not create db");
}

#[test]
fn ingest_then_show_reports_allocation() {
    let home = setup_temp_home();
    let snapshot = write_snapshot(&home, SNAPSHOT);

    base_cmd(&home)
        .arg("ingest")
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(predicate::str::contains("Snapshot merged"))
        .stdout(predicate::str::contains("Positions tracked: 2"));

    base_cmd(&home)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("Uncategorized"))
        .stdout(predicate::str::contains("300.00"));
}

#[test]
fn currency_and_mapping_change_the_breakdown() {
    let home = setup_temp_home();
    let snapshot = write_snapshot(&home, SNAPSHOT);

    base_cmd(&home).arg("ingest").arg(&snapshot).assert().success();
    base_cmd(&home)
        .args(["currencies", "set", "usd", "1.35"])
        .assert()
        .success()
        .stdout(predicate::str::contains("USD = 1.35"));
    base_cmd(&home)
        .args(["mappings", "set", "vfv", "US Equity"])
        .assert()
        .success();

    base_cmd(&home)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("US Equity"))
        .stdout(predicate::str::contains("135.00"))
        .stdout(predicate::str::contains("335.00 CAD"));
}

#[test]
fn ingest_same_account_twice_replaces_positions() {
    let home = setup_temp_home();
    let snapshot = write_snapshot(&home, SNAPSHOT);

    base_cmd(&home).arg("ingest").arg(&snapshot).assert().success();
    base_cmd(&home)
        .arg("ingest")
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(predicate::str::contains("Positions tracked: 2"));
}

#[test]
fn accounts_list_and_remove() {
    let home = setup_temp_home();
    let snapshot = write_snapshot(&home, SNAPSHOT);
    base_cmd(&home).arg("ingest").arg(&snapshot).assert().success();

    base_cmd(&home)
        .args(["accounts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("questrade:Margin"))
        .stdout(predicate::str::contains("Questrade"));

    base_cmd(&home)
        .args(["accounts", "remove", "questrade:Margin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed account"));

    base_cmd(&home)
        .args(["accounts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No accounts tracked yet"));
}

#[test]
fn unresolved_currency_shows_sentinel_in_list() {
    let home = setup_temp_home();
    let snapshot = write_snapshot(&home, SNAPSHOT);
    base_cmd(&home).arg("ingest").arg(&snapshot).assert().success();

    base_cmd(&home)
        .args(["currencies", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("USD"))
        .stdout(predicate::str::contains("???"));
}

#[test]
fn export_portfolio_writes_csv() {
    let home = setup_temp_home();
    let snapshot = write_snapshot(&home, SNAPSHOT);
    base_cmd(&home).arg("ingest").arg(&snapshot).assert().success();

    let out = home.path().join("portfolio.csv");
    base_cmd(&home)
        .args(["export", "portfolio", "--output"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported to"));

    let csv = std::fs::read_to_string(&out).unwrap();
    assert!(csv.starts_with("Brokerage,Account ID,Account Name,Symbol"));
    assert!(csv.contains("Questrade,questrade:Margin,Margin,VFV,100,USD"));
}

#[test]
fn scrape_error_rejects_snapshot() {
    let home = setup_temp_home();
    let snapshot = write_snapshot(
        &home,
        r#"{"brokerage": {"account": {"id": "x", "name": "x", "positions": []},
            "message": {"error": "Could not read positions table.", "info": null}}}"#,
    );

    base_cmd(&home)
        .arg("ingest")
        .arg(&snapshot)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not read positions table."));

    base_cmd(&home)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("No positions tracked yet"));
}
