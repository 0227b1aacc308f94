//! CLI integration tests
//!
//! Runs the `sheetkit` binary through assert_cmd.

#![allow(deprecated)] // Command::cargo_bin deprecation - no stable replacement yet

use assert_cmd::Command;
use predicates::prelude::*;
use royalbit_sheetkit::excel::{ExcelImporter, FastMaterializer, StyleScope, TableMaterializer};
use royalbit_sheetkit::Table;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sheetkit() -> Command {
    let mut cmd = Command::cargo_bin("sheetkit").unwrap();
    cmd.env_remove("SHEETKIT_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn write_book(path: &Path, table: &Table) {
    let mut m: Box<dyn TableMaterializer> = Box::new(FastMaterializer::new());
    m.add_sheet("Sheet1", table, &StyleScope::None).unwrap();
    m.commit(path).unwrap();
}

fn sales(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("sales.xlsx");
    write_book(
        &path,
        &Table::from_strings(
            &["Name", "Date", "Code"],
            &[
                &["Alice", "2023-01-01", "X"],
                &["Bob", "2023/01/01", "X\nY"],
                &["Carol", "2023-01-02", "Z"],
            ],
        ),
    );
    path
}

// ═══════════════════════════════════════════════════════════════════════════
// HELP AND VERSION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cli_help() {
    sheetkit()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sheetkit"))
        .stdout(predicate::str::contains("COMMANDS"));
}

#[test]
fn test_cli_version() {
    sheetkit()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sheetkit"));
}

#[test]
fn test_subcommand_help() {
    for sub in ["group", "lookup", "columns"] {
        sheetkit().args([sub, "--help"]).assert().success();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_columns_command() {
    let dir = TempDir::new().unwrap();
    let input = sales(&dir);
    sheetkit()
        .arg("columns")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Name"))
        .stdout(predicate::str::contains("Detected date column"));
}

#[test]
fn test_group_default_output_name() {
    let dir = TempDir::new().unwrap();
    let input = sales(&dir);
    sheetkit()
        .arg("group")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Done"));

    // Source sheet is kept first unless --no-keep-original
    let output = dir.path().join("sales_date_classified.xlsx");
    let first = ExcelImporter::new(&output).read_first_sheet().unwrap();
    assert_eq!(first.name, "Sheet1");
    assert_eq!(first.table.row_count(), 3);
}

#[test]
fn test_group_no_keep_original() {
    let dir = TempDir::new().unwrap();
    let input = sales(&dir);
    let output = dir.path().join("dates_only.xlsx");
    sheetkit()
        .args(["group", "--no-keep-original", "-o"])
        .arg(&output)
        .arg(&input)
        .assert()
        .success();

    let first = ExcelImporter::new(&output).read_first_sheet().unwrap();
    assert_eq!(first.name, "2023-01-01");
    assert_eq!(first.table.header, vec!["Name", "Code"]);
}

#[test]
fn test_group_merge_on_whole_date() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("tags.xlsx");
    write_book(
        &input,
        &Table::from_strings(&["Date", "Tag"], &[&["2023-01-01", "X"], &["2023-01-01", "Y"]]),
    );
    let output = dir.path().join("merged.xlsx");

    // Bare --merge-on: one row per date
    sheetkit()
        .args(["group", "--no-keep-original", "-o"])
        .arg(&output)
        .arg(&input)
        .arg("--merge-on")
        .assert()
        .success();

    let first = ExcelImporter::new(&output).read_first_sheet().unwrap();
    assert_eq!(first.table.row_count(), 1);
    assert_eq!(first.table.cell(0, 0).to_string(), "X\nY");
}

#[test]
fn test_group_merge_on_named_column() {
    let dir = TempDir::new().unwrap();
    let input = sales(&dir);
    let output = dir.path().join("by_code.xlsx");

    sheetkit()
        .args(["group", "--no-keep-original", "--merge-on", "Code", "-o"])
        .arg(&output)
        .arg(&input)
        .assert()
        .success();

    // Alice (X) and Bob (X\nY) differ on Code, so both stay
    let first = ExcelImporter::new(&output).read_first_sheet().unwrap();
    assert_eq!(first.table.row_count(), 2);
}

#[test]
fn test_group_json_summary() {
    let dir = TempDir::new().unwrap();
    let input = sales(&dir);
    let output = dir.path().join("out.xlsx");
    let assert = sheetkit()
        .args(["group", "--json", "--no-keep-original", "-c", "Date", "-f", "YYYY年MM月DD日"])
        .args(["--mode", "styled", "-o"])
        .arg(&output)
        .arg(&input)
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["status"]["state"], "completed");
    assert_eq!(summary["groups"], 2);
    assert_eq!(summary["tool"], "group");

    let first = ExcelImporter::new(&output).read_first_sheet().unwrap();
    assert_eq!(first.name, "2023年01月01日");
}

#[test]
fn test_group_missing_column_fails() {
    let dir = TempDir::new().unwrap();
    let input = sales(&dir);
    sheetkit()
        .args(["group", "-c", "When"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("When"));
    assert!(!dir.path().join("sales_date_classified.xlsx").exists());
}

#[test]
fn test_group_rejects_non_spreadsheet() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("notes.txt");
    std::fs::write(&input, "hello").unwrap();
    sheetkit()
        .arg("group")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a spreadsheet file"));
}

#[test]
fn test_lookup_command() {
    let dir = TempDir::new().unwrap();
    let primary = sales(&dir);
    let reference = dir.path().join("codes.xlsx");
    write_book(
        &reference,
        &Table::from_strings(&["Code", "Label"], &[&["X", "10"], &["Y", "20"]]),
    );
    let output = dir.path().join("joined.xlsx");

    sheetkit()
        .arg("lookup")
        .arg(&primary)
        .arg(&reference)
        .args(["--lookup-column", "Code", "--search-column", "Code", "--result-column", "Label"])
        .args(["--target-column", "Code", "-o"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Matched"));

    let sheet = ExcelImporter::new(&output).read_first_sheet().unwrap();
    assert_eq!(sheet.table.header, vec!["Name", "Date", "Code"]);
    let codes: Vec<String> = (0..3).map(|r| sheet.table.cell(r, 2).to_string()).collect();
    assert_eq!(codes, vec!["10", "10\n20", "-"]);
}

#[test]
fn test_config_file_applies() {
    let dir = TempDir::new().unwrap();
    let input = sales(&dir);
    let config = dir.path().join("sheetkit.yaml");
    std::fs::write(
        &config,
        "date_format: YYYY/MM/DD\nkeep_key_column: true\nkeep_original: false\n",
    )
    .unwrap();
    let output = dir.path().join("configured.xlsx");

    sheetkit()
        .args(["group", "--json", "-o"])
        .arg(&output)
        .arg("--config")
        .arg(&config)
        .arg(&input)
        .assert()
        .success();

    let first = ExcelImporter::new(&output).read_first_sheet().unwrap();
    assert_eq!(first.name, "2023_01_01");
    assert_eq!(first.table.header, vec!["Name", "Date", "Code"]);
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let input = sales(&dir);
    let config = dir.path().join("bad.yaml");
    std::fs::write(&config, "batch_size: 0\n").unwrap();
    sheetkit()
        .arg("group")
        .arg(&input)
        .env("SHEETKIT_CONFIG", &config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_size"));
}
