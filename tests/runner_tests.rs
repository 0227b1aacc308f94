//! Run controller: full pipelines, state machine, cancellation

use pretty_assertions::assert_eq;
use royalbit_sheetkit::core::dates::DateFormat;
use royalbit_sheetkit::core::lookup::{JoinOptions, ResultColumn};
use royalbit_sheetkit::core::GroupOptions;
use royalbit_sheetkit::excel::{
    ExcelImporter, FastMaterializer, OutputMode, StyleScope, TableMaterializer,
};
use royalbit_sheetkit::runner::{
    CancelToken, GroupJob, Job, LookupJob, ProgressEvent, RunController, RunRequest, RunStatus,
    Tool,
};
use royalbit_sheetkit::{CellValue, SheetError, Table};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_book(path: &Path, table: &Table) {
    let mut m: Box<dyn TableMaterializer> = Box::new(FastMaterializer::new());
    m.add_sheet("Data", table, &StyleScope::None).unwrap();
    m.commit(path).unwrap();
}

fn orders(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("orders.xlsx");
    let table = Table::from_strings(
        &["订单日期", "SKU", "Qty"],
        &[
            &["2023-01-02", "A", "1"],
            &["2023-01-01", "A\nB", "2"],
            &["2023/01/02", "A", "1"],
            &["oops", "C", "9"],
        ],
    );
    write_book(&path, &table);
    path
}

/// `rows` rows spread over 30 serial dates
fn big_book(path: &Path, rows: usize) {
    let mut table = Table::new(vec!["Date".into(), "N".into()]);
    for i in 0..rows {
        table.add_row(vec![
            CellValue::Number(44927.0 + (i % 30) as f64),
            CellValue::Number(i as f64),
        ]);
    }
    write_book(path, &table);
}

fn group_request(input: PathBuf, output: PathBuf) -> RunRequest {
    RunRequest::new(Job::Group(GroupJob {
        input,
        output,
        key_column: None,
        options: GroupOptions {
            date_format: DateFormat::IsoSlash,
            ..Default::default()
        },
        keep_original: true,
    }))
}

#[test]
fn test_group_run_completes() {
    let dir = TempDir::new().unwrap();
    let input = orders(&dir);
    let output = dir.path().join("grouped.xlsx");

    let controller = RunController::new();
    let handle = controller.start(group_request(input, output.clone())).unwrap();
    let events: Vec<ProgressEvent> = handle.events().iter().collect();
    let summary = handle.join();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.tool, Tool::Group);
    assert_eq!(summary.output, Some(output.clone()));
    assert_eq!(summary.groups, 2);
    assert_eq!(summary.invalid_rows, 1);
    assert_eq!(summary.merged_rows, 1);
    assert_eq!(summary.rows_scanned, 4);
    // original + two dates
    assert_eq!(summary.sheets, 3);

    assert!(matches!(events.first(), Some(ProgressEvent::Stage(_))));
    assert!(matches!(events.last(), Some(ProgressEvent::Finished(s)) if *s == summary));
    assert_eq!(
        events.iter().filter(|e| matches!(e, ProgressEvent::Finished(_))).count(),
        1
    );
    assert!(!controller.is_running());

    // Original sheet comes first and keeps its name
    let first = ExcelImporter::new(&output).read_first_sheet().unwrap();
    assert_eq!(first.name, "Data");
    assert_eq!(first.table.row_count(), 4);
}

#[test]
fn test_lookup_run_completes() {
    let dir = TempDir::new().unwrap();
    let primary = orders(&dir);
    let reference = dir.path().join("products.xlsx");
    write_book(
        &reference,
        &Table::from_strings(&["Code", "Name"], &[&["A", "Apple"], &["B", "Banana"]]),
    );
    let output = dir.path().join("joined.xlsx");

    let request = RunRequest {
        mode: OutputMode::Styled,
        ..RunRequest::new(Job::Lookup(LookupJob {
            primary,
            reference,
            output: output.clone(),
            lookup_column: "SKU".into(),
            search_column: "Code".into(),
            result_column: "Name".into(),
            join: JoinOptions {
                not_found: "N/A".into(),
                target: ResultColumn::Append("Product".into()),
            },
        }))
    };
    let summary = RunController::new().start(request).unwrap().join();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.matched, 4);
    assert_eq!(summary.not_found, 1);

    let sheet = ExcelImporter::new(&output).read_first_sheet().unwrap();
    assert_eq!(sheet.table.header, vec!["订单日期", "SKU", "Qty", "Product"]);
    let products: Vec<String> = (0..4).map(|r| sheet.table.cell(r, 3).to_string()).collect();
    assert_eq!(products, vec!["Apple", "Apple\nBanana", "Apple", "N/A"]);
}

#[test]
fn test_second_start_while_running_is_busy() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("big.xlsx");
    big_book(&input, 20_000);

    let controller = RunController::new();
    let handle = controller
        .start(group_request(input.clone(), dir.path().join("a.xlsx")))
        .unwrap();
    assert!(controller.is_running());

    let second = controller.start(group_request(input, dir.path().join("b.xlsx")));
    assert!(matches!(second, Err(SheetError::Busy)));

    handle.cancel();
    let summary = handle.join();
    assert_ne!(summary.status, RunStatus::Completed);
    assert!(!controller.is_running());
    assert!(!dir.path().join("a.xlsx").exists());
    assert!(!dir.path().join("b.xlsx").exists());
}

#[test]
fn test_cancel_mid_scan_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("big.xlsx");
    big_book(&input, 5_000);
    let output = dir.path().join("mid.xlsx");

    let request = RunRequest {
        batch_size: 1,
        ..group_request(input, output.clone())
    };
    let controller = RunController::new();
    let handle = controller.start(request).unwrap();

    // Scan has started once the first row batch is reported
    let mut events = Vec::new();
    for event in handle.events().iter() {
        let scanning = matches!(event, ProgressEvent::Rows { .. });
        events.push(event);
        if scanning {
            break;
        }
    }
    assert!(matches!(events.last(), Some(ProgressEvent::Rows { .. })));
    handle.cancel();
    events.extend(handle.events().iter());
    let summary = handle.join();

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.output, None);
    assert!(!output.exists());
    assert!(matches!(events.last(), Some(ProgressEvent::Finished(s)) if *s == summary));
    assert_eq!(
        events.iter().filter(|e| matches!(e, ProgressEvent::Finished(_))).count(),
        1
    );
    assert!(!controller.is_running());
}

#[test]
fn test_cancelled_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = orders(&dir);
    let output = dir.path().join("cancelled.xlsx");

    let token = CancelToken::new();
    token.cancel();
    let handle = RunController::new()
        .start_with(group_request(input, output.clone()), token)
        .unwrap();
    let events: Vec<ProgressEvent> = handle.events().iter().collect();
    let summary = handle.join();

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.output, None);
    assert!(!output.exists());
    assert!(matches!(events.last(), Some(ProgressEvent::Finished(_))));
}

#[test]
fn test_failed_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = orders(&dir);
    let output = dir.path().join("failed.xlsx");

    let mut request = group_request(input, output.clone());
    if let Job::Group(job) = &mut request.job {
        job.key_column = Some("Missing".into());
    }
    let summary = RunController::new().start(request).unwrap().join();

    match summary.status {
        RunStatus::Failed(message) => assert!(message.contains("Missing"), "{message}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!output.exists());
}

#[test]
fn test_output_over_input_rejected() {
    let dir = TempDir::new().unwrap();
    let input = orders(&dir);
    let summary = RunController::new()
        .start(group_request(input.clone(), input.clone()))
        .unwrap()
        .join();
    assert!(matches!(summary.status, RunStatus::Failed(_)));
    // Input untouched
    let sheet = ExcelImporter::new(&input).read_first_sheet().unwrap();
    assert_eq!(sheet.table.row_count(), 4);
}

#[test]
fn test_polling_consumer_sees_finished_last() {
    let dir = TempDir::new().unwrap();
    let input = orders(&dir);
    let handle = RunController::new()
        .start(group_request(input, dir.path().join("polled.xlsx")))
        .unwrap();

    let mut events = Vec::new();
    while !handle.is_finished() {
        events.extend(handle.try_events());
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    events.extend(handle.try_events());
    let summary = handle.join();

    assert_eq!(summary.status, RunStatus::Completed);
    assert!(matches!(events.last(), Some(ProgressEvent::Finished(s)) if *s == summary));
}

#[test]
fn test_controller_reusable_after_run() {
    let dir = TempDir::new().unwrap();
    let input = orders(&dir);
    let controller = RunController::new();
    for name in ["one.xlsx", "two.xlsx"] {
        let summary = controller
            .start(group_request(input.clone(), dir.path().join(name)))
            .unwrap()
            .join();
        assert_eq!(summary.status, RunStatus::Completed);
    }
}
