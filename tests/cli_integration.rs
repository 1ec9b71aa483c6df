// CLI integration tests driving the built binary against tables written by the library.
use std::path::{Path, PathBuf};
use std::process::Command;

use rowstore::api::{
    Cell, Column, ColumnType, RowStore, Schema, Sink, TableOptions, TableWriter, index_path_for,
};
use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_rowstore");
    Command::new(exe)
}

fn parse_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("valid json")
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}

fn write_table(dir: &Path, rows: usize) -> PathBuf {
    let path = dir.join("input.tbl");
    let schema = Schema::new(vec![
        Column::new("id", ColumnType::Int),
        Column::new("x", ColumnType::Double),
        Column::new("label", ColumnType::String),
    ]);
    let mut writer = TableWriter::new(schema, Sink::file(&path)).expect("writer");
    for i in 0..rows {
        writer
            .add_row(vec![
                Cell::Int(i as i32),
                Cell::Double(i as f64 * 2.0),
                Cell::String(format!("c{}", i % 3)),
            ])
            .expect("row");
    }
    writer.finish().expect("finish");
    path
}

#[test]
fn info_reports_schema_and_rows() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table = write_table(temp.path(), 10);

    let info = cmd()
        .args(["info", path_arg(&table), "--analysis"])
        .output()
        .expect("info");
    assert!(info.status.success());
    let value = parse_json(&info.stdout);
    assert_eq!(value["rows"], 10);
    assert_eq!(value["columns"][1]["type"], "double");
    assert_eq!(value["columns"][2]["name"], "label");
    assert_eq!(value["target_column"], 2);
    assert_eq!(value["analysis"]["columns"][2]["distinct"], 3);
    assert_eq!(value["analysis"]["columns"][1]["numeric"]["max"], 18.0);
}

#[test]
fn get_and_slice_return_rows() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table = write_table(temp.path(), 10);

    let get = cmd()
        .args(["get", path_arg(&table), "7", "2", "7"])
        .output()
        .expect("get");
    assert!(get.status.success());
    let value = parse_json(&get.stdout);
    let rows = value["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["index"], 2);
    assert_eq!(rows[1]["cells"][0], 7);
    assert_eq!(rows[2]["cells"][2], "c1");

    let slice = cmd()
        .args(["slice", path_arg(&table), "--offset", "8", "--count", "5"])
        .output()
        .expect("slice");
    assert!(slice.status.success());
    let value = parse_json(&slice.stdout);
    let rows = value["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["index"], 9);
}

#[test]
fn reindex_rebuilds_a_deleted_index() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table = write_table(temp.path(), 3000);
    let index = index_path_for(&table);
    let original = std::fs::read(&index).expect("index");
    std::fs::remove_file(&index).expect("remove");

    let reindex = cmd()
        .args(["reindex", path_arg(&table)])
        .output()
        .expect("reindex");
    assert!(reindex.status.success());
    let value = parse_json(&reindex.stdout);
    assert_eq!(value["rows"], 3000);
    assert_eq!(value["blocks"], 3);
    assert_eq!(std::fs::read(&index).expect("index"), original);
}

#[test]
fn split_writes_both_tables() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table = write_table(temp.path(), 50);
    let train = temp.path().join("train.tbl");
    let test = temp.path().join("test.tbl");

    let split = cmd()
        .args([
            "split",
            path_arg(&table),
            "--train",
            path_arg(&train),
            "--test",
            path_arg(&test),
            "--fraction",
            "0.7",
            "--seed",
            "3",
        ])
        .output()
        .expect("split");
    assert!(split.status.success());
    let value = parse_json(&split.stdout);
    assert_eq!(value["training"]["rows"], 35);
    assert_eq!(value["test"]["rows"], 15);

    let train = RowStore::open_path(&train, TableOptions::default()).expect("open");
    assert_eq!(train.row_count(), 35);
    assert!(index_path_for(&test).exists());
}

#[test]
fn fold_bag_select_and_normalise() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table = write_table(temp.path(), 12);

    let folds_dir = temp.path().join("folds");
    let fold = cmd()
        .args([
            "fold",
            path_arg(&table),
            "-k",
            "3",
            "--output-dir",
            path_arg(&folds_dir),
            "--seed",
            "1",
        ])
        .output()
        .expect("fold");
    assert!(fold.status.success());
    let value = parse_json(&fold.stdout);
    let folds = value["folds"].as_array().expect("folds");
    assert_eq!(folds.len(), 3);
    assert_eq!(folds[2]["validation"]["rows"], 4);
    assert!(folds_dir.join("fold-1-training.tbl").exists());

    let bagged = temp.path().join("bag.tbl");
    let bag = cmd()
        .args(["bag", path_arg(&table), "--output", path_arg(&bagged), "--count", "30"])
        .output()
        .expect("bag");
    assert!(bag.status.success());
    assert_eq!(parse_json(&bag.stdout)["output"]["rows"], 30);

    let selected = temp.path().join("select.tbl");
    let select = cmd()
        .args([
            "select",
            path_arg(&table),
            "--columns",
            "2,0",
            "--output",
            path_arg(&selected),
        ])
        .output()
        .expect("select");
    assert!(select.status.success());
    let selected = RowStore::open_path(&selected, TableOptions::default()).expect("open");
    assert_eq!(selected.columns()[0].name, "label");

    let normalised = temp.path().join("norm.tbl");
    let model = temp.path().join("model.json");
    let normalise = cmd()
        .args([
            "normalise",
            path_arg(&table),
            "--output",
            path_arg(&normalised),
            "--type",
            "feature-scale",
            "--model-out",
            path_arg(&model),
        ])
        .output()
        .expect("normalise");
    assert!(normalise.status.success());
    let value = parse_json(&normalise.stdout);
    assert_eq!(value["model"]["normalisation_type"], "feature_scale");
    let normalised = RowStore::open_path(&normalised, TableOptions::default()).expect("open");
    assert_eq!(normalised.column::<f64>(1).expect("x")[11], 1.0);

    let reapplied = temp.path().join("again.tbl");
    let again = cmd()
        .args([
            "normalise",
            path_arg(&table),
            "--output",
            path_arg(&reapplied),
            "--model",
            path_arg(&model),
        ])
        .output()
        .expect("normalise with model");
    assert!(again.status.success());
}

#[test]
fn errors_are_json_with_exit_codes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("missing.tbl");

    let info = cmd()
        .args(["info", path_arg(&missing)])
        .output()
        .expect("info");
    assert_eq!(info.status.code(), Some(3));
    let value = parse_json(&info.stderr);
    assert_eq!(value["error"]["kind"], "NotFound");
    assert!(value["error"]["path"].as_str().expect("path").ends_with("missing.tbl"));

    let table = write_table(temp.path(), 4);
    let bad = cmd()
        .args([
            "split",
            path_arg(&table),
            "--train",
            path_arg(&temp.path().join("a.tbl")),
            "--test",
            path_arg(&temp.path().join("b.tbl")),
            "--fraction",
            "1.5",
        ])
        .output()
        .expect("split");
    assert_eq!(bad.status.code(), Some(2));
    assert_eq!(parse_json(&bad.stderr)["error"]["kind"], "Usage");

    let unknown = cmd().args(["frobnicate"]).output().expect("unknown");
    assert_eq!(unknown.status.code(), Some(2));
}

#[test]
fn corrupt_table_reports_row_and_hint() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table = write_table(temp.path(), 5);
    std::fs::remove_file(index_path_for(&table)).expect("remove index");
    let bytes = std::fs::read(&table).expect("read");
    std::fs::write(&table, &bytes[..bytes.len() - 3]).expect("truncate");

    let info = cmd()
        .args(["info", path_arg(&table)])
        .output()
        .expect("info");
    assert_eq!(info.status.code(), Some(7));
    let value = parse_json(&info.stderr);
    assert_eq!(value["error"]["kind"], "Corrupt");
    assert_eq!(value["error"]["row"], 4);
    assert!(value["error"]["hint"].as_str().is_some());
}
