// Many threads reading one table, and independent readers over the same file.
use std::fs::File;
use std::sync::Arc;
use std::thread;

use rowstore::api::{BLOCK_SIZE, Cell, Column, ColumnType, RowStore, Schema, Sink, TableWriter};

fn write_table(path: &std::path::Path, rows: usize) -> RowStore {
    let schema = Schema::new(vec![
        Column::new("id", ColumnType::Int),
        Column::new("text", ColumnType::String),
    ]);
    let mut writer = TableWriter::new(schema, Sink::file(path)).expect("writer");
    for i in 0..rows {
        writer
            .add_row(vec![Cell::Int(i as i32), Cell::String("x".repeat(i % 17))])
            .expect("row");
    }
    writer.finish().expect("finish")
}

#[test]
fn shared_table_serves_concurrent_readers() {
    let temp = tempfile::tempdir().expect("tempdir");
    let rows = BLOCK_SIZE * 4 + 3;
    let store = Arc::new(write_table(&temp.path().join("shared.tbl"), rows));

    let mut handles = Vec::new();
    for worker in 0..8usize {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for step in 0..200usize {
                let i = (worker * 7919 + step * 104_729) % rows;
                let row = store.get_row(i).expect("get").expect("row");
                assert_eq!(row.cells[0], Cell::Int(i as i32));
                assert_eq!(row.cells[1], Cell::String("x".repeat(i % 17)));
            }
            let slice = store.get_slice(worker * 100, 50).expect("slice");
            assert_eq!(slice[49].index, worker * 100 + 49);
            let mut count = 0;
            store.for_each(|_| count += 1).expect("iterate");
            assert_eq!(count, rows);
        }));
    }
    for handle in handles {
        handle.join().expect("join");
    }
}

#[test]
fn cloned_readers_scan_independently() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("clone.tbl");
    let rows = BLOCK_SIZE * 2;
    let store = write_table(&path, rows);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let clone = store
            .clone_with(File::open(&path).expect("open"))
            .expect("clone");
        handles.push(thread::spawn(move || {
            clone
                .reduce(|row, sum| sum + row.get::<f32>(0).unwrap_or(0.0), 0.0)
                .expect("reduce")
        }));
    }
    let expected = (0..rows).map(|i| i as f32).sum::<f32>();
    for handle in handles {
        assert_eq!(handle.join().expect("join"), expected);
    }
}
