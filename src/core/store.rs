//! Purpose: Immutable, stream-backed row table with block-indexed random access.
//! Exports: `RowStore`.
//! Role: Core read engine; every derivation reads through these operations.
//! Invariants: All physical seeks and reads happen while holding `cursor`; the lock is
//! never held while caller code runs.
//! Invariants: `index.row_count()` is authoritative; reads past it return fewer rows.
//! Invariants: Schema and index are shared read-only between clones of the same bytes.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::analysis::TableAnalysis;
use crate::core::cell::FromCell;
use crate::core::cursor::{TableCursor, TableStream};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{BLOCK_SIZE, TableOptions, index_path_for};
use crate::core::index::{BlockIndex, BlockIndexBuilder};
use crate::core::row::{Row, read_row, skip_row};
use crate::core::schema::{Column, Schema};

pub struct RowStore {
    schema: Arc<Schema>,
    index: Arc<BlockIndex>,
    data_offset: u64,
    options: TableOptions,
    cursor: Mutex<TableCursor>,
    analysis: OnceCell<Arc<TableAnalysis>>,
}

impl RowStore {
    /// Wraps a data stream and its persisted index stream.
    pub fn open<S, I>(data: S, mut index: I, options: TableOptions) -> Result<Self, Error>
    where
        S: TableStream + 'static,
        I: Read,
    {
        let mut cursor = TableCursor::new(Box::new(data), options.read_buffer)?;
        let schema = Schema::read_from(&mut cursor)?;
        let data_offset = cursor.position();
        let index = BlockIndex::read_from(&mut index)?;
        index.check_bounds(data_offset, cursor.len())?;
        debug!(
            rows = index.row_count(),
            columns = schema.len(),
            blocks = index.offsets().len(),
            "opened table with persisted index"
        );
        Ok(Self::from_parts(cursor, schema, index, data_offset, options))
    }

    /// Builds the block index with one forward skip-decoding pass over the rows.
    pub fn scan<S>(data: S, options: TableOptions) -> Result<Self, Error>
    where
        S: TableStream + 'static,
    {
        let mut cursor = TableCursor::new(Box::new(data), options.read_buffer)?;
        let schema = Schema::read_from(&mut cursor)?;
        let data_offset = cursor.position();
        let mut builder = BlockIndexBuilder::new(data_offset);
        while !cursor.at_end() {
            let start = cursor.position();
            skip_row(&schema, &mut cursor)
                .map_err(|err| err.with_row(builder.row_count() as u64))?;
            if cursor.position() == start {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("trailing bytes after the header but rows of this schema are empty")
                    .with_row(builder.row_count() as u64)
                    .with_offset(start));
            }
            builder.record_row(cursor.position());
        }
        let index = builder.finish()?;
        debug!(
            rows = index.row_count(),
            columns = schema.len(),
            bytes = cursor.len(),
            "rebuilt block index by scanning"
        );
        Ok(Self::from_parts(cursor, schema, index, data_offset, options))
    }

    /// Opens `path`, using `<path>.idx` when present and scanning otherwise.
    pub fn open_path(path: impl AsRef<Path>, options: TableOptions) -> Result<Self, Error> {
        let path = path.as_ref();
        Self::open_path_with_index(path, &index_path_for(path), options)
    }

    pub fn open_path_with_index(
        path: &Path,
        index_path: &Path,
        options: TableOptions,
    ) -> Result<Self, Error> {
        let data = File::open(path).map_err(|err| Error::from_io(err).with_path(path))?;
        let result = match File::open(index_path) {
            Ok(index) => Self::open(data, BufReader::new(index), options),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::scan(data, options),
            Err(err) => return Err(Error::from_io(err).with_path(index_path)),
        };
        result.map_err(|err| err.with_path(path))
    }

    pub(crate) fn from_parts(
        cursor: TableCursor,
        schema: Schema,
        index: BlockIndex,
        data_offset: u64,
        options: TableOptions,
    ) -> Self {
        Self {
            schema: Arc::new(schema),
            index: Arc::new(index),
            data_offset,
            options,
            cursor: Mutex::new(cursor),
            analysis: OnceCell::new(),
        }
    }

    /// Second reader over the same bytes through an independent stream handle.
    ///
    /// Scans on the clone do not contend with scans on `self`.
    pub fn clone_with<S>(&self, stream: S) -> Result<Self, Error>
    where
        S: TableStream + 'static,
    {
        let cursor = TableCursor::new(Box::new(stream), self.options.read_buffer)?;
        self.index.check_bounds(self.data_offset, cursor.len())?;
        let analysis = OnceCell::new();
        if let Some(existing) = self.analysis.get() {
            let _ = analysis.set(Arc::clone(existing));
        }
        Ok(Self {
            schema: Arc::clone(&self.schema),
            index: Arc::clone(&self.index),
            data_offset: self.data_offset,
            options: self.options,
            cursor: Mutex::new(cursor),
            analysis,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn columns(&self) -> &[Column] {
        self.schema.columns()
    }

    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    pub fn row_count(&self) -> usize {
        self.index.row_count()
    }

    pub fn block_index(&self) -> &BlockIndex {
        &self.index
    }

    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    pub fn options(&self) -> TableOptions {
        self.options
    }

    pub fn target_column_index(&self) -> Option<usize> {
        self.schema.target_index()
    }

    /// Re-flags the target column; every other column loses its target flag.
    pub fn with_target_column(mut self, column: usize) -> Result<Self, Error> {
        Arc::make_mut(&mut self.schema).set_target(column)?;
        Ok(self)
    }

    pub fn has_categorical_data(&self) -> bool {
        self.schema.has_categorical_data()
    }

    pub fn write_index_to<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        self.index.write_to(writer)
    }

    /// Copies the data stream verbatim (header and rows).
    pub fn write_data_to<W: Write>(&self, writer: &mut W) -> Result<u64, Error> {
        let mut cursor = self.cursor.lock();
        cursor.seek_to(0)?;
        let copied = std::io::copy(&mut *cursor, writer).map_err(Error::from_io)?;
        writer.flush().map_err(Error::from_io)?;
        Ok(copied)
    }

    /// One seek to the row's block, then at most `BLOCK_SIZE - 1` skips.
    pub fn get_row(&self, row: usize) -> Result<Option<Row>, Error> {
        let Some((offset, skip)) = self.index.locate(row) else {
            return Ok(None);
        };
        let mut cursor = self.cursor.lock();
        cursor.seek_to(offset)?;
        for _ in 0..skip {
            skip_row(&self.schema, &mut cursor).map_err(|err| err.with_row(row as u64))?;
        }
        let row = read_row(&self.schema, &mut *cursor, row)
            .map_err(|err| err.with_row(row as u64))?;
        Ok(Some(row))
    }

    /// Reads each requested row once, however often it is requested.
    ///
    /// Results come back in block order, ascending within each block, with repeated
    /// requests sharing one decoded row. Indices past the end are dropped.
    pub fn get_rows<I>(&self, rows: I) -> Result<Vec<Arc<Row>>, Error>
    where
        I: IntoIterator<Item = usize>,
    {
        let row_count = self.row_count();
        let mut blocks: BTreeMap<usize, BTreeMap<usize, usize>> = BTreeMap::new();
        let mut total = 0usize;
        for row in rows.into_iter().filter(|row| *row < row_count) {
            *blocks
                .entry(row / BLOCK_SIZE)
                .or_default()
                .entry(row)
                .or_insert(0) += 1;
            total += 1;
        }

        let mut out = Vec::with_capacity(total);
        let mut cursor = self.cursor.lock();
        for (block, multiplicity) in &blocks {
            let offset = self.index.block_offset(*block).ok_or_else(|| {
                Error::new(ErrorKind::Corrupt).with_message(format!("missing block {block}"))
            })?;
            cursor.seek_to(offset)?;
            let mut position = block * BLOCK_SIZE;
            for (&row, &count) in multiplicity {
                while position < row {
                    skip_row(&self.schema, &mut cursor)
                        .map_err(|err| err.with_row(position as u64))?;
                    position += 1;
                }
                let decoded = read_row(&self.schema, &mut *cursor, row)
                    .map_err(|err| err.with_row(row as u64))?;
                let decoded = Arc::new(decoded);
                out.extend(std::iter::repeat_n(decoded, count));
                position += 1;
            }
        }
        Ok(out)
    }

    /// Up to `count` consecutive rows starting at `offset`.
    pub fn get_slice(&self, offset: usize, count: usize) -> Result<Vec<Row>, Error> {
        let Some((block_offset, skip)) = self.index.locate(offset) else {
            return Ok(Vec::new());
        };
        let count = count.min(self.row_count() - offset);
        let mut cursor = self.cursor.lock();
        cursor.seek_to(block_offset)?;
        self.read_run(&mut cursor, offset - skip, skip, count)
    }

    fn read_run(
        &self,
        cursor: &mut TableCursor,
        first: usize,
        skip: usize,
        count: usize,
    ) -> Result<Vec<Row>, Error> {
        for i in 0..skip {
            skip_row(&self.schema, cursor).map_err(|err| err.with_row((first + i) as u64))?;
        }
        let start = first + skip;
        let mut rows = Vec::with_capacity(count);
        for row in start..start + count {
            rows.push(read_row(&self.schema, cursor, row).map_err(|err| err.with_row(row as u64))?);
        }
        Ok(rows)
    }

    /// Visits every row in storage order until the callback returns `false`.
    ///
    /// Rows are decoded a block at a time under the stream lock; the callback runs
    /// with the lock released, so it may read from this table again. Other readers
    /// of this instance may interleave their reads between blocks.
    pub fn iterate<F>(&self, mut callback: F) -> Result<(), Error>
    where
        F: FnMut(Row) -> Result<bool, Error>,
    {
        let row_count = self.row_count();
        let mut next = 0usize;
        let mut offset = self.data_offset;
        while next < row_count {
            let batch = BLOCK_SIZE.min(row_count - next);
            let rows = {
                let mut cursor = self.cursor.lock();
                cursor.seek_to(offset)?;
                let rows = self.read_run(&mut cursor, next, 0, batch)?;
                offset = cursor.position();
                rows
            };
            next += batch;
            for row in rows {
                if !callback(row)? {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    pub fn for_each<F>(&self, mut callback: F) -> Result<(), Error>
    where
        F: FnMut(&Row),
    {
        self.iterate(|row| {
            callback(&row);
            Ok(true)
        })
    }

    pub fn for_each_until<F>(&self, mut callback: F) -> Result<(), Error>
    where
        F: FnMut(&Row) -> bool,
    {
        self.iterate(|row| Ok(callback(&row)))
    }

    pub fn map<T, F>(&self, mut mutator: F) -> Result<Vec<T>, Error>
    where
        F: FnMut(&Row) -> T,
    {
        let mut out = Vec::with_capacity(self.row_count());
        self.for_each(|row| out.push(mutator(row)))?;
        Ok(out)
    }

    pub fn reduce<F>(&self, mut reducer: F, initial: f32) -> Result<f32, Error>
    where
        F: FnMut(&Row, f32) -> f32,
    {
        let mut value = initial;
        self.for_each(|row| value = reducer(row, value))?;
        Ok(value)
    }

    /// Mean of `selector` over all rows; NaN for an empty table.
    pub fn average<F>(&self, mut selector: F) -> Result<f32, Error>
    where
        F: FnMut(&Row) -> f32,
    {
        let total = self.reduce(|row, sum| sum + selector(row), 0.0)?;
        Ok(total / self.row_count() as f32)
    }

    pub fn column<T: FromCell>(&self, column: usize) -> Result<Vec<T>, Error> {
        self.schema.check_index(column)?;
        let mut out = Vec::with_capacity(self.row_count());
        self.iterate(|row| {
            out.push(row.get::<T>(column)?);
            Ok(true)
        })?;
        Ok(out)
    }

    /// Column-major numeric copy of the selected columns (all when `None`).
    pub fn numeric_columns(&self, columns: Option<&[usize]>) -> Result<Vec<Vec<f32>>, Error> {
        let columns = self.resolve_columns(columns)?;
        let mut out = vec![Vec::with_capacity(self.row_count()); columns.len()];
        self.iterate(|row| {
            for (slot, &column) in out.iter_mut().zip(&columns) {
                slot.push(row.get::<f32>(column)?);
            }
            Ok(true)
        })?;
        Ok(out)
    }

    /// Row-major numeric copy of the selected columns (all when `None`).
    pub fn numeric_rows(&self, columns: Option<&[usize]>) -> Result<Vec<Vec<f32>>, Error> {
        let columns = self.resolve_columns(columns)?;
        let mut out = Vec::with_capacity(self.row_count());
        self.iterate(|row| {
            let values = columns
                .iter()
                .map(|&column| row.get::<f32>(column))
                .collect::<Result<Vec<_>, _>>()?;
            out.push(values);
            Ok(true)
        })?;
        Ok(out)
    }

    pub fn preview(&self, rows: usize) -> Result<Vec<Row>, Error> {
        self.get_slice(0, rows)
    }

    /// Column statistics, computed by one full scan on first use and then cached.
    pub fn analysis(&self) -> Result<Arc<TableAnalysis>, Error> {
        self.analysis
            .get_or_try_init(|| TableAnalysis::compute(self).map(Arc::new))
            .cloned()
    }

    fn resolve_columns(&self, columns: Option<&[usize]>) -> Result<Vec<usize>, Error> {
        match columns {
            Some(columns) => {
                for &column in columns {
                    self.schema.check_index(column)?;
                }
                Ok(columns.to_vec())
            }
            None => Ok((0..self.column_count()).collect()),
        }
    }
}

impl std::fmt::Debug for RowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStore")
            .field("rows", &self.row_count())
            .field("columns", &self.schema.columns())
            .field("data_offset", &self.data_offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::RowStore;
    use crate::core::cell::Cell;
    use crate::core::error::ErrorKind;
    use crate::core::format::{BLOCK_SIZE, TableOptions};
    use crate::core::schema::{Column, Schema};
    use crate::core::types::ColumnType;
    use crate::core::writer::{Sink, TableWriter};
    use std::io::Cursor;

    fn table(rows: usize) -> RowStore {
        let schema = Schema::new(vec![
            Column::new("id", ColumnType::Int),
            Column::new("name", ColumnType::String),
        ]);
        let mut writer = TableWriter::new(schema, Sink::Memory).expect("writer");
        for i in 0..rows {
            writer
                .add_row(vec![Cell::Int(i as i32), Cell::String(format!("row-{i}"))])
                .expect("row");
        }
        writer.finish().expect("finish")
    }

    fn raw_bytes(rows: usize) -> Vec<u8> {
        let store = table(rows);
        let mut bytes = Vec::new();
        store.write_data_to(&mut bytes).expect("copy bytes");
        bytes
    }

    #[test]
    fn scan_rejects_bytes_after_zero_width_header() {
        for schema in [
            Schema::default(),
            Schema::new(vec![Column::new("nothing", ColumnType::Null)]),
        ] {
            let mut bytes = Vec::new();
            schema.write_to(&mut bytes).expect("header");
            let header = bytes.len() as u64;

            let empty = RowStore::scan(Cursor::new(bytes.clone()), TableOptions::default())
                .expect("header only");
            assert_eq!(empty.row_count(), 0);

            bytes.extend_from_slice(&[1, 2, 3]);
            let err = RowStore::scan(Cursor::new(bytes), TableOptions::default())
                .err()
                .expect("trailing bytes");
            assert_eq!(err.kind(), ErrorKind::Corrupt);
            assert_eq!(err.offset(), Some(header));
        }
    }

    #[test]
    fn random_access_matches_iteration() {
        let store = table(BLOCK_SIZE * 2 + 17);
        let mut seen = Vec::new();
        store.for_each(|row| seen.push(row.clone())).expect("iterate");
        assert_eq!(seen.len(), store.row_count());
        for i in [0, 1, BLOCK_SIZE - 1, BLOCK_SIZE, BLOCK_SIZE + 1, seen.len() - 1] {
            let row = store.get_row(i).expect("get").expect("present");
            assert_eq!(row, seen[i]);
            assert_eq!(row.index, i);
        }
        assert!(store.get_row(seen.len()).expect("get").is_none());
    }

    #[test]
    fn exact_block_size_table_reaches_both_sides_of_boundary() {
        let store = table(BLOCK_SIZE + 1);
        let last_of_first = store.get_row(BLOCK_SIZE - 1).expect("get").expect("row");
        assert_eq!(last_of_first.cells[0], Cell::Int(BLOCK_SIZE as i32 - 1));
        let first_of_second = store.get_row(BLOCK_SIZE).expect("get").expect("row");
        assert_eq!(first_of_second.cells[0], Cell::Int(BLOCK_SIZE as i32));

        let store = table(BLOCK_SIZE);
        assert_eq!(store.block_index().offsets().len(), 2);
        let last = store.get_row(BLOCK_SIZE - 1).expect("get").expect("row");
        assert_eq!(last.cells[0], Cell::Int(BLOCK_SIZE as i32 - 1));
        assert!(store.get_row(BLOCK_SIZE).expect("get").is_none());
    }

    #[test]
    fn duplicate_requests_share_one_decode() {
        let store = table(10);
        let rows = store.get_rows([5, 5, 5, 2]).expect("rows");
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].index, 2);
        assert!(rows[1..].iter().all(|row| row.index == 5));
        assert!(std::sync::Arc::ptr_eq(&rows[1], &rows[3]));
        let five = store.get_row(5).expect("get").expect("row");
        assert_eq!(*rows[2], five);
    }

    #[test]
    fn get_rows_orders_by_block_and_drops_out_of_range() {
        let store = table(BLOCK_SIZE + 10);
        let rows = store
            .get_rows([BLOCK_SIZE + 3, 7, 10_000, 1])
            .expect("rows");
        let indices: Vec<_> = rows.iter().map(|row| row.index).collect();
        assert_eq!(indices, vec![1, 7, BLOCK_SIZE + 3]);
    }

    #[test]
    fn slice_short_reads_at_end() {
        let store = table(5);
        let rows = store.get_slice(3, 10).expect("slice");
        assert_eq!(rows.iter().map(|row| row.index).collect::<Vec<_>>(), vec![3, 4]);
        assert!(store.get_slice(5, 1).expect("slice").is_empty());
    }

    #[test]
    fn scan_and_persisted_index_agree() {
        let bytes = raw_bytes(BLOCK_SIZE * 3);
        let scanned = RowStore::scan(Cursor::new(bytes.clone()), TableOptions::default())
            .expect("scan");
        let mut index = Vec::new();
        scanned.write_index_to(&mut index).expect("index");
        let opened = RowStore::open(
            Cursor::new(bytes),
            index.as_slice(),
            TableOptions::default(),
        )
        .expect("open");
        assert_eq!(opened.block_index(), scanned.block_index());
        assert_eq!(
            opened.get_row(2 * BLOCK_SIZE + 5).expect("get"),
            scanned.get_row(2 * BLOCK_SIZE + 5).expect("get")
        );
    }

    #[test]
    fn truncated_data_is_corrupt() {
        let mut bytes = raw_bytes(3);
        bytes.truncate(bytes.len() - 2);
        let err = RowStore::scan(Cursor::new(bytes), TableOptions::default())
            .expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.row(), Some(2));
    }

    #[test]
    fn callback_may_reenter_the_same_table() {
        let store = table(20);
        let mut pairs = 0;
        store
            .iterate(|row| {
                let again = store.get_row(row.index)?.expect("row");
                assert_eq!(again, row);
                pairs += 1;
                Ok(row.index < 9)
            })
            .expect("iterate");
        assert_eq!(pairs, 10);
    }

    #[test]
    fn clone_with_reads_independently() {
        let bytes = raw_bytes(50);
        let store = RowStore::scan(Cursor::new(bytes.clone()), TableOptions::default())
            .expect("scan");
        let clone = store.clone_with(Cursor::new(bytes)).expect("clone");
        assert_eq!(clone.get_row(42).expect("get"), store.get_row(42).expect("get"));

        let err = store
            .clone_with(Cursor::new(vec![0u8; 4]))
            .expect_err("too short");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn numeric_helpers() {
        let store = table(4);
        assert_eq!(store.column::<i32>(0).expect("column"), vec![0, 1, 2, 3]);
        assert_eq!(
            store.numeric_columns(Some(&[0][..])).expect("columns"),
            vec![vec![0.0, 1.0, 2.0, 3.0]]
        );
        assert_eq!(store.numeric_rows(Some(&[0][..])).expect("rows")[3], vec![3.0]);
        assert_eq!(
            store.average(|row| row.get::<f32>(0).unwrap_or(0.0)).expect("avg"),
            1.5
        );
        assert!(store.numeric_rows(None).is_err());
        assert_eq!(store.column::<i32>(7).expect_err("range").kind(), ErrorKind::Usage);
    }

    #[test]
    fn target_column_can_be_moved() {
        let store = table(1);
        assert_eq!(store.target_column_index(), Some(1));
        let store = store.with_target_column(0).expect("target");
        assert_eq!(store.target_column_index(), Some(0));
        assert!(store.columns()[0].is_target);
    }
}
