//! Purpose: Serialize a row stream into a new, independent table.
//! Exports: `TableWriter`, `Sink`.
//! Role: Output side of every derivation; builds the block index while writing.
//! Invariants: A row is encoded fully in memory before any of it reaches the sink.
//! Invariants: File sinks hold an exclusive advisory lock until `finish`.
//! Invariants: A file sink removes any existing index for its path once locked; the new
//! index is written only by `finish`.
//! Invariants: Rows must occupy at least one byte so the stream can be re-scanned.
//! Invariants: The finished table is returned only after every row has been written.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use libc::{EACCES, EPERM};
use tracing::debug;

use crate::core::cell::{Cell, write_cell};
use crate::core::cursor::TableCursor;
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{TableOptions, index_path_for};
use crate::core::index::BlockIndexBuilder;
use crate::core::row::Row;
use crate::core::schema::{Column, Schema};
use crate::core::store::RowStore;
use crate::core::types::ColumnType;

/// Where a new table's bytes go.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Sink {
    /// Ephemeral table held in memory.
    Memory,
    File {
        data: PathBuf,
        index: Option<PathBuf>,
    },
}

impl Sink {
    /// File sink with the index persisted next to it as `<path>.idx`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let data = path.into();
        let index = Some(index_path_for(&data));
        Sink::File { data, index }
    }

    pub fn file_without_index(path: impl Into<PathBuf>) -> Self {
        Sink::File {
            data: path.into(),
            index: None,
        }
    }
}

enum Output {
    Memory(io::Cursor<Vec<u8>>),
    File { file: File, path: PathBuf },
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Memory(cursor) => cursor.write(buf),
            Output::File { file, .. } => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Memory(cursor) => cursor.flush(),
            Output::File { file, .. } => file.flush(),
        }
    }
}

struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub struct TableWriter {
    schema: Schema,
    options: TableOptions,
    out: CountingWriter<BufWriter<Output>>,
    index_path: Option<PathBuf>,
    index: Option<BlockIndexBuilder>,
    data_offset: u64,
    scratch: Vec<u8>,
}

impl TableWriter {
    pub fn new(schema: Schema, sink: Sink) -> Result<Self, Error> {
        Self::with_options(schema, sink, TableOptions::default())
    }

    /// Writer whose columns are declared later with `add_column`.
    pub fn untyped(sink: Sink) -> Result<Self, Error> {
        Self::new(Schema::default(), sink)
    }

    pub fn with_options(schema: Schema, sink: Sink, options: TableOptions) -> Result<Self, Error> {
        let (output, index_path) = match sink {
            Sink::Memory => (Output::Memory(io::Cursor::new(Vec::new())), None),
            Sink::File { data, index } => (open_locked(&data, index.as_deref())?, index),
        };
        Ok(Self {
            schema,
            options,
            out: CountingWriter {
                inner: BufWriter::new(output),
                written: 0,
            },
            index_path,
            index: None,
            data_offset: 0,
            scratch: Vec::new(),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.index.as_ref().map_or(0, BlockIndexBuilder::row_count)
    }

    /// Only valid before the first row; the header is written with the first row.
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        column_type: ColumnType,
        is_target: bool,
    ) -> Result<(), Error> {
        if self.index.is_some() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("columns cannot be added after rows have been written"));
        }
        self.schema
            .push(Column::new(name, column_type).target(is_target));
        Ok(())
    }

    pub fn add_row<C: AsRef<[Cell]>>(&mut self, cells: C) -> Result<(), Error> {
        let cells = cells.as_ref();
        let row = self.row_count() as u64;
        if self.schema.is_zero_width() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("rows need at least one column with a stored type")
                .with_hint("Null and unknown-tag columns encode to zero bytes.")
                .with_row(row));
        }
        if cells.len() != self.schema.len() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "row has {} cells but the table has {} columns",
                    cells.len(),
                    self.schema.len()
                ))
                .with_row(row));
        }
        self.scratch.clear();
        for (column, cell) in self.schema.columns().iter().zip(cells) {
            write_cell(column.column_type, cell, &mut self.scratch).map_err(|err| {
                let message = format!(
                    "column {}: {}",
                    column.name,
                    err.message().unwrap_or("encode failed")
                );
                Error::new(err.kind()).with_message(message).with_row(row)
            })?;
        }
        self.ensure_header()?;
        self.out
            .write_all(&self.scratch)
            .map_err(Error::from_io)?;
        let end = self.out.written;
        if let Some(index) = &mut self.index {
            index.record_row(end);
        }
        Ok(())
    }

    pub fn process(&mut self, row: &Row) -> Result<(), Error> {
        self.add_row(&row.cells)
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.ensure_header()?;
        self.out.flush().map_err(Error::from_io)
    }

    /// Finalizes the bytes and reopens them as a table with the index built here.
    pub fn finish(mut self) -> Result<RowStore, Error> {
        self.flush()?;
        let index = self
            .index
            .take()
            .ok_or_else(|| Error::new(ErrorKind::Internal).with_message("header never written"))?
            .finish()?;
        let output = self.out.inner.into_inner().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to flush table output")
                .with_source(err.into_error())
        })?;
        let stream: Box<dyn crate::core::cursor::TableStream> = match output {
            Output::Memory(mut cursor) => {
                cursor.set_position(0);
                Box::new(cursor)
            }
            Output::File { mut file, path } => {
                file.sync_data()
                    .map_err(|err| Error::from_io(err).with_path(&path))?;
                if let Some(index_path) = &self.index_path {
                    write_index_file(index_path, &index)?;
                }
                FileExt::unlock(&file).map_err(|err| lock_error(err, &path))?;
                file.seek(SeekFrom::Start(0))
                    .map_err(|err| Error::from_io(err).with_path(&path))?;
                Box::new(file)
            }
        };
        debug!(
            rows = index.row_count(),
            columns = self.schema.len(),
            bytes = self.out.written,
            "finished table"
        );
        let cursor = TableCursor::new(stream, self.options.read_buffer)?;
        Ok(RowStore::from_parts(
            cursor,
            self.schema,
            index,
            self.data_offset,
            self.options,
        ))
    }

    fn ensure_header(&mut self) -> Result<(), Error> {
        if self.index.is_some() {
            return Ok(());
        }
        self.schema.write_to(&mut self.out)?;
        self.data_offset = self.out.written;
        self.index = Some(BlockIndexBuilder::new(self.data_offset));
        Ok(())
    }
}

fn open_locked(path: &Path, index: Option<&Path>) -> Result<Output, Error> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|err| Error::from_io(err).with_path(path))?;
    file.try_lock_exclusive()
        .map_err(|err| lock_error(err, path))?;
    remove_stale_index(&index_path_for(path))?;
    if let Some(index) = index {
        remove_stale_index(index)?;
    }
    file.set_len(0)
        .map_err(|err| Error::from_io(err).with_path(path))?;
    Ok(Output::File {
        file,
        path: path.to_path_buf(),
    })
}

fn remove_stale_index(path: &Path) -> Result<(), Error> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale index");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::from_io(err).with_path(path)),
    }
}

fn write_index_file(path: &Path, index: &crate::core::index::BlockIndex) -> Result<(), Error> {
    let file = File::create(path).map_err(|err| Error::from_io(err).with_path(path))?;
    let mut writer = BufWriter::new(file);
    index
        .write_to(&mut writer)
        .map_err(|err| err.with_path(path))
}

fn lock_error(err: io::Error, path: &Path) -> Error {
    Error::new(lock_error_kind(&err))
        .with_message("table output is locked by another writer")
        .with_path(path)
        .with_source(err)
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::WouldBlock => ErrorKind::Busy,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}
