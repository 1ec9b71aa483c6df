//! Purpose: Centralize on-disk layout constants and table open options.
//! Exports: `BLOCK_SIZE`, `TableOptions`, `index_path_for`.
//! Role: Shared policy for the data/index stream pair across open, scan, and write paths.
//! Invariants: `BLOCK_SIZE` is baked into every persisted index; never change it.
//! Invariants: The index stream carries no block size, so readers assume this constant.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const BLOCK_SIZE: usize = 1024;

pub const INDEX_EXTENSION: &str = "idx";

pub const DEFAULT_READ_BUFFER: usize = 64 * 1024;
pub const DEFAULT_MAX_DISTINCT: usize = 1024;

/// Ticks (100ns units) between 0001-01-01 and the unix epoch.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;
pub const NANOS_PER_TICK: i128 = 100;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TableOptions {
    pub read_buffer: usize,
    pub max_distinct: usize,
}

impl TableOptions {
    pub fn new() -> Self {
        Self {
            read_buffer: DEFAULT_READ_BUFFER,
            max_distinct: DEFAULT_MAX_DISTINCT,
        }
    }

    pub fn with_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer = bytes.max(1);
        self
    }

    pub fn with_max_distinct(mut self, count: usize) -> Self {
        self.max_distinct = count;
        self
    }
}

impl Default for TableOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// `data.tbl` -> `data.tbl.idx`.
pub fn index_path_for(data_path: &Path) -> PathBuf {
    let mut name = data_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".");
    name.push(INDEX_EXTENSION);
    data_path.with_file_name(name)
}
