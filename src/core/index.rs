// Sparse block index: one stream offset per `BLOCK_SIZE` rows.
use std::io::{Read, Write};

use crate::core::error::{Error, ErrorKind};
use crate::core::format::BLOCK_SIZE;
use crate::core::wire::{WireRead, WireWrite};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockIndex {
    row_count: usize,
    offsets: Vec<u64>,
}

impl BlockIndex {
    pub fn new(row_count: usize, offsets: Vec<u64>) -> Result<Self, Error> {
        if offsets.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("block offsets are not strictly increasing"));
        }
        if offsets.len() < row_count.div_ceil(BLOCK_SIZE) {
            return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
                "{} block offsets cannot cover {row_count} rows",
                offsets.len()
            )));
        }
        Ok(Self { row_count, offsets })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn block_offset(&self, block: usize) -> Option<u64> {
        self.offsets.get(block).copied()
    }

    /// Start offset of the row's block and how many rows to skip within it.
    pub fn locate(&self, row: usize) -> Option<(u64, usize)> {
        if row >= self.row_count {
            return None;
        }
        let offset = self.block_offset(row / BLOCK_SIZE)?;
        Some((offset, row % BLOCK_SIZE))
    }

    /// Checks the index against the data stream it claims to describe.
    pub fn check_bounds(&self, data_offset: u64, stream_len: u64) -> Result<(), Error> {
        if let Some(&first) = self.offsets.first() {
            if first != data_offset {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("first block does not start at the data offset")
                    .with_offset(first));
            }
        }
        if let Some(&last) = self.offsets.last() {
            if last > stream_len {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("block offset beyond end of data stream")
                    .with_offset(last));
            }
        }
        Ok(())
    }

    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        let row_count = reader.read_count()?;
        let entries = reader.read_count()?;
        let mut offsets = Vec::with_capacity(entries.min(1 << 16));
        for _ in 0..entries {
            let offset = reader.read_i64()?;
            let offset = u64::try_from(offset).map_err(|_| {
                Error::new(ErrorKind::Corrupt).with_message("negative block offset")
            })?;
            offsets.push(offset);
        }
        Self::new(row_count, offsets)
    }

    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), Error> {
        writer.write_count(self.row_count)?;
        writer.write_count(self.offsets.len())?;
        for &offset in &self.offsets {
            let offset = i64::try_from(offset).map_err(|_| {
                Error::new(ErrorKind::Usage).with_message("block offset exceeds i64 range")
            })?;
            writer.write_i64(offset)?;
        }
        writer.flush().map_err(Error::from_io)
    }
}

/// Collects block offsets while rows are written or scanned in order.
#[derive(Debug)]
pub struct BlockIndexBuilder {
    row_count: usize,
    offsets: Vec<u64>,
}

impl BlockIndexBuilder {
    pub fn new(data_offset: u64) -> Self {
        Self {
            row_count: 0,
            offsets: vec![data_offset],
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Called after each row with the stream offset just past it.
    pub fn record_row(&mut self, end_offset: u64) {
        self.row_count += 1;
        if self.row_count % BLOCK_SIZE == 0 {
            self.offsets.push(end_offset);
        }
    }

    pub fn finish(self) -> Result<BlockIndex, Error> {
        BlockIndex::new(self.row_count, self.offsets)
    }
}
