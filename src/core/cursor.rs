// Buffered, position-tracking read cursor over a table's data stream.
use std::io::{self, BufReader, Read, Seek, SeekFrom};

use crate::core::error::{Error, ErrorKind};

/// Any seekable byte source a table can be read from.
pub trait TableStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> TableStream for T {}

/// The single physical read head of a table.
///
/// Tracks the logical position itself so end-of-stream checks never have to ask
/// the underlying stream.
pub struct TableCursor {
    reader: BufReader<Box<dyn TableStream>>,
    position: u64,
    len: u64,
}

impl TableCursor {
    pub fn new(mut stream: Box<dyn TableStream>, buffer: usize) -> Result<Self, Error> {
        let len = stream.seek(SeekFrom::End(0)).map_err(Error::from_io)?;
        stream.seek(SeekFrom::Start(0)).map_err(Error::from_io)?;
        Ok(Self {
            reader: BufReader::with_capacity(buffer.max(1), stream),
            position: 0,
            len,
        })
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.len
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<(), Error> {
        if offset > self.len {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("seek past end of stream")
                .with_offset(offset));
        }
        let delta = offset as i128 - self.position as i128;
        let delta = i64::try_from(delta).map_err(|_| {
            Error::new(ErrorKind::Corrupt)
                .with_message("seek distance overflow")
                .with_offset(offset)
        })?;
        self.reader.seek_relative(delta).map_err(Error::from_io)?;
        self.position = offset;
        Ok(())
    }

    /// Advances without reading the bytes into memory.
    pub fn skip(&mut self, len: u64) -> Result<(), Error> {
        let target = self.position.checked_add(len).filter(|end| *end <= self.len);
        match target {
            Some(target) => self.seek_to(target),
            None => Err(Error::new(ErrorKind::Corrupt)
                .with_message("cell extends past end of stream")
                .with_offset(self.position)),
        }
    }
}

impl Read for TableCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.reader.read(buf)?;
        self.position += read as u64;
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::TableCursor;
    use crate::core::error::ErrorKind;
    use crate::core::wire::WireRead;
    use std::io::Cursor;

    fn cursor(bytes: Vec<u8>) -> TableCursor {
        TableCursor::new(Box::new(Cursor::new(bytes)), 4).expect("cursor")
    }

    #[test]
    fn position_tracks_reads_and_skips() {
        let mut cursor = cursor((0u8..32).collect());
        assert_eq!(cursor.len(), 32);
        assert_eq!(cursor.read_u8().expect("read"), 0);
        cursor.skip(9).expect("skip");
        assert_eq!(cursor.position(), 10);
        assert_eq!(cursor.read_u8().expect("read"), 10);
        cursor.seek_to(3).expect("seek back");
        assert_eq!(cursor.read_u8().expect("read"), 3);
        cursor.seek_to(32).expect("seek end");
        assert!(cursor.at_end());
    }

    #[test]
    fn skip_past_end_is_corrupt() {
        let mut cursor = cursor(vec![0u8; 8]);
        cursor.skip(4).expect("skip");
        let err = cursor.skip(5).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.offset(), Some(4));
    }
}
