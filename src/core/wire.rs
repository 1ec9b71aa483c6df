// Little-endian primitive encoding shared by the data and index streams.
use std::io::{self, Read, Write};

use crate::core::error::{Error, ErrorKind};

const MAX_VARINT_BYTES: usize = 5;
const PREALLOC_LIMIT: usize = 64 * 1024;

pub trait WireRead: Read {
    fn read_u8(&mut self) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf).map_err(Error::from_io)?;
        Ok(buf[0])
    }

    fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8()? != 0)
    }

    fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(i32::from_le_bytes(read_array(self)?))
    }

    fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_le_bytes(read_array(self)?))
    }

    fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(i64::from_le_bytes(read_array(self)?))
    }

    fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(f32::from_le_bytes(read_array(self)?))
    }

    fn read_f64(&mut self) -> Result<f64, Error> {
        Ok(f64::from_le_bytes(read_array(self)?))
    }

    /// Non-negative i32 used as a count or extent.
    fn read_count(&mut self) -> Result<usize, Error> {
        let value = self.read_i32()?;
        usize::try_from(value).map_err(|_| {
            Error::new(ErrorKind::Corrupt).with_message(format!("negative count {value}"))
        })
    }

    fn read_varint_len(&mut self) -> Result<usize, Error> {
        let mut value: u32 = 0;
        for i in 0..MAX_VARINT_BYTES {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value as usize);
            }
        }
        Err(Error::new(ErrorKind::Corrupt).with_message("7-bit length prefix too long"))
    }

    fn read_string(&mut self) -> Result<String, Error> {
        let len = self.read_varint_len()?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("string cell is not valid UTF-8")
                .with_source(err)
        })
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        let read = Read::take(&mut *self, len as u64)
            .read_to_end(&mut buf)
            .map_err(Error::from_io)?;
        if read != len {
            return Err(Error::from_io(io::Error::from(io::ErrorKind::UnexpectedEof)));
        }
        Ok(buf)
    }
}

impl<R: Read + ?Sized> WireRead for R {}

pub trait WireWrite: Write {
    fn write_u8(&mut self, value: u8) -> Result<(), Error> {
        self.write_all(&[value]).map_err(Error::from_io)
    }

    fn write_bool(&mut self, value: bool) -> Result<(), Error> {
        self.write_u8(u8::from(value))
    }

    fn write_i32(&mut self, value: i32) -> Result<(), Error> {
        self.write_all(&value.to_le_bytes()).map_err(Error::from_io)
    }

    fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        self.write_all(&value.to_le_bytes()).map_err(Error::from_io)
    }

    fn write_i64(&mut self, value: i64) -> Result<(), Error> {
        self.write_all(&value.to_le_bytes()).map_err(Error::from_io)
    }

    fn write_f32(&mut self, value: f32) -> Result<(), Error> {
        self.write_all(&value.to_le_bytes()).map_err(Error::from_io)
    }

    fn write_f64(&mut self, value: f64) -> Result<(), Error> {
        self.write_all(&value.to_le_bytes()).map_err(Error::from_io)
    }

    fn write_count(&mut self, value: usize) -> Result<(), Error> {
        let value = i32::try_from(value).map_err(|_| {
            Error::new(ErrorKind::Usage).with_message(format!("count {value} exceeds i32 range"))
        })?;
        self.write_i32(value)
    }

    fn write_varint_len(&mut self, len: usize) -> Result<(), Error> {
        let mut value = u32::try_from(len).map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("string longer than 4 GiB")
        })?;
        while value >= 0x80 {
            self.write_u8((value as u8) | 0x80)?;
            value >>= 7;
        }
        self.write_u8(value as u8)
    }

    fn write_string(&mut self, value: &str) -> Result<(), Error> {
        self.write_varint_len(value.len())?;
        self.write_all(value.as_bytes()).map_err(Error::from_io)
    }
}

impl<W: Write + ?Sized> WireWrite for W {}

fn read_array<const N: usize, R: Read + ?Sized>(reader: &mut R) -> Result<[u8; N], Error> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(Error::from_io)?;
    Ok(buf)
}
