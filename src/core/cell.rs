// Cell values and the per-type read/skip/write codec.
use std::fmt;
use std::io::{Read, Write};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::cursor::TableCursor;
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{NANOS_PER_TICK, UNIX_EPOCH_TICKS};
use crate::core::payload::{
    Extents, FloatMatrix, FloatTensor, FloatVector, IndexList, Payload, WeightedIndexList,
};
use crate::core::types::{ColumnType, Layout};
use crate::core::wire::{WireRead, WireWrite};

#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Null,
    String(String),
    Double(f64),
    Int(i32),
    Float(f32),
    Boolean(bool),
    Date(OffsetDateTime),
    Long(i64),
    Byte(i8),
    IndexList(IndexList),
    WeightedIndexList(WeightedIndexList),
    Vector(FloatVector),
    Matrix(FloatMatrix),
    Tensor(FloatTensor),
}

impl Cell {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Cell::Null => ColumnType::Null,
            Cell::String(_) => ColumnType::String,
            Cell::Double(_) => ColumnType::Double,
            Cell::Int(_) => ColumnType::Int,
            Cell::Float(_) => ColumnType::Float,
            Cell::Boolean(_) => ColumnType::Boolean,
            Cell::Date(_) => ColumnType::Date,
            Cell::Long(_) => ColumnType::Long,
            Cell::Byte(_) => ColumnType::Byte,
            Cell::IndexList(_) => ColumnType::IndexList,
            Cell::WeightedIndexList(_) => ColumnType::WeightedIndexList,
            Cell::Vector(_) => ColumnType::Vector,
            Cell::Matrix(_) => ColumnType::Matrix,
            Cell::Tensor(_) => ColumnType::Tensor,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::String(value) => Some(value),
            _ => None,
        }
    }

    /// Numeric view; booleans are 0/1 and strings are parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Double(value) => Some(*value),
            Cell::Float(value) => Some(f64::from(*value)),
            Cell::Int(value) => Some(f64::from(*value)),
            Cell::Long(value) => Some(*value as f64),
            Cell::Byte(value) => Some(f64::from(*value)),
            Cell::Boolean(value) => Some(if *value { 1.0 } else { 0.0 }),
            Cell::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get<T: FromCell>(&self) -> Option<T> {
        T::from_cell(self)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::String(value) => f.write_str(value),
            Cell::Double(value) => write!(f, "{value}"),
            Cell::Int(value) => write!(f, "{value}"),
            Cell::Float(value) => write!(f, "{value}"),
            Cell::Boolean(value) => write!(f, "{value}"),
            Cell::Date(value) => match value.format(&Rfc3339) {
                Ok(text) => f.write_str(&text),
                Err(_) => write!(f, "{value}"),
            },
            Cell::Long(value) => write!(f, "{value}"),
            Cell::Byte(value) => write!(f, "{value}"),
            Cell::IndexList(list) => write_list(f, list.indices.iter()),
            Cell::WeightedIndexList(list) => write_list(
                f,
                list.indices
                    .iter()
                    .map(|item| format!("{}:{}", item.index, item.weight)),
            ),
            Cell::Vector(vector) => write_list(f, vector.data.iter()),
            Cell::Matrix(matrix) => write!(f, "matrix({}x{})", matrix.rows, matrix.columns),
            Cell::Tensor(tensor) => write!(
                f,
                "tensor({}x{}x{})",
                tensor.depth, tensor.rows, tensor.columns
            ),
        }
    }
}

fn write_list<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = T>,
) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str("]")
}

pub trait FromCell: Sized {
    fn from_cell(cell: &Cell) -> Option<Self>;
}

impl FromCell for f64 {
    fn from_cell(cell: &Cell) -> Option<Self> {
        cell.as_f64()
    }
}

impl FromCell for f32 {
    fn from_cell(cell: &Cell) -> Option<Self> {
        cell.as_f64().map(|value| value as f32)
    }
}

impl FromCell for i64 {
    fn from_cell(cell: &Cell) -> Option<Self> {
        match cell {
            Cell::Long(value) => Some(*value),
            Cell::Int(value) => Some(i64::from(*value)),
            Cell::Byte(value) => Some(i64::from(*value)),
            Cell::Boolean(value) => Some(i64::from(*value)),
            Cell::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromCell for i32 {
    fn from_cell(cell: &Cell) -> Option<Self> {
        i64::from_cell(cell).and_then(|value| i32::try_from(value).ok())
    }
}

impl FromCell for bool {
    fn from_cell(cell: &Cell) -> Option<Self> {
        match cell {
            Cell::Boolean(value) => Some(*value),
            Cell::String(value) => value.trim().to_ascii_lowercase().parse().ok(),
            other => other.as_f64().map(|value| value != 0.0),
        }
    }
}

impl FromCell for String {
    fn from_cell(cell: &Cell) -> Option<Self> {
        Some(cell.to_string())
    }
}

impl FromCell for Cell {
    fn from_cell(cell: &Cell) -> Option<Self> {
        Some(cell.clone())
    }
}

/// Length prefix of a cell: payload extents (if any) and the body length that follows.
fn read_prefix<R: Read + ?Sized>(
    layout: Layout,
    reader: &mut R,
) -> Result<(Option<Extents>, u64), Error> {
    match layout {
        Layout::Empty => Ok((None, 0)),
        Layout::Fixed(len) => Ok((None, len as u64)),
        Layout::Utf8 => Ok((None, reader.read_varint_len()? as u64)),
        Layout::Counted { dims, element } => {
            let extents = Extents::read_from(reader, dims)?;
            let len = extents.body_len(element)?;
            Ok((Some(extents), len))
        }
    }
}

pub fn read_cell<R: Read + ?Sized>(column_type: ColumnType, reader: &mut R) -> Result<Cell, Error> {
    let (extents, len) = read_prefix(column_type.layout(), reader)?;
    if let Layout::Fixed(width) = column_type.layout() {
        let mut buf = [0u8; 8];
        reader
            .read_exact(&mut buf[..width])
            .map_err(Error::from_io)?;
        return decode_fixed(column_type, buf);
    }
    if len == 0 && extents.is_none() {
        return Ok(match column_type {
            ColumnType::String => Cell::String(String::new()),
            _ => Cell::Null,
        });
    }
    let body = reader.read_bytes(len as usize)?;
    match (column_type, extents) {
        (ColumnType::String, _) => String::from_utf8(body).map(Cell::String).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("string cell is not valid UTF-8")
                .with_source(err)
        }),
        (ColumnType::IndexList, Some(extents)) => {
            IndexList::decode_body(&extents, &body).map(Cell::IndexList)
        }
        (ColumnType::WeightedIndexList, Some(extents)) => {
            WeightedIndexList::decode_body(&extents, &body).map(Cell::WeightedIndexList)
        }
        (ColumnType::Vector, Some(extents)) => {
            FloatVector::decode_body(&extents, &body).map(Cell::Vector)
        }
        (ColumnType::Matrix, Some(extents)) => {
            FloatMatrix::decode_body(&extents, &body).map(Cell::Matrix)
        }
        (ColumnType::Tensor, Some(extents)) => {
            FloatTensor::decode_body(&extents, &body).map(Cell::Tensor)
        }
        (other, _) => Err(Error::new(ErrorKind::Internal)
            .with_message(format!("no decoder for {other}"))),
    }
}

/// Same prefix walk as `read_cell`, but the body is stepped over, never loaded.
pub fn skip_cell(column_type: ColumnType, cursor: &mut TableCursor) -> Result<(), Error> {
    let (_, len) = read_prefix(column_type.layout(), cursor)?;
    if len > 0 {
        cursor.skip(len)?;
    }
    Ok(())
}

pub fn write_cell<W: Write + ?Sized>(
    column_type: ColumnType,
    cell: &Cell,
    writer: &mut W,
) -> Result<(), Error> {
    if cell.column_type() != column_type {
        return Err(Error::new(ErrorKind::Usage).with_message(format!(
            "{} cell cannot be written to a {column_type} column",
            cell.column_type()
        )));
    }
    match cell {
        Cell::Null => Ok(()),
        Cell::String(value) => writer.write_string(value),
        Cell::Double(value) => writer.write_f64(*value),
        Cell::Int(value) => writer.write_i32(*value),
        Cell::Float(value) => writer.write_f32(*value),
        Cell::Boolean(value) => writer.write_bool(*value),
        Cell::Date(value) => writer.write_i64(date_to_ticks(*value)?),
        Cell::Long(value) => writer.write_i64(*value),
        Cell::Byte(value) => writer.write_u8(*value as u8),
        Cell::IndexList(list) => list.write_to(writer),
        Cell::WeightedIndexList(list) => list.write_to(writer),
        Cell::Vector(vector) => vector.write_to(writer),
        Cell::Matrix(matrix) => matrix.write_to(writer),
        Cell::Tensor(tensor) => tensor.write_to(writer),
    }
}

fn decode_fixed(column_type: ColumnType, buf: [u8; 8]) -> Result<Cell, Error> {
    let word = [buf[0], buf[1], buf[2], buf[3]];
    let cell = match column_type {
        ColumnType::Boolean => Cell::Boolean(buf[0] != 0),
        ColumnType::Byte => Cell::Byte(buf[0] as i8),
        ColumnType::Int => Cell::Int(i32::from_le_bytes(word)),
        ColumnType::Float => Cell::Float(f32::from_le_bytes(word)),
        ColumnType::Double => Cell::Double(f64::from_le_bytes(buf)),
        ColumnType::Long => Cell::Long(i64::from_le_bytes(buf)),
        ColumnType::Date => Cell::Date(ticks_to_date(i64::from_le_bytes(buf))?),
        other => {
            return Err(Error::new(ErrorKind::Internal)
                .with_message(format!("{other} is not a fixed-width type")));
        }
    };
    Ok(cell)
}

pub fn ticks_to_date(ticks: i64) -> Result<OffsetDateTime, Error> {
    let nanos = (i128::from(ticks) - i128::from(UNIX_EPOCH_TICKS)) * NANOS_PER_TICK;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("date ticks {ticks} out of range"))
            .with_source(err)
    })
}

pub fn date_to_ticks(date: OffsetDateTime) -> Result<i64, Error> {
    let ticks =
        date.unix_timestamp_nanos().div_euclid(NANOS_PER_TICK) + i128::from(UNIX_EPOCH_TICKS);
    i64::try_from(ticks).map_err(|_| {
        Error::new(ErrorKind::Usage).with_message("date cannot be represented as ticks")
    })
}

#[cfg(test)]
mod tests {
    use super::{Cell, date_to_ticks, read_cell, skip_cell, ticks_to_date, write_cell};
    use crate::core::cursor::TableCursor;
    use crate::core::error::ErrorKind;
    use crate::core::format::UNIX_EPOCH_TICKS;
    use crate::core::payload::{FloatTensor, IndexList};
    use crate::core::types::ColumnType;
    use std::io::Cursor;
    use time::macros::datetime;

    fn encode(cells: &[Cell]) -> Vec<u8> {
        let mut buf = Vec::new();
        for cell in cells {
            write_cell(cell.column_type(), cell, &mut buf).expect("write");
        }
        buf
    }

    #[test]
    fn skip_lands_where_read_does() {
        let cells = vec![
            Cell::String("a longer string value".to_string()),
            Cell::Tensor(FloatTensor::new(2, 1, 3, vec![0.5; 6]).expect("tensor")),
            Cell::IndexList(IndexList::new(vec![1, 5, 9])),
            Cell::Byte(-3),
            Cell::Int(17),
        ];
        let bytes = encode(&cells);

        let mut reader = bytes.as_slice();
        for cell in &cells {
            assert_eq!(&read_cell(cell.column_type(), &mut reader).expect("read"), cell);
        }
        assert!(reader.is_empty());

        let mut cursor = TableCursor::new(Box::new(Cursor::new(bytes)), 8).expect("cursor");
        for cell in &cells[..4] {
            skip_cell(cell.column_type(), &mut cursor).expect("skip");
        }
        assert_eq!(read_cell(ColumnType::Int, &mut cursor).expect("read"), Cell::Int(17));
        assert!(cursor.at_end());
    }

    #[test]
    fn unknown_tag_reads_as_null_without_consuming() {
        let bytes = encode(&[Cell::Int(5)]);
        let mut reader = bytes.as_slice();
        assert_eq!(
            read_cell(ColumnType::Unknown(99), &mut reader).expect("read"),
            Cell::Null
        );
        assert_eq!(read_cell(ColumnType::Int, &mut reader).expect("read"), Cell::Int(5));
    }

    #[test]
    fn type_mismatch_is_rejected_on_write() {
        let mut buf = Vec::new();
        let err = write_cell(ColumnType::Float, &Cell::Double(1.0), &mut buf)
            .expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let err = write_cell(ColumnType::String, &Cell::Null, &mut buf).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn dates_round_trip_through_ticks() {
        let date = datetime!(2019-03-04 05:06:07.1234567 UTC);
        let ticks = date_to_ticks(date).expect("ticks");
        assert_eq!(ticks_to_date(ticks).expect("date"), date);
        assert_eq!(
            ticks_to_date(UNIX_EPOCH_TICKS).expect("epoch"),
            time::OffsetDateTime::UNIX_EPOCH
        );
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(Cell::Byte(-2).get::<f64>(), Some(-2.0));
        assert_eq!(Cell::String(" 2.5 ".into()).get::<f32>(), Some(2.5));
        assert_eq!(Cell::Long(i64::MAX).get::<i32>(), None);
        assert_eq!(Cell::Int(0).get::<bool>(), Some(false));
        assert_eq!(Cell::Boolean(true).get::<String>(), Some("true".to_string()));
        assert_eq!(Cell::Vector(Default::default()).get::<f64>(), None);
    }
}
