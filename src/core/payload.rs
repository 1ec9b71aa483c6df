//! Purpose: Self-describing variable-width cell payloads (index lists, vectors, tensors).
//! Exports: `IndexList`, `WeightedIndexList`, `WeightedIndex`, `FloatVector`, `FloatMatrix`,
//! `FloatTensor`, `Payload`, `Extents`.
//! Role: Opaque values to the row store; each round-trips its exact bytes.
//! Invariants: Extents are written before the body and fully determine its byte length.
//! Invariants: Decoding never trusts extents beyond what the stream actually holds.

use std::io::{Read, Write};

use crate::core::error::{Error, ErrorKind};
use crate::core::types::{ColumnType, Layout};
use crate::core::wire::{WireRead, WireWrite};

/// Dimension prefix of a counted payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Extents {
    dims: [usize; 3],
    rank: usize,
}

impl Extents {
    pub fn new(dims: &[usize]) -> Self {
        let mut out = [0usize; 3];
        let rank = dims.len().min(3);
        out[..rank].copy_from_slice(&dims[..rank]);
        Self { dims: out, rank }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims[..self.rank]
    }

    pub fn elements(&self) -> Option<usize> {
        self.dims()
            .iter()
            .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
    }

    pub fn read_from<R: Read + ?Sized>(reader: &mut R, rank: usize) -> Result<Self, Error> {
        let mut dims = [0usize; 3];
        for dim in dims.iter_mut().take(rank) {
            *dim = reader.read_count()?;
        }
        Ok(Self {
            dims,
            rank: rank.min(3),
        })
    }

    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), Error> {
        for dim in self.dims() {
            writer.write_count(*dim)?;
        }
        Ok(())
    }

    /// Body length in bytes for elements of `element` bytes each.
    pub fn body_len(&self, element: usize) -> Result<u64, Error> {
        self.elements()
            .and_then(|count| count.checked_mul(element))
            .map(|len| len as u64)
            .ok_or_else(|| Error::new(ErrorKind::Corrupt).with_message("payload extents overflow"))
    }
}

pub trait Payload: Sized {
    const COLUMN_TYPE: ColumnType;

    fn extents(&self) -> Extents;

    fn decode_body(extents: &Extents, body: &[u8]) -> Result<Self, Error>;

    fn encode_body(&self, out: &mut Vec<u8>);

    /// Rejects values whose extents disagree with their body.
    fn check(&self) -> Result<(), Error> {
        Ok(())
    }

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        let (rank, element) = counted_layout(Self::COLUMN_TYPE)?;
        let extents = Extents::read_from(reader, rank)?;
        let len = extents.body_len(element)?;
        let body = reader.read_bytes(len as usize)?;
        Self::decode_body(&extents, &body)
    }

    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), Error> {
        self.check()?;
        self.extents().write_to(writer)?;
        let mut body = Vec::new();
        self.encode_body(&mut body);
        writer.write_all(&body).map_err(Error::from_io)
    }
}

pub(crate) fn counted_layout(column_type: ColumnType) -> Result<(usize, usize), Error> {
    match column_type.layout() {
        Layout::Counted { dims, element } => Ok((dims, element)),
        _ => Err(Error::new(ErrorKind::Internal)
            .with_message(format!("{column_type} is not a counted payload"))),
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexList {
    pub indices: Vec<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightedIndex {
    pub index: u32,
    pub weight: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeightedIndexList {
    pub indices: Vec<WeightedIndex>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FloatVector {
    pub data: Vec<f32>,
}

/// Row-major.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FloatMatrix {
    pub rows: usize,
    pub columns: usize,
    pub data: Vec<f32>,
}

/// Depth-major stack of row-major matrices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FloatTensor {
    pub depth: usize,
    pub rows: usize,
    pub columns: usize,
    pub data: Vec<f32>,
}

impl IndexList {
    pub fn new(indices: Vec<u32>) -> Self {
        Self { indices }
    }
}

impl WeightedIndexList {
    pub fn new(indices: Vec<WeightedIndex>) -> Self {
        Self { indices }
    }
}

impl FloatVector {
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }
}

impl FloatMatrix {
    pub fn new(rows: usize, columns: usize, data: Vec<f32>) -> Result<Self, Error> {
        check_shape(&[rows, columns], data.len())?;
        Ok(Self {
            rows,
            columns,
            data,
        })
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.columns)?;
        self.data.get(start..start + self.columns)
    }
}

impl FloatTensor {
    pub fn new(depth: usize, rows: usize, columns: usize, data: Vec<f32>) -> Result<Self, Error> {
        check_shape(&[depth, rows, columns], data.len())?;
        Ok(Self {
            depth,
            rows,
            columns,
            data,
        })
    }
}

impl Payload for IndexList {
    const COLUMN_TYPE: ColumnType = ColumnType::IndexList;

    fn extents(&self) -> Extents {
        Extents::new(&[self.indices.len()])
    }

    fn decode_body(_extents: &Extents, body: &[u8]) -> Result<Self, Error> {
        let indices = body
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self { indices })
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        for index in &self.indices {
            out.extend_from_slice(&index.to_le_bytes());
        }
    }
}

impl Payload for WeightedIndexList {
    const COLUMN_TYPE: ColumnType = ColumnType::WeightedIndexList;

    fn extents(&self) -> Extents {
        Extents::new(&[self.indices.len()])
    }

    fn decode_body(_extents: &Extents, body: &[u8]) -> Result<Self, Error> {
        let indices = body
            .chunks_exact(8)
            .map(|chunk| WeightedIndex {
                index: u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                weight: f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
            })
            .collect();
        Ok(Self { indices })
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        for item in &self.indices {
            out.extend_from_slice(&item.index.to_le_bytes());
            out.extend_from_slice(&item.weight.to_le_bytes());
        }
    }
}

impl Payload for FloatVector {
    const COLUMN_TYPE: ColumnType = ColumnType::Vector;

    fn extents(&self) -> Extents {
        Extents::new(&[self.data.len()])
    }

    fn decode_body(_extents: &Extents, body: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            data: decode_floats(body),
        })
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        encode_floats(&self.data, out);
    }
}

impl Payload for FloatMatrix {
    const COLUMN_TYPE: ColumnType = ColumnType::Matrix;

    fn extents(&self) -> Extents {
        Extents::new(&[self.rows, self.columns])
    }

    fn check(&self) -> Result<(), Error> {
        check_shape(&[self.rows, self.columns], self.data.len())
    }

    fn decode_body(extents: &Extents, body: &[u8]) -> Result<Self, Error> {
        let dims = extents.dims();
        Ok(Self {
            rows: dims[0],
            columns: dims[1],
            data: decode_floats(body),
        })
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        encode_floats(&self.data, out);
    }
}

impl Payload for FloatTensor {
    const COLUMN_TYPE: ColumnType = ColumnType::Tensor;

    fn extents(&self) -> Extents {
        Extents::new(&[self.depth, self.rows, self.columns])
    }

    fn check(&self) -> Result<(), Error> {
        check_shape(&[self.depth, self.rows, self.columns], self.data.len())
    }

    fn decode_body(extents: &Extents, body: &[u8]) -> Result<Self, Error> {
        let dims = extents.dims();
        Ok(Self {
            depth: dims[0],
            rows: dims[1],
            columns: dims[2],
            data: decode_floats(body),
        })
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        encode_floats(&self.data, out);
    }
}

fn check_shape(dims: &[usize], len: usize) -> Result<(), Error> {
    let expected = Extents::new(dims).elements();
    if expected != Some(len) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("shape {dims:?} does not match {len} values")));
    }
    Ok(())
}

fn decode_floats(body: &[u8]) -> Vec<f32> {
    body.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn encode_floats(data: &[f32], out: &mut Vec<u8>) {
    out.reserve(data.len() * 4);
    for value in data {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FloatMatrix, FloatTensor, FloatVector, IndexList, Payload, WeightedIndex,
        WeightedIndexList,
    };
    use crate::core::error::ErrorKind;
    use crate::core::wire::WireWrite;

    #[test]
    fn matrix_layout_is_rows_columns_then_values() {
        let matrix = FloatMatrix::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).expect("matrix");
        let mut buf = Vec::new();
        matrix.write_to(&mut buf).expect("write");
        assert_eq!(buf.len(), 8 + 16);
        assert_eq!(&buf[0..4], &2i32.to_le_bytes());
        assert_eq!(&buf[8..12], &1.0f32.to_le_bytes());
        assert_eq!(matrix.row(1), Some(&[3.0f32, 4.0][..]));

        let decoded = FloatMatrix::read_from(&mut buf.as_slice()).expect("read");
        assert_eq!(decoded, matrix);
    }

    #[test]
    fn weighted_list_keeps_pairs() {
        let list = WeightedIndexList::new(vec![
            WeightedIndex {
                index: 3,
                weight: 0.5,
            },
            WeightedIndex {
                index: 9,
                weight: 2.0,
            },
        ]);
        let mut buf = Vec::new();
        list.write_to(&mut buf).expect("write");
        assert_eq!(buf.len(), 4 + 16);
        assert_eq!(WeightedIndexList::read_from(&mut buf.as_slice()).expect("read"), list);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = FloatTensor::new(2, 2, 2, vec![0.0; 7]).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn mis_shaped_values_write_nothing() {
        let matrix = FloatMatrix {
            rows: 2,
            columns: 2,
            data: vec![1.0],
        };
        let mut buf = Vec::new();
        let err = matrix.write_to(&mut buf).expect_err("matrix shape");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(buf.is_empty());

        let tensor = FloatTensor {
            depth: 1,
            rows: 1,
            columns: 3,
            data: vec![0.0; 4],
        };
        assert!(tensor.write_to(&mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn truncated_body_is_corrupt() {
        let mut buf = Vec::new();
        buf.write_i32(4).expect("count");
        buf.extend_from_slice(&1.0f32.to_le_bytes());
        let err = FloatVector::read_from(&mut buf.as_slice()).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn empty_index_list_is_just_a_count() {
        let mut buf = Vec::new();
        IndexList::default().write_to(&mut buf).expect("write");
        assert_eq!(buf, 0i32.to_le_bytes().to_vec());
    }
}
