//! Purpose: Column descriptors and the schema header at the start of every data stream.
//! Exports: `Column`, `Schema`.
//! Role: Positional contract between stored rows and their decoded cells.
//! Invariants: Header layout is `[i32 count]` then per column
//! `{string name, u8 tag, bool target, i32 distinct, bool has_continuous, [bool continuous]}`.
//! Invariants: The target column is the flagged one, else the last column.

use std::io::{Read, Write};

use tracing::warn;

use crate::core::error::{Error, ErrorKind};
use crate::core::types::{ColumnType, Layout};
use crate::core::wire::{WireRead, WireWrite};

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub is_target: bool,
    pub num_distinct: usize,
    continuous: Option<bool>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            is_target: false,
            num_distinct: 0,
            continuous: None,
        }
    }

    pub fn target(mut self, is_target: bool) -> Self {
        self.is_target = is_target;
        self
    }

    pub fn with_num_distinct(mut self, num_distinct: usize) -> Self {
        self.num_distinct = num_distinct;
        self
    }

    pub fn with_continuous(mut self, continuous: Option<bool>) -> Self {
        self.continuous = continuous;
        self
    }

    /// Explicit flag when one was stored; otherwise numeric non-target columns.
    pub fn is_continuous(&self) -> bool {
        self.continuous
            .unwrap_or_else(|| self.column_type.is_numeric() && !self.is_target)
    }

    pub fn continuous_flag(&self) -> Option<bool> {
        self.continuous
    }

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        let name = reader.read_string()?;
        let code = reader.read_u8()?;
        let column_type = ColumnType::from_code(code);
        if let ColumnType::Unknown(code) = column_type {
            warn!(column = %name, code, "unknown column type tag, cells will read as null");
        }
        let is_target = reader.read_bool()?;
        let num_distinct = reader.read_count()?;
        let continuous = if reader.read_bool()? {
            Some(reader.read_bool()?)
        } else {
            None
        };
        Ok(Self {
            name,
            column_type,
            is_target,
            num_distinct,
            continuous,
        })
    }

    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), Error> {
        writer.write_string(&self.name)?;
        writer.write_u8(self.column_type.code())?;
        writer.write_bool(self.is_target)?;
        writer.write_count(self.num_distinct)?;
        writer.write_bool(self.continuous.is_some())?;
        if let Some(continuous) = self.continuous {
            writer.write_bool(continuous)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn push(&mut self, column: Column) {
        self.columns.push(column);
    }

    /// True when encoded rows occupy no bytes (no columns, or only null/unknown tags).
    ///
    /// Such rows cannot be counted back out of the data stream.
    pub fn is_zero_width(&self) -> bool {
        self.columns
            .iter()
            .all(|column| column.column_type.layout() == Layout::Empty)
    }

    pub fn target_index(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.is_target)
            .or_else(|| self.columns.len().checked_sub(1))
    }

    /// Flags `index` as the only target column.
    pub fn set_target(&mut self, index: usize) -> Result<(), Error> {
        self.check_index(index)?;
        for (i, column) in self.columns.iter_mut().enumerate() {
            column.is_target = i == index;
        }
        Ok(())
    }

    pub fn has_categorical_data(&self) -> bool {
        self.columns
            .iter()
            .any(|column| !column.is_continuous() && !column.is_target)
    }

    pub fn select(&self, indices: &[usize]) -> Result<Schema, Error> {
        let mut columns = Vec::with_capacity(indices.len());
        for &index in indices {
            self.check_index(index)?;
            columns.push(self.columns[index].clone());
        }
        Ok(Schema::new(columns))
    }

    pub fn concat(&self, other: &Schema) -> Schema {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        Schema::new(columns)
    }

    pub fn check_index(&self, index: usize) -> Result<(), Error> {
        if index >= self.columns.len() {
            return Err(Error::new(ErrorKind::Usage).with_message(format!(
                "column {index} out of range ({} columns)",
                self.columns.len()
            )));
        }
        Ok(())
    }

    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        let count = reader.read_count()?;
        let mut columns = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            columns.push(Column::read_from(reader)?);
        }
        Ok(Self { columns })
    }

    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), Error> {
        writer.write_count(self.columns.len())?;
        for column in &self.columns {
            column.write_to(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, Schema};
    use crate::core::error::ErrorKind;
    use crate::core::types::ColumnType;

    fn sample() -> Schema {
        Schema::new(vec![
            Column::new("age", ColumnType::Int),
            Column::new("city", ColumnType::String).with_num_distinct(12),
            Column::new("score", ColumnType::Float).with_continuous(Some(false)),
            Column::new("label", ColumnType::String),
        ])
    }

    #[test]
    fn zero_width_schemas_are_detected() {
        assert!(Schema::default().is_zero_width());
        assert!(
            Schema::new(vec![
                Column::new("nothing", ColumnType::Null),
                Column::new("future", ColumnType::Unknown(77)),
            ])
            .is_zero_width()
        );
        assert!(!sample().is_zero_width());
    }

    #[test]
    fn header_round_trip() {
        let schema = sample();
        let mut buf = Vec::new();
        schema.write_to(&mut buf).expect("write");
        let decoded = Schema::read_from(&mut buf.as_slice()).expect("read");
        assert_eq!(decoded, schema);
        assert_eq!(decoded.column(2).and_then(Column::continuous_flag), Some(false));
    }

    #[test]
    fn last_column_is_implicit_target() {
        let mut schema = sample();
        assert_eq!(schema.target_index(), Some(3));
        schema.set_target(1).expect("set");
        assert_eq!(schema.target_index(), Some(1));
        assert_eq!(schema.columns().iter().filter(|c| c.is_target).count(), 1);
        assert_eq!(schema.set_target(9).expect_err("range").kind(), ErrorKind::Usage);
        assert_eq!(Schema::default().target_index(), None);
    }

    #[test]
    fn continuity_defaults_from_type() {
        let schema = sample();
        assert!(schema.columns()[0].is_continuous());
        assert!(!schema.columns()[1].is_continuous());
        assert!(!schema.columns()[2].is_continuous());
        assert!(!Column::new("y", ColumnType::Double).target(true).is_continuous());
        assert!(schema.has_categorical_data());
    }

    #[test]
    fn unknown_tags_survive_round_trip() {
        let schema = Schema::new(vec![Column::new("future", ColumnType::Unknown(42))]);
        let mut buf = Vec::new();
        schema.write_to(&mut buf).expect("write");
        let decoded = Schema::read_from(&mut buf.as_slice()).expect("read");
        assert_eq!(decoded.columns()[0].column_type, ColumnType::Unknown(42));
    }
}
