// Decoded rows, stamped with the position they were read from.
use std::io::Read;

use crate::core::cell::{Cell, FromCell, read_cell, skip_cell};
use crate::core::cursor::TableCursor;
use crate::core::error::{Error, ErrorKind};
use crate::core::schema::Schema;

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// Position in the table the row was read from. Not persisted.
    pub index: usize,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(index: usize, cells: Vec<Cell>) -> Self {
        Self { index, cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, column: usize) -> Option<&Cell> {
        self.cells.get(column)
    }

    /// Typed field access with numeric/string coercion.
    pub fn get<T: FromCell>(&self, column: usize) -> Result<T, Error> {
        let cell = self.cells.get(column).ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("column {column} out of range"))
                .with_row(self.index as u64)
        })?;
        T::from_cell(cell).ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "column {column} holds {} which cannot be converted to {}",
                    cell.column_type(),
                    std::any::type_name::<T>()
                ))
                .with_row(self.index as u64)
        })
    }
}

pub(crate) fn read_row<R: Read + ?Sized>(
    schema: &Schema,
    reader: &mut R,
    index: usize,
) -> Result<Row, Error> {
    let mut cells = Vec::with_capacity(schema.len());
    for column in schema.columns() {
        cells.push(read_cell(column.column_type, reader)?);
    }
    Ok(Row { index, cells })
}

pub(crate) fn skip_row(schema: &Schema, cursor: &mut TableCursor) -> Result<(), Error> {
    for column in schema.columns() {
        skip_cell(column.column_type, cursor)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Row;
    use crate::core::cell::Cell;
    use crate::core::error::ErrorKind;

    #[test]
    fn typed_access_reports_row() {
        let row = Row::new(7, vec![Cell::Int(3), Cell::String("x".into())]);
        assert_eq!(row.get::<f32>(0).expect("float"), 3.0);
        let err = row.get::<f64>(1).expect_err("not numeric");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.row(), Some(7));
        assert!(row.get::<i32>(5).is_err());
    }
}
