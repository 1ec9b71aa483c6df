//! Purpose: Define the public Rust API boundary for rowstore.
//! Exports: Table, writer, cell, schema and derivation types used by the CLI and callers.
//! Role: Additive-only surface re-exporting core types under one path.
//! Invariants: Everything a caller needs to open, read, write and derive tables is here.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::analysis::{ColumnAnalysis, NumericStats, TableAnalysis};
pub use crate::core::cell::{Cell, FromCell};
pub use crate::core::cursor::TableStream;
pub use crate::core::derive::{
    ClassTable, Classified, Fold, Folds, RowClassifier, TrainTestSplit,
};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::format::{BLOCK_SIZE, TableOptions, index_path_for};
pub use crate::core::index::BlockIndex;
pub use crate::core::normalise::{ColumnNormalisation, NormalisationModel, NormalisationType};
pub use crate::core::payload::{
    FloatMatrix, FloatTensor, FloatVector, IndexList, WeightedIndex, WeightedIndexList,
};
pub use crate::core::row::Row;
pub use crate::core::schema::{Column, Schema};
pub use crate::core::store::RowStore;
pub use crate::core::types::ColumnType;
pub use crate::core::writer::{Sink, TableWriter};
