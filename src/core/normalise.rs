//! Purpose: Per-column affine normalisation models derived from table statistics.
//! Exports: `NormalisationType`, `ColumnNormalisation`, `NormalisationModel`.
//! Role: Shared by `RowStore::normalise` and the CLI; models persist as JSON.
//! Invariants: `divide` is never zero; a zero spread normalises to `value - subtract`.
//! Invariants: Normalised Float columns stay Float, other numeric columns become Double.

use serde::{Deserialize, Serialize};

use crate::core::analysis::TableAnalysis;
use crate::core::cell::Cell;
use crate::core::error::{Error, ErrorKind};
use crate::core::row::Row;
use crate::core::schema::Schema;
use crate::core::types::ColumnType;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalisationType {
    /// Zero mean, unit population standard deviation.
    Standard,
    /// Divide by the L1 norm.
    Manhattan,
    /// Divide by the L2 norm.
    Euclidean,
    /// Rescale into `[0, 1]` using min and max.
    FeatureScale,
}

impl NormalisationType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "manhattan" => Some(Self::Manhattan),
            "euclidean" => Some(Self::Euclidean),
            "feature-scale" | "feature_scale" | "featurescale" => Some(Self::FeatureScale),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnNormalisation {
    pub column_index: usize,
    pub subtract: f64,
    pub divide: f64,
}

impl ColumnNormalisation {
    pub fn new(column_index: usize, subtract: f64, divide: f64) -> Self {
        let divide = if divide == 0.0 || !divide.is_finite() { 1.0 } else { divide };
        Self {
            column_index,
            subtract,
            divide,
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        (value - self.subtract) / self.divide
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalisationModel {
    pub normalisation_type: NormalisationType,
    pub columns: Vec<ColumnNormalisation>,
}

impl NormalisationModel {
    /// Numeric continuous columns, the default normalisation targets.
    pub fn default_columns(schema: &Schema) -> Vec<usize> {
        schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| column.column_type.is_numeric() && column.is_continuous())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn from_analysis(
        analysis: &TableAnalysis,
        schema: &Schema,
        normalisation_type: NormalisationType,
        columns: &[usize],
    ) -> Result<Self, Error> {
        let mut out = Vec::with_capacity(columns.len());
        for &index in columns {
            check_numeric(schema, index)?;
            let Some(stats) = analysis.column(index).and_then(|column| column.numeric.as_ref())
            else {
                // All-null column: nothing to scale.
                out.push(ColumnNormalisation::new(index, 0.0, 1.0));
                continue;
            };
            let (subtract, divide) = match normalisation_type {
                NormalisationType::Standard => (stats.mean, stats.std_dev),
                NormalisationType::Manhattan => (0.0, stats.l1_norm),
                NormalisationType::Euclidean => (0.0, stats.l2_norm),
                NormalisationType::FeatureScale => (stats.min, stats.max - stats.min),
            };
            out.push(ColumnNormalisation::new(index, subtract, divide));
        }
        Ok(Self {
            normalisation_type,
            columns: out,
        })
    }

    pub fn column(&self, index: usize) -> Option<&ColumnNormalisation> {
        self.columns.iter().find(|column| column.column_index == index)
    }

    /// Schema of a table after this model is applied to `schema`.
    pub fn output_schema(&self, schema: &Schema) -> Result<Schema, Error> {
        let mut columns = schema.columns().to_vec();
        for normalisation in &self.columns {
            check_numeric(schema, normalisation.column_index)?;
            let column = &mut columns[normalisation.column_index];
            if column.column_type != ColumnType::Float {
                column.column_type = ColumnType::Double;
            }
        }
        Ok(Schema::new(columns))
    }

    /// Normalised copy of `row`'s cells; nulls pass through.
    pub fn apply(&self, row: &Row) -> Result<Vec<Cell>, Error> {
        let mut cells = row.cells.clone();
        for normalisation in &self.columns {
            let Some(cell) = cells.get_mut(normalisation.column_index) else {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!(
                        "normalised column {} out of range",
                        normalisation.column_index
                    ))
                    .with_row(row.index as u64));
            };
            if cell.is_null() {
                continue;
            }
            let value = cell.as_f64().ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!(
                        "column {} is not numeric",
                        normalisation.column_index
                    ))
                    .with_row(row.index as u64)
            })?;
            let value = normalisation.apply(value);
            *cell = if matches!(cell, Cell::Float(_)) {
                Cell::Float(value as f32)
            } else {
                Cell::Double(value)
            };
        }
        Ok(cells)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode normalisation model")
                .with_source(err)
        })
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid normalisation model")
                .with_source(err)
        })
    }
}

fn check_numeric(schema: &Schema, index: usize) -> Result<(), Error> {
    schema.check_index(index)?;
    let column_type = schema.columns()[index].column_type;
    if !column_type.is_numeric() {
        return Err(Error::new(ErrorKind::Usage).with_message(format!(
            "column {index} has type {column_type} and cannot be normalised"
        )));
    }
    Ok(())
}
