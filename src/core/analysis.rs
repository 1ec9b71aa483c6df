// Per-column statistics gathered in one scan: distinct values and numeric moments.
use std::collections::BTreeSet;

use tracing::debug;

use crate::core::cell::Cell;
use crate::core::error::Error;
use crate::core::store::RowStore;
use crate::core::types::{ColumnType, Layout};

#[derive(Clone, Debug, PartialEq)]
pub struct NumericStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub l1_norm: f64,
    pub l2_norm: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnAnalysis {
    pub column_type: ColumnType,
    pub nulls: usize,
    /// `None` once the number of distinct values passes the configured cap, and for
    /// payload columns.
    pub distinct: Option<BTreeSet<String>>,
    pub numeric: Option<NumericStats>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableAnalysis {
    rows: usize,
    columns: Vec<ColumnAnalysis>,
}

impl TableAnalysis {
    pub fn compute(store: &RowStore) -> Result<Self, Error> {
        let max_distinct = store.options().max_distinct;
        let mut accumulators: Vec<ColumnAccumulator> = store
            .columns()
            .iter()
            .map(|column| ColumnAccumulator::new(column.column_type))
            .collect();
        let mut rows = 0usize;
        store.for_each(|row| {
            rows += 1;
            for (accumulator, cell) in accumulators.iter_mut().zip(&row.cells) {
                accumulator.push(cell, max_distinct);
            }
        })?;
        debug!(rows, columns = accumulators.len(), "computed table analysis");
        Ok(Self {
            rows,
            columns: accumulators
                .into_iter()
                .map(ColumnAccumulator::finish)
                .collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[ColumnAnalysis] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&ColumnAnalysis> {
        self.columns.get(index)
    }
}

struct ColumnAccumulator {
    column_type: ColumnType,
    nulls: usize,
    distinct: Option<BTreeSet<String>>,
    count: usize,
    min: f64,
    max: f64,
    mean: f64,
    m2: f64,
    l1: f64,
    l2: f64,
}

impl ColumnAccumulator {
    fn new(column_type: ColumnType) -> Self {
        let tracks_distinct = !matches!(column_type.layout(), Layout::Counted { .. });
        Self {
            column_type,
            nulls: 0,
            distinct: tracks_distinct.then(BTreeSet::new),
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            mean: 0.0,
            m2: 0.0,
            l1: 0.0,
            l2: 0.0,
        }
    }

    fn push(&mut self, cell: &Cell, max_distinct: usize) {
        if cell.is_null() {
            self.nulls += 1;
            return;
        }
        let overflowed = match &mut self.distinct {
            Some(distinct) => {
                distinct.insert(cell.to_string());
                distinct.len() > max_distinct
            }
            None => false,
        };
        if overflowed {
            self.distinct = None;
        }
        if !self.column_type.is_numeric() {
            return;
        }
        let Some(value) = cell.as_f64() else {
            return;
        };
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.l1 += value.abs();
        self.l2 += value * value;
    }

    fn finish(self) -> ColumnAnalysis {
        let numeric = (self.count > 0).then(|| NumericStats {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.mean,
            std_dev: (self.m2 / self.count as f64).sqrt(),
            l1_norm: self.l1,
            l2_norm: self.l2.sqrt(),
        });
        ColumnAnalysis {
            column_type: self.column_type,
            nulls: self.nulls,
            distinct: self.distinct,
            numeric,
        }
    }
}
