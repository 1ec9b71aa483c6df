//! Purpose: Derive new tables from an existing one.
//! Exports: `TrainTestSplit`, `Fold`, `Folds`, `ClassTable`, `Classified`, `RowClassifier`.
//! Role: Every derivation picks row indices or a row mutation and drives a `TableWriter`.
//! Invariants: A derived table is returned only after its writer consumed every input row.
//! Invariants: Indexed copies go through `get_rows`, so repeated indices decode once per batch.
//! Invariants: No stream lock is held while a writer or caller closure runs.

use tracing::info;

use crate::core::cell::Cell;
use crate::core::error::{Error, ErrorKind};
use crate::core::format::BLOCK_SIZE;
use crate::core::normalise::{NormalisationModel, NormalisationType};
use crate::core::row::Row;
use crate::core::sampling::{bootstrap, permutation, resolve_seed};
use crate::core::schema::Schema;
use crate::core::store::RowStore;
use crate::core::writer::{Sink, TableWriter};

/// Requested indices handed to one `get_rows` call when copying.
const COPY_BATCH: usize = BLOCK_SIZE * 16;

#[derive(Debug)]
pub struct TrainTestSplit {
    pub training: RowStore,
    pub test: RowStore,
}

#[derive(Debug)]
pub struct Fold {
    pub training: RowStore,
    pub validation: RowStore,
}

/// One binary table per distinct target value.
#[derive(Debug)]
pub struct ClassTable {
    pub classification: String,
    pub table: RowStore,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Classified {
    pub row: Row,
    pub classification: String,
}

pub trait RowClassifier {
    /// Candidate labels with their weights; the heaviest wins.
    fn classify(&self, row: &Row) -> Vec<(String, f32)>;
}

/// Lazily materialized k-fold partitions, one fold per `next`.
pub struct Folds<'a> {
    store: &'a RowStore,
    order: Vec<usize>,
    size: usize,
    k: usize,
    next: usize,
}

impl Folds<'_> {
    pub fn fold_size(&self) -> usize {
        self.size
    }

    fn materialize(&self, fold: usize) -> Result<Fold, Error> {
        let start = fold * self.size;
        let end = start + self.size;
        let validation = &self.order[start..end];
        let training: Vec<usize> = self.order[..start]
            .iter()
            .chain(&self.order[end..])
            .copied()
            .collect();
        Ok(Fold {
            training: self.store.copy_rows(&training, Sink::Memory)?,
            validation: self.store.copy_rows(validation, Sink::Memory)?,
        })
    }
}

impl Iterator for Folds<'_> {
    type Item = Result<Fold, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.k {
            return None;
        }
        let fold = self.next;
        self.next += 1;
        Some(self.materialize(fold))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.k - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Folds<'_> {}

impl RowStore {
    /// Copies every row into `sink` in storage order.
    pub fn write_to(&self, sink: Sink) -> Result<RowStore, Error> {
        let mut writer = self.writer(self.schema().clone(), sink)?;
        self.iterate(|row| {
            writer.process(&row)?;
            Ok(true)
        })?;
        writer.finish()
    }

    pub fn split(
        &self,
        seed: Option<u64>,
        train_fraction: f64,
        shuffle: bool,
        training: Sink,
        test: Sink,
    ) -> Result<TrainTestSplit, Error> {
        if !(0.0..=1.0).contains(&train_fraction) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("train fraction {train_fraction} is outside [0, 1]")));
        }
        let seed = resolve_seed(seed)?;
        let rows = self.row_count();
        let order = permutation(rows, shuffle, seed);
        let cut = ((rows as f64 * train_fraction).round_ties_even() as usize).min(rows);
        info!(rows, training = cut, test = rows - cut, seed, shuffle, "splitting table");
        Ok(TrainTestSplit {
            training: self.copy_rows(&order[..cut], training)?,
            test: self.copy_rows(&order[cut..], test)?,
        })
    }

    /// `k` folds of `row_count / k` validation rows each.
    ///
    /// The `row_count % k` rows past the last fold are never validated; they stay in
    /// every training set.
    pub fn fold(&self, k: usize, seed: Option<u64>, shuffle: bool) -> Result<Folds<'_>, Error> {
        let rows = self.row_count();
        if k == 0 || k > rows {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("cannot make {k} folds from {rows} rows"))
                .with_hint("Use a fold count between 1 and the number of rows."));
        }
        let seed = resolve_seed(seed)?;
        let size = rows / k;
        info!(rows, k, fold_size = size, seed, shuffle, "folding table");
        Ok(Folds {
            store: self,
            order: permutation(rows, shuffle, seed),
            size,
            k,
            next: 0,
        })
    }

    /// Bootstrap sample of `count` rows (default: `row_count`) drawn with replacement.
    pub fn bag(&self, count: Option<usize>, seed: Option<u64>, sink: Sink) -> Result<RowStore, Error> {
        let seed = resolve_seed(seed)?;
        let rows = self.row_count();
        let count = count.unwrap_or(rows);
        if rows == 0 && count > 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("cannot sample rows from an empty table"));
        }
        info!(rows, count, seed, "bagging table");
        self.copy_rows(&bootstrap(rows, count, seed), sink)
    }

    /// Rewrites each row with `mutator`; `None` drops the row.
    ///
    /// The output schema comes from the first produced row: cell kinds give the column
    /// types, names and target flags are taken from the source columns at the same
    /// position. A later row whose cell kinds differ fails with `Unsupported`.
    pub fn project<F>(&self, mut mutator: F, sink: Sink) -> Result<RowStore, Error>
    where
        F: FnMut(&Row) -> Option<Vec<Cell>>,
    {
        let mut writer = TableWriter::with_options(Schema::default(), sink, self.options())?;
        let mut first = true;
        self.iterate(|row| {
            let Some(cells) = mutator(&row) else {
                return Ok(true);
            };
            if first {
                for (i, cell) in cells.iter().enumerate() {
                    let (name, is_target) = match self.schema().column(i) {
                        Some(column) => (column.name.clone(), column.is_target),
                        None => (format!("column{i}"), false),
                    };
                    writer.add_column(name, cell.column_type(), is_target)?;
                }
                if writer.schema().is_zero_width() {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message("projected rows hold no stored cells")
                        .with_row(row.index as u64));
                }
                first = false;
            } else {
                check_projected(writer.schema(), &cells, row.index)?;
            }
            writer.add_row(cells)?;
            Ok(true)
        })?;
        writer.finish()
    }

    pub fn select_columns(&self, columns: &[usize], sink: Sink) -> Result<RowStore, Error> {
        let schema = self.schema().select(columns)?;
        let mut writer = self.writer(schema, sink)?;
        self.iterate(|row| {
            let cells: Vec<Cell> = columns.iter().map(|&i| row.cells[i].clone()).collect();
            writer.add_row(cells)?;
            Ok(true)
        })?;
        writer.finish()
    }

    /// Copies the listed rows; indices past the end are skipped.
    pub fn copy_with_rows<I>(&self, rows: I, sink: Sink) -> Result<RowStore, Error>
    where
        I: IntoIterator<Item = usize>,
    {
        let rows: Vec<usize> = rows.into_iter().collect();
        self.copy_rows(&rows, sink)
    }

    /// Side-by-side concatenation, as long as the shorter table.
    pub fn zip(&self, other: &RowStore, sink: Sink) -> Result<RowStore, Error> {
        let mut writer = self.writer(self.schema().concat(other.schema()), sink)?;
        let rows = self.row_count().min(other.row_count());
        let mut offset = 0;
        while offset < rows {
            let count = BLOCK_SIZE.min(rows - offset);
            let left = self.get_slice(offset, count)?;
            let right = other.get_slice(offset, count)?;
            for (left, right) in left.into_iter().zip(right) {
                let mut cells = left.cells;
                cells.extend(right.cells);
                writer.add_row(cells)?;
            }
            offset += count;
        }
        writer.finish()
    }

    /// Model for `columns` (default: numeric continuous columns) from this table's statistics.
    pub fn normalisation_model(
        &self,
        normalisation_type: NormalisationType,
        columns: Option<&[usize]>,
    ) -> Result<NormalisationModel, Error> {
        let columns = match columns {
            Some(columns) => columns.to_vec(),
            None => NormalisationModel::default_columns(self.schema()),
        };
        let analysis = self.analysis()?;
        NormalisationModel::from_analysis(&analysis, self.schema(), normalisation_type, &columns)
    }

    pub fn normalise(
        &self,
        normalisation_type: NormalisationType,
        columns: Option<&[usize]>,
        sink: Sink,
    ) -> Result<RowStore, Error> {
        let model = self.normalisation_model(normalisation_type, columns)?;
        self.normalise_with(&model, sink)
    }

    pub fn normalise_with(&self, model: &NormalisationModel, sink: Sink) -> Result<RowStore, Error> {
        let schema = model.output_schema(self.schema())?;
        info!(
            rows = self.row_count(),
            columns = model.columns.len(),
            normalisation = ?model.normalisation_type,
            "normalising table"
        );
        let mut writer = self.writer(schema, sink)?;
        self.iterate(|row| {
            writer.add_row(model.apply(&row)?)?;
            Ok(true)
        })?;
        writer.finish()
    }

    /// One in-memory table per distinct target value, with the target replaced by
    /// a Boolean "is this class" flag.
    pub fn convert_to_binary_classification(&self) -> Result<Vec<ClassTable>, Error> {
        let target = self.target_column_index().ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message("table has no columns")
        })?;
        let analysis = self.analysis()?;
        let classes = analysis
            .column(target)
            .and_then(|column| column.distinct.clone())
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message("target column has too many distinct values")
                    .with_hint("Raise max_distinct in the table options.")
            })?;
        let mut out = Vec::with_capacity(classes.len());
        for classification in classes {
            let table = self.project(
                |row| {
                    let mut cells = row.cells.clone();
                    let is_class = cells[target].to_string() == classification;
                    cells[target] = Cell::Boolean(is_class);
                    Some(cells)
                },
                Sink::Memory,
            )?;
            out.push(ClassTable {
                classification,
                table,
            });
        }
        Ok(out)
    }

    /// Best label per row, in storage order. `progress` sees the fraction done.
    pub fn classify<C>(
        &self,
        classifier: &C,
        mut progress: Option<&mut dyn FnMut(f32)>,
    ) -> Result<Vec<Classified>, Error>
    where
        C: RowClassifier + ?Sized,
    {
        let total = self.row_count() as f32;
        let mut out = Vec::with_capacity(self.row_count());
        self.iterate(|row| {
            let classification = classifier
                .classify(&row)
                .into_iter()
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(label, _)| label)
                .unwrap_or_default();
            if let Some(progress) = progress.as_deref_mut() {
                progress((row.index + 1) as f32 / total);
            }
            out.push(Classified {
                row,
                classification,
            });
            Ok(true)
        })?;
        Ok(out)
    }

    fn writer(&self, schema: Schema, sink: Sink) -> Result<TableWriter, Error> {
        TableWriter::with_options(schema, sink, self.options())
    }

    fn copy_rows(&self, rows: &[usize], sink: Sink) -> Result<RowStore, Error> {
        let mut writer = self.writer(self.schema().clone(), sink)?;
        for batch in rows.chunks(COPY_BATCH) {
            for row in self.get_rows(batch.iter().copied())? {
                writer.process(&row)?;
            }
        }
        writer.finish()
    }
}

fn check_projected(schema: &Schema, cells: &[Cell], row: usize) -> Result<(), Error> {
    for (column, cell) in schema.columns().iter().zip(cells) {
        if column.column_type != cell.column_type() {
            return Err(Error::new(ErrorKind::Unsupported)
                .with_message(format!(
                    "projected column {} was inferred as {} but row holds {}",
                    column.name,
                    column.column_type,
                    cell.column_type()
                ))
                .with_row(row as u64));
        }
    }
    Ok(())
}
