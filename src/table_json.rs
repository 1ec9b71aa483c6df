//! Purpose: JSON renderings of tables, rows and cells for CLI output.
//! Exports: `cell_json`, `row_json`, `schema_json`, `table_info_json`, `analysis_json`,
//! `table_output_json`.
//! Role: Keep the CLI's output envelopes consistent across commands.
//! Invariants: Stable key names for table info payloads.
//! Invariants: Dates render as RFC3339 strings; non-finite floats render as null.

use std::path::Path;

use rowstore::api::{Cell, ColumnAnalysis, Row, RowStore, Schema, TableAnalysis};
use serde_json::{Map, Value, json};

pub(crate) fn cell_json(cell: &Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::String(value) => json!(value),
        Cell::Double(value) => json!(value),
        Cell::Float(value) => json!(value),
        Cell::Int(value) => json!(value),
        Cell::Long(value) => json!(value),
        Cell::Byte(value) => json!(value),
        Cell::Boolean(value) => json!(value),
        Cell::Date(_) => json!(cell.to_string()),
        Cell::IndexList(list) => json!(list.indices),
        Cell::WeightedIndexList(list) => Value::Array(
            list.indices
                .iter()
                .map(|item| json!({ "index": item.index, "weight": item.weight }))
                .collect(),
        ),
        Cell::Vector(vector) => json!(vector.data),
        Cell::Matrix(matrix) => json!({
            "rows": matrix.rows,
            "columns": matrix.columns,
            "data": matrix.data,
        }),
        Cell::Tensor(tensor) => json!({
            "depth": tensor.depth,
            "rows": tensor.rows,
            "columns": tensor.columns,
            "data": tensor.data,
        }),
    }
}

pub(crate) fn row_json(row: &Row) -> Value {
    json!({
        "index": row.index,
        "cells": row.cells.iter().map(cell_json).collect::<Vec<_>>(),
    })
}

pub(crate) fn schema_json(schema: &Schema) -> Value {
    let columns = schema
        .columns()
        .iter()
        .map(|column| {
            let mut map = Map::new();
            map.insert("name".to_string(), json!(column.name));
            map.insert("type".to_string(), json!(column.column_type.name()));
            map.insert("target".to_string(), json!(column.is_target));
            map.insert("continuous".to_string(), json!(column.is_continuous()));
            if column.num_distinct > 0 {
                map.insert("num_distinct".to_string(), json!(column.num_distinct));
            }
            Value::Object(map)
        })
        .collect::<Vec<_>>();
    Value::Array(columns)
}

pub(crate) fn table_info_json(path: &Path, store: &RowStore) -> Value {
    let mut map = Map::new();
    map.insert("path".to_string(), json!(path.display().to_string()));
    map.insert("rows".to_string(), json!(store.row_count()));
    map.insert("columns".to_string(), schema_json(store.schema()));
    if let Some(target) = store.target_column_index() {
        map.insert("target_column".to_string(), json!(target));
    }
    map.insert("data_offset".to_string(), json!(store.data_offset()));
    map.insert(
        "blocks".to_string(),
        json!(store.block_index().offsets().len()),
    );
    map.insert(
        "has_categorical_data".to_string(),
        json!(store.has_categorical_data()),
    );
    Value::Object(map)
}

pub(crate) fn analysis_json(analysis: &TableAnalysis) -> Value {
    json!({
        "rows": analysis.rows(),
        "columns": analysis.columns().iter().map(column_analysis_json).collect::<Vec<_>>(),
    })
}

fn column_analysis_json(column: &ColumnAnalysis) -> Value {
    let mut map = Map::new();
    map.insert("type".to_string(), json!(column.column_type.name()));
    map.insert("nulls".to_string(), json!(column.nulls));
    if let Some(distinct) = &column.distinct {
        map.insert("distinct".to_string(), json!(distinct.len()));
    }
    if let Some(stats) = &column.numeric {
        map.insert(
            "numeric".to_string(),
            json!({
                "count": stats.count,
                "min": stats.min,
                "max": stats.max,
                "mean": stats.mean,
                "std_dev": stats.std_dev,
                "l1_norm": stats.l1_norm,
                "l2_norm": stats.l2_norm,
            }),
        );
    }
    Value::Object(map)
}

/// Summary of a table a command just wrote.
pub(crate) fn table_output_json(path: &Path, store: &RowStore) -> Value {
    json!({
        "path": path.display().to_string(),
        "rows": store.row_count(),
        "columns": store.column_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::{cell_json, row_json};
    use rowstore::api::{Cell, FloatMatrix, Row, WeightedIndex, WeightedIndexList};
    use serde_json::json;

    #[test]
    fn cells_render_by_kind() {
        assert_eq!(cell_json(&Cell::Null), json!(null));
        assert_eq!(cell_json(&Cell::Int(3)), json!(3));
        assert_eq!(cell_json(&Cell::Float(f32::NAN)), json!(null));
        let weighted = WeightedIndexList::new(vec![WeightedIndex {
            index: 4,
            weight: 0.5,
        }]);
        assert_eq!(
            cell_json(&Cell::WeightedIndexList(weighted)),
            json!([{ "index": 4, "weight": 0.5 }])
        );
        let matrix = FloatMatrix::new(1, 2, vec![1.0, 2.0]).expect("matrix");
        assert_eq!(
            cell_json(&Cell::Matrix(matrix)),
            json!({ "rows": 1, "columns": 2, "data": [1.0, 2.0] })
        );
    }

    #[test]
    fn rows_carry_their_index() {
        let row = Row::new(9, vec![Cell::String("a".into()), Cell::Boolean(true)]);
        assert_eq!(row_json(&row), json!({ "index": 9, "cells": ["a", true] }));
    }
}
