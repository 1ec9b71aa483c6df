//! Purpose: Hold top-level CLI command dispatch for `rowstore`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command opens its input through `open_table` and emits one JSON value.
//! Invariants: Output tables are written through file sinks with their index alongside.

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    index: Option<PathBuf>,
    options: TableOptions,
) -> Result<RunOutcome, Error> {
    let index = index.as_deref();
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "rowstore", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Info { table, analysis } => {
            let store = open_table(&table, index, options)?;
            let mut value = table_info_json(&table, &store);
            if analysis {
                let stats = store.analysis()?;
                value["analysis"] = analysis_json(&stats);
            }
            emit_json(value);
            Ok(RunOutcome::ok())
        }
        Command::Get { table, rows } => {
            let store = open_table(&table, index, options)?;
            let found = store.get_rows(rows.iter().copied())?;
            if found.len() < rows.len() {
                tracing::warn!(
                    requested = rows.len(),
                    found = found.len(),
                    rows = store.row_count(),
                    "some requested rows are past the end of the table"
                );
            }
            let values = found.iter().map(|row| row_json(row)).collect::<Vec<_>>();
            emit_json(json!({ "rows": values }));
            Ok(RunOutcome::ok())
        }
        Command::Slice {
            table,
            offset,
            count,
        } => {
            let store = open_table(&table, index, options)?;
            let values = store
                .get_slice(offset, count)?
                .iter()
                .map(row_json)
                .collect::<Vec<_>>();
            emit_json(json!({ "rows": values }));
            Ok(RunOutcome::ok())
        }
        Command::Reindex { table, output } => {
            let data = fs::File::open(&table)
                .map_err(|err| Error::from_io(err).with_path(&table))?;
            let store = RowStore::scan(data, options).map_err(|err| err.with_path(&table))?;
            let output = output.unwrap_or_else(|| index_path_for(&table));
            let file = fs::File::create(&output)
                .map_err(|err| Error::from_io(err).with_path(&output))?;
            store
                .write_index_to(&mut io::BufWriter::new(file))
                .map_err(|err| err.with_path(&output))?;
            emit_json(json!({
                "index": output.display().to_string(),
                "rows": store.row_count(),
                "blocks": store.block_index().offsets().len(),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Split {
            table,
            train,
            test,
            fraction,
            seed,
            no_shuffle,
        } => {
            let store = open_table(&table, index, options)?;
            let split = store.split(
                seed,
                fraction,
                !no_shuffle,
                Sink::file(&train),
                Sink::file(&test),
            )?;
            emit_json(json!({
                "training": table_output_json(&train, &split.training),
                "test": table_output_json(&test, &split.test),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Fold {
            table,
            k,
            output_dir,
            seed,
            no_shuffle,
        } => {
            let store = open_table(&table, index, options)?;
            ensure_dir(&output_dir)?;
            let mut folds = Vec::with_capacity(k);
            for (i, fold) in store.fold(k, seed, !no_shuffle)?.enumerate() {
                let fold = fold?;
                let training_path = output_dir.join(format!("fold-{i}-training.tbl"));
                let validation_path = output_dir.join(format!("fold-{i}-validation.tbl"));
                let training = fold.training.write_to(Sink::file(&training_path))?;
                let validation = fold.validation.write_to(Sink::file(&validation_path))?;
                folds.push(json!({
                    "training": table_output_json(&training_path, &training),
                    "validation": table_output_json(&validation_path, &validation),
                }));
            }
            emit_json(json!({ "folds": folds }));
            Ok(RunOutcome::ok())
        }
        Command::Bag {
            table,
            output,
            count,
            seed,
        } => {
            let store = open_table(&table, index, options)?;
            let bagged = store.bag(count, seed, Sink::file(&output))?;
            emit_json(json!({ "output": table_output_json(&output, &bagged) }));
            Ok(RunOutcome::ok())
        }
        Command::Select {
            table,
            columns,
            output,
        } => {
            let store = open_table(&table, index, options)?;
            let selected = store.select_columns(&columns, Sink::file(&output))?;
            emit_json(json!({ "output": table_output_json(&output, &selected) }));
            Ok(RunOutcome::ok())
        }
        Command::Normalise {
            table,
            output,
            normalisation,
            columns,
            model,
            model_out,
        } => {
            let store = open_table(&table, index, options)?;
            let model = match model {
                Some(path) => read_model(&path)?,
                None => store.normalisation_model(normalisation.into(), columns.as_deref())?,
            };
            let normalised = store.normalise_with(&model, Sink::file(&output))?;
            if let Some(path) = &model_out {
                write_model(path, &model)?;
            }
            emit_json(json!({
                "output": table_output_json(&output, &normalised),
                "model": serde_json::to_value(&model).unwrap_or(Value::Null),
            }));
            Ok(RunOutcome::ok())
        }
    }
}
