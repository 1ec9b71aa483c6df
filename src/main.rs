//! Purpose: `rowstore` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit JSON on stdout (pretty when stdout is a terminal).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All table reads and writes go through `api::RowStore` / `api::TableWriter`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use rowstore::api::{
    Error, ErrorKind, NormalisationModel, NormalisationType, RowStore, Sink, TableOptions,
    index_path_for, to_exit_code,
};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod table_json;

use table_json::{analysis_json, row_json, table_info_json, table_output_json};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome { exit_code });
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint(clap_error_hint(&err)));
            }
        },
    };

    let options = TableOptions::new().with_read_buffer(cli.read_buffer);
    command_dispatch::dispatch_command(cli.command, cli.index, options)
        .map_err(add_corrupt_hint)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "rowstore",
    version,
    about = "Inspect and derive block-indexed row tables",
    long_about = None,
    after_help = r#"EXAMPLES
  $ rowstore info data.tbl
  $ rowstore slice data.tbl --offset 100 --count 5
  $ rowstore split data.tbl --train train.tbl --test test.tbl --fraction 0.8 --seed 7
  $ rowstore normalise data.tbl --output norm.tbl --type standard --model-out model.json

Tables are read with `<table>.idx` as their block index when it exists."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Block index for the input table (default: <table>.idx, rebuilt by scanning if absent)",
        value_hint = ValueHint::FilePath
    )]
    index: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        default_value_t = TableOptions::default().read_buffer,
        help = "Read buffer size in bytes"
    )]
    read_buffer: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum NormalisationCli {
    Standard,
    Manhattan,
    Euclidean,
    FeatureScale,
}

impl From<NormalisationCli> for NormalisationType {
    fn from(value: NormalisationCli) -> Self {
        match value {
            NormalisationCli::Standard => NormalisationType::Standard,
            NormalisationCli::Manhattan => NormalisationType::Manhattan,
            NormalisationCli::Euclidean => NormalisationType::Euclidean,
            NormalisationCli::FeatureScale => NormalisationType::FeatureScale,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Show a table's schema, row count and block layout")]
    Info {
        #[arg(value_hint = ValueHint::FilePath)]
        table: PathBuf,
        #[arg(long, help = "Also scan the table for per-column statistics")]
        analysis: bool,
    },
    #[command(about = "Read rows by index (duplicates allowed, returned in storage order)")]
    Get {
        #[arg(value_hint = ValueHint::FilePath)]
        table: PathBuf,
        #[arg(required = true, num_args = 1.., help = "Row indices")]
        rows: Vec<usize>,
    },
    #[command(about = "Read a run of consecutive rows")]
    Slice {
        #[arg(value_hint = ValueHint::FilePath)]
        table: PathBuf,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    #[command(about = "Rebuild a table's block index by scanning its rows")]
    Reindex {
        #[arg(value_hint = ValueHint::FilePath)]
        table: PathBuf,
        #[arg(long, help = "Index output (default: <table>.idx)", value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },
    #[command(about = "Split rows into training and test tables")]
    Split {
        #[arg(value_hint = ValueHint::FilePath)]
        table: PathBuf,
        #[arg(long, value_hint = ValueHint::FilePath)]
        train: PathBuf,
        #[arg(long, value_hint = ValueHint::FilePath)]
        test: PathBuf,
        #[arg(long, default_value_t = 0.8, help = "Fraction of rows for training, in [0, 1]")]
        fraction: f64,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, help = "Keep storage order instead of shuffling")]
        no_shuffle: bool,
    },
    #[command(about = "Write k (training, validation) table pairs")]
    Fold {
        #[arg(value_hint = ValueHint::FilePath)]
        table: PathBuf,
        #[arg(short, long)]
        k: usize,
        #[arg(long, value_hint = ValueHint::DirPath)]
        output_dir: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, help = "Keep storage order instead of shuffling")]
        no_shuffle: bool,
    },
    #[command(about = "Bootstrap-sample rows with replacement")]
    Bag {
        #[arg(value_hint = ValueHint::FilePath)]
        table: PathBuf,
        #[arg(long, value_hint = ValueHint::FilePath)]
        output: PathBuf,
        #[arg(long, help = "Rows to draw (default: the table's row count)")]
        count: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    #[command(about = "Copy a subset of columns into a new table")]
    Select {
        #[arg(value_hint = ValueHint::FilePath)]
        table: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<usize>,
        #[arg(long, value_hint = ValueHint::FilePath)]
        output: PathBuf,
    },
    #[command(about = "Normalise numeric columns into a new table")]
    Normalise {
        #[arg(value_hint = ValueHint::FilePath)]
        table: PathBuf,
        #[arg(long, value_hint = ValueHint::FilePath)]
        output: PathBuf,
        #[arg(long = "type", value_enum, default_value = "standard", conflicts_with = "model")]
        normalisation: NormalisationCli,
        #[arg(
            long,
            value_delimiter = ',',
            conflicts_with = "model",
            help = "Columns to normalise (default: numeric continuous columns)"
        )]
        columns: Option<Vec<usize>>,
        #[arg(long, help = "Apply a saved model instead of deriving one", value_hint = ValueHint::FilePath)]
        model: Option<PathBuf>,
        #[arg(long, help = "Save the model used", value_hint = ValueHint::FilePath)]
        model_out: Option<PathBuf>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ rowstore completion bash > ~/.local/share/bash-completion/completions/rowstore
  $ rowstore completion fish > ~/.config/fish/completions/rowstore.fish"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn open_table(table: &Path, index: Option<&Path>, options: TableOptions) -> Result<RowStore, Error> {
    match index {
        Some(index) => RowStore::open_path_with_index(table, index, options),
        None => RowStore::open_path(table, options),
    }
}

fn read_model(path: &Path) -> Result<NormalisationModel, Error> {
    let text = fs::read_to_string(path).map_err(|err| Error::from_io(err).with_path(path))?;
    NormalisationModel::from_json(&text).map_err(|err| err.with_path(path))
}

fn write_model(path: &Path, model: &NormalisationModel) -> Result<(), Error> {
    fs::write(path, model.to_json()?).map_err(|err| Error::from_io(err).with_path(path))
}

fn ensure_dir(dir: &Path) -> Result<(), Error> {
    fs::create_dir_all(dir).map_err(|err| Error::from_io(err).with_path(dir))
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Corrupt || err.hint().is_some() {
        return err;
    }
    err.with_hint("The table or its index is damaged; `rowstore reindex <table>` rebuilds the index from the data.")
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Busy => "resource is busy".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Unsupported => "unsupported".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(row) = err.row() {
        inner.insert("row".to_string(), json!(row));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(row) = err.row() {
        lines.push(format!("row: {row}"));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!("offset: {offset}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);
    let Some(usage) = usage else {
        return "Try `rowstore --help`.".to_string();
    };
    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "rowstore") else {
        return "Try `rowstore --help`.".to_string();
    };
    let parts: Vec<&str> = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !token.starts_with('-') && !token.starts_with('<') && !token.starts_with('[')
        })
        .copied()
        .collect();
    if parts.is_empty() {
        return "Try `rowstore --help`.".to_string();
    }
    format!("Try `rowstore {} --help`.", parts.join(" "))
}
