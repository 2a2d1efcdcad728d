//! Preview of the structure and contents of a Parquet file

pub mod describe;

use self::describe::Description;
use crate::{config::PreviewArgs, truncate_for_display, Error, Result};
use arrow::{
    array::{Array, ArrayRef, AsArray, LargeStringArray, StringArray},
    compute::concat_batches,
    datatypes::DataType,
    record_batch::RecordBatch,
    util::pretty::{pretty_format_batches, pretty_format_columns},
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::{
    fs::File,
    io::{self, ErrorKind, Write},
    path::Path,
    sync::Arc,
};

/// Number of rows and values that are shown
pub const HEAD_ROWS: usize = 5;

/// Number of characters that are shown of each table cell
pub const CELL_WIDTH: usize = 50;

/// Message shown when the previewed file does not exist
pub const MISSING_FILE_MESSAGE: &str = "File not found, please check the file path";

/// Preview a Parquet file according to CLI arguments
pub fn run(args: &PreviewArgs) -> Result<()> {
    let table = Table::open(&args.path)?;
    table.report(&args.column, &mut io::stdout().lock())
}

/// What the user is told when a preview fails
pub fn failure_message(error: &Error) -> String {
    match error {
        Error::MissingFile(_) => MISSING_FILE_MESSAGE.to_owned(),
        other => format!("Failed to read file: {other}"),
    }
}

/// Contents of a Parquet file, loaded in memory
#[derive(Clone, Debug)]
pub struct Table(RecordBatch);
//
impl Table {
    /// Load a Parquet file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::MissingFile(path.to_owned()),
            _ => Error::io(format!("opening {}", path.display()))(e),
        })?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let schema = builder.schema().clone();
        let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;
        log::debug!("Loaded {} record batches from {}", batches.len(), path.display());
        Ok(Self(concat_batches(&schema, &batches)?))
    }

    /// Number of rows and columns
    pub fn shape(&self) -> (usize, usize) {
        (self.0.num_rows(), self.0.num_columns())
    }

    /// Column names with their data type
    pub fn columns(&self) -> impl Iterator<Item = (&str, &DataType)> + '_ {
        self.0
            .schema_ref()
            .fields()
            .iter()
            .map(|field| (field.name().as_str(), field.data_type()))
    }

    /// First rows of the table, with long strings shortened
    pub fn head(&self, rows: usize) -> Result<String> {
        let head = self.0.slice(0, rows.min(self.0.num_rows()));
        let columns = head.columns().iter().map(shorten_strings).collect::<Vec<_>>();
        let head = RecordBatch::try_new(head.schema(), columns)?;
        Ok(pretty_format_batches(&[head])?.to_string())
    }

    /// First values of a column
    pub fn column_head(&self, name: &str, rows: usize) -> Result<String> {
        let column = self
            .0
            .column_by_name(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_owned()))?;
        let head = column.slice(0, rows.min(column.len()));
        Ok(pretty_format_columns(name, &[head])?.to_string())
    }

    /// Summary statistics of the columns
    pub fn describe(&self) -> Result<Description> {
        Description::new(&self.0)
    }

    /// Write a full preview, with the first values of a chosen column
    ///
    /// Sections are written as soon as they are ready, so if one of them
    /// fails, the previous ones have already been written out.
    pub fn report(&self, column: &str, out: &mut impl Write) -> Result<()> {
        let written = |result: io::Result<()>| result.map_err(Error::io("writing the preview"));

        // Structure of the table
        let (rows, columns) = self.shape();
        written(writeln!(out, "Dataset shape: ({rows}, {columns})"))?;
        written(writeln!(out, "\nColumn data types:"))?;
        for (name, data_type) in self.columns() {
            written(writeln!(out, "  {name}: {data_type}"))?;
        }
        let names = self.columns().map(|(name, _)| name).collect::<Vec<_>>();
        written(writeln!(out, "\nColumn names: {names:?}"))?;

        // Contents
        let head = self.head(HEAD_ROWS)?;
        written(writeln!(out, "\nFirst {HEAD_ROWS} rows:\n{head}"))?;
        let column_head = self.column_head(column, HEAD_ROWS)?;
        written(writeln!(out, "\nFirst {HEAD_ROWS} values of column {column}:\n{column_head}"))?;
        let description = self.describe()?;
        written(writeln!(out, "\nSummary statistics:\n{description}"))?;
        written(out.flush())
    }
}

/// Shorten the values of string columns for display, leaving other columns
/// alone
fn shorten_strings(column: &ArrayRef) -> ArrayRef {
    let shorten =
        |value: Option<&str>| value.map(|s| truncate_for_display(s, CELL_WIDTH).into_owned());
    match column.data_type() {
        DataType::Utf8 => Arc::new(
            column
                .as_string::<i32>()
                .iter()
                .map(shorten)
                .collect::<StringArray>(),
        ),
        DataType::LargeUtf8 => Arc::new(
            column
                .as_string::<i64>()
                .iter()
                .map(shorten)
                .collect::<LargeStringArray>(),
        ),
        _ => column.clone(),
    }
}
