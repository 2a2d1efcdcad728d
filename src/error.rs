//! Failure taxonomy shared by the dataset tools

use std::{io, path::PathBuf};
use thiserror::Error;

/// Things that can go wrong while converting, reading or previewing datasets
#[derive(Debug, Error)]
pub enum Error {
    /// An input file that the run depends on is not there
    #[error("file {} does not exist", .0.display())]
    MissingFile(PathBuf),

    /// Low-level I/O failure, with a description of what was being done
    #[error("I/O error while {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A line of a JSONL file is not valid JSON
    #[error("malformed JSON record: {0}")]
    Json(#[from] serde_json::Error),

    /// The input records do not carry the field we tokenize
    #[error("records have no 'text' field, available fields: {0:?}")]
    MissingTextField(Vec<String>),

    /// Tokenizer could not be loaded or failed on some input
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// A token id does not fit the dataset's element type
    #[error("token id {id} cannot be stored as {dtype}")]
    TokenOutOfRange { id: i64, dtype: &'static str },

    /// The `.idx` or `.bin` file of an indexed dataset is not well-formed
    #[error("invalid indexed dataset {}: {reason}", .path.display())]
    InvalidIndex { path: PathBuf, reason: String },

    /// Lookup past the end of an indexed dataset
    #[error("sequence index {index} is out of range for a dataset of {len} sequences")]
    IndexOutOfRange { index: isize, len: usize },

    /// Requested table column does not exist
    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    /// Columnar data processing failure
    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet decoding failure
    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),
}
//
impl Error {
    /// Wrap an I/O error with a description of what was being done
    pub fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }

    /// Wrap a tokenizer library error, which only comes as a boxed trait object
    pub fn tokenizer(e: impl std::fmt::Display) -> Self {
        Self::Tokenizer(e.to_string())
    }
}

/// Result type of the library
pub type Result<T, E = Error> = std::result::Result<T, E>;
