//! Tools for preparing Megatron-LM training data: fetch a dataset from the
//! Hugging Face Hub, tokenize its records into an indexed binary dataset, read
//! sequences back as text, and preview Parquet files.
//!
//! Each tool is a separate binary. They only communicate through files:
//!
//! - `dataset-fetch` writes a split of a Hub dataset as line-delimited JSON
//!   (see [`fetch`]).
//! - `megatron-convert` turns such a file into a `.bin`/`.idx` pair (see
//!   [`convert`] and [`indexed`]).
//! - `megatron-read` decodes one sequence of a `.bin`/`.idx` pair.
//! - `parquet-preview` summarizes a Parquet file (see [`preview`]).

pub mod config;
pub mod convert;
pub mod error;
pub mod fetch;
pub mod indexed;
pub mod preview;
pub mod progress;
pub mod tokenizer;

pub use error::{Error, Result};

use log::LevelFilter;
use std::borrow::Cow;

/// Horizontal rule that frames blocks of console output
pub const RULE: &str = "================================================================================";

/// Number of characters of text that are shown when previewing records
pub const TEXT_PREVIEW_LENGTH: usize = 100;

/// Set up logging
pub fn setup_logging() -> syslog::Result<()> {
    syslog::init(
        syslog::Facility::LOG_USER,
        if cfg!(feature = "log-trace") {
            LevelFilter::Trace
        } else if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        None,
    )
}

/// Set up logging, carrying on without logs if the system logger is not
/// reachable
pub fn init_logging() {
    if let Err(e) = setup_logging() {
        eprintln!(
            "warning: could not connect to the system logger ({e}), logs will not be recorded"
        );
    }
}

/// Report a failure with its whole chain of causes
///
/// The failure is logged and also written to stderr, so that it remains
/// visible when no system logger is available.
pub fn report_failure(what: &str, error: &(dyn std::error::Error + 'static)) {
    log::error!("{what}: {error}");
    eprintln!("\n{RULE}");
    eprintln!("Error: {what}");
    eprintln!("Error message: {error}");
    let mut source = error.source();
    if source.is_some() {
        eprintln!("\nCaused by:");
    }
    let mut depth = 0;
    while let Some(cause) = source {
        log::error!("  caused by: {cause}");
        eprintln!("  {depth}: {cause}");
        source = cause.source();
        depth += 1;
    }
    eprintln!("{RULE}\n");
}

/// Report the failure of one stage of a tool, if it failed
///
/// Tools whose stages depend on each other use this to stop at the first
/// failing stage.
pub fn stage<T>(what: &str, result: Result<T>) -> Option<T> {
    result.map_err(|e| report_failure(what, &e)).ok()
}

/// Shorten text to at most `max_chars` characters for display, marking
/// truncation with an ellipsis
pub fn truncate_for_display(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => Cow::Owned(format!("{}...", &text[..end])),
        None => Cow::Borrowed(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_for_display("short", 10), "short");
        assert_eq!(truncate_for_display("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_for_display("abcdefghijk", 10), "abcdefghij...");
        assert_eq!(truncate_for_display("数据集加载示例", 3), "数据集...");
    }
}
