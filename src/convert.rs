//! Streaming conversion of line-delimited JSON records into an indexed
//! dataset of token sequences
//!
//! Failures are handled differently depending on the stage where they occur:
//!
//! - Setup failures (missing input, records without a text field, unusable
//!   output location) abort the run before anything is written.
//! - Record failures (malformed JSON, tokenization errors) are counted, and
//!   processing goes on until more than [`MAX_ERRORS`] of them were seen.
//! - Finalization failures are kept in [`RunStats`] so that the counts of a
//!   partially written dataset are still reported.

use crate::{
    config::ConvertConfig,
    error::{Error, Result},
    indexed::{data_file_path, index_file_path, IndexedDatasetBuilder},
    progress::{ProgressConfig, ProgressReport, ProgressTracker, Work},
    tokenizer::TextTokenizer,
    truncate_for_display, RULE, TEXT_PREVIEW_LENGTH,
};
use indicatif::HumanCount;
use serde_json::Value;
use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader, ErrorKind},
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

/// Number of record errors that are tolerated before giving up
pub const MAX_ERRORS: usize = 100;

/// Interval between progress statistics updates
pub const SHOW_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Interval between previews of the text being processed
pub const SHOW_TEXT_INTERVAL: Duration = Duration::from_secs(60);

/// Name of the record field that holds the text to be tokenized
pub const TEXT_FIELD: &str = "text";

/// Conversion whose input has been checked, ready to run
#[derive(Debug)]
pub struct Conversion {
    /// Conversion configuration
    config: Arc<ConvertConfig>,

    /// Reader over the input records
    input: BufReader<File>,

    /// Size of the input in bytes
    input_len: u64,
}
//
impl Conversion {
    /// Check the input and prepare the output directory
    ///
    /// The first record of the input must have a `text` field, otherwise the
    /// fields that it does have are reported.
    pub fn open(config: Arc<ConvertConfig>) -> Result<Self> {
        // Prepare the output location
        std::fs::create_dir_all(&config.output_dir)
            .map_err(Error::io(format!("creating {}", config.output_dir.display())))?;

        // Check the input
        let input_path = &config.input_path;
        let file = File::open(input_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::MissingFile(input_path.clone()),
            _ => Error::io(format!("opening {}", input_path.display()))(e),
        })?;
        let input_len = file
            .metadata()
            .map_err(Error::io(format!("inspecting {}", input_path.display())))?
            .len();
        check_text_field(input_path)?;
        log::info!(
            "Converting {} ({} bytes) as dataset {}",
            input_path.display(),
            input_len,
            config.dataset_name
        );
        Ok(Self {
            config,
            input: BufReader::new(file),
            input_len,
        })
    }

    /// Tokenize every record into the output dataset
    ///
    /// The output dataset is finalized exactly once, even if processing stops
    /// early because of too many record errors.
    pub fn run(self, tokenizer: &TextTokenizer, report: &ProgressReport) -> Result<RunStats> {
        let Self {
            config,
            mut input,
            input_len,
        } = self;

        // Set up the output
        let prefix = config.output_prefix();
        let mut builder = IndexedDatasetBuilder::new(data_file_path(&prefix), config.dtype)?;
        log::info!("Created indexed dataset builder with element type {}", config.dtype);

        // Process records
        let tracker = report.add(
            "Processing records",
            ProgressConfig::new(Work::Bytes(input_len)).show_message(),
        );
        let mut stats = RunStats::default();
        let mut displays = PeriodicDisplays::default();
        let mut line = Vec::new();
        let mut position = 0u64;
        loop {
            // Fetch the next record
            line.clear();
            match input.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(read) => position += read as u64,
                Err(e) => {
                    let e = Error::io(format!("reading {}", config.input_path.display()))(e);
                    log::error!("Stopping early: {e}");
                    tracker.println(format!("Stopping early: {e}"));
                    stats.stopped_early = true;
                    break;
                }
            }
            tracker.set_progress(position);
            let record = line.trim_ascii();
            if record.is_empty() {
                continue;
            }
            let index = stats.records;
            stats.records += 1;

            // Tokenize it and handle the outcome
            match process_record(record, tokenizer, &mut builder) {
                Ok(RecordOutcome::Accepted { text, num_tokens }) => {
                    stats.accepted += 1;
                    stats.total_tokens += num_tokens as u64;
                    displays.show(&tracker, &stats, index, &text);
                }
                Ok(RecordOutcome::Skipped(reason)) => {
                    stats.skipped += 1;
                    log::debug!("Skipped record {index}: {reason}");
                    tracker.println(format!("Skipping record {index}: {reason}"));
                }
                Err(e) => {
                    stats.errors += 1;
                    log::warn!("Error while processing record {index}: {e}");
                    tracker.println(format!("Error while processing record {index}: {e}"));
                    if stats.errors > MAX_ERRORS {
                        log::error!("Too many errors, stopping");
                        tracker.println("Too many errors, stopping");
                        stats.stopped_early = true;
                        break;
                    }
                }
            }
        }
        tracker.finish();

        // Finish the dataset
        builder.end_document();
        if let Err(e) = builder.finalize(&index_file_path(&prefix)) {
            log::error!("Error while finalizing the dataset: {e}");
            stats.finalize_error = Some(e);
        }
        Ok(stats)
    }
}

/// Check that the first record of a line-delimited JSON file has a text field
fn check_text_field(path: &Path) -> Result<()> {
    let file = File::open(path).map_err(Error::io(format!("opening {}", path.display())))?;
    for line in BufReader::new(file).split(b'\n') {
        let line = line.map_err(Error::io(format!("reading {}", path.display())))?;
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_slice::<serde_json::Map<String, Value>>(line)?;
        if record.contains_key(TEXT_FIELD) {
            return Ok(());
        }
        return Err(Error::MissingTextField(record.keys().cloned().collect()));
    }
    // Empty inputs produce an empty dataset
    Ok(())
}

/// What happened to an input record
#[derive(Clone, Debug, Eq, PartialEq)]
enum RecordOutcome {
    /// Record was added to the dataset
    Accepted {
        /// Text of the record
        text: String,

        /// Number of tokens that the text was turned into
        num_tokens: usize,
    },

    /// Record was left out of the dataset
    Skipped(SkipReason),
}

/// Reasons why a record can be left out of the dataset
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// The text field is missing, not a string, or blank
    NoText,

    /// The text turned into zero tokens
    NoTokens,
}
//
impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoText => f.write_str("text is empty or not a string"),
            Self::NoTokens => f.write_str("text tokenized to zero tokens"),
        }
    }
}

/// Tokenize one record and append it to the dataset
fn process_record(
    record: &[u8],
    tokenizer: &TextTokenizer,
    builder: &mut IndexedDatasetBuilder,
) -> Result<RecordOutcome> {
    let record = serde_json::from_slice::<Value>(record)?;
    let Some(text) = record.get(TEXT_FIELD).and_then(Value::as_str) else {
        return Ok(RecordOutcome::Skipped(SkipReason::NoText));
    };
    if text.trim().is_empty() {
        return Ok(RecordOutcome::Skipped(SkipReason::NoText));
    }
    let tokens = tokenizer.encode(text)?;
    if tokens.is_empty() {
        return Ok(RecordOutcome::Skipped(SkipReason::NoTokens));
    }
    builder.add_item(&tokens)?;
    Ok(RecordOutcome::Accepted {
        text: text.to_owned(),
        num_tokens: tokens.len(),
    })
}

/// Rate limiter for the progress statistics and text previews
#[derive(Debug, Default)]
struct PeriodicDisplays {
    /// Last time progress statistics were updated
    last_progress: Option<Instant>,

    /// Last time a text preview was shown
    last_text: Option<Instant>,
}
//
impl PeriodicDisplays {
    /// Update whatever display is due after a record has been accepted
    fn show(&mut self, tracker: &ProgressTracker, stats: &RunStats, index: usize, text: &str) {
        let now = Instant::now();
        let due = |last: Option<Instant>, interval: Duration| {
            last.map_or(true, |last| now - last >= interval)
        };
        if due(self.last_progress, SHOW_PROGRESS_INTERVAL) {
            tracker.set_message(format!(
                "tokens: {}, errors: {}, average: {}",
                HumanCount(stats.total_tokens),
                stats.errors,
                HumanCount(stats.average_tokens()),
            ));
            self.last_progress = Some(now);
        }
        if due(self.last_text, SHOW_TEXT_INTERVAL) {
            tracker.println(format!(
                "\n{RULE}\nProcessing text (record {}):\n{}\n{RULE}\n",
                index + 1,
                truncate_for_display(text, TEXT_PREVIEW_LENGTH)
            ));
            self.last_text = Some(now);
        }
    }
}

/// Statistics of a conversion run
#[derive(Debug, Default)]
pub struct RunStats {
    /// Number of non-blank input lines
    pub records: usize,

    /// Number of records added to the dataset
    pub accepted: usize,

    /// Number of records left out because they had no usable text
    pub skipped: usize,

    /// Number of records that could not be processed
    pub errors: usize,

    /// Number of tokens added to the dataset
    pub total_tokens: u64,

    /// Truth that processing stopped before the end of the input
    pub stopped_early: bool,

    /// Failure to finalize the dataset, if any
    pub finalize_error: Option<Error>,
}
//
impl RunStats {
    /// Number of records that did not fail
    pub fn processed(&self) -> usize {
        self.records - self.errors
    }

    /// Average number of tokens per input record
    pub fn average_tokens(&self) -> u64 {
        self.total_tokens.checked_div(self.records as u64).unwrap_or(0)
    }

    /// Print the final report of a run
    pub fn print_summary(&self, config: &ConvertConfig) {
        let prefix = config.output_prefix();
        let processed = self.processed();
        let average = self.total_tokens.checked_div(processed as u64).unwrap_or(0);
        println!("\n{RULE}");
        println!("Data conversion of {} complete!", config.dataset_name);
        println!("Processed {} records", HumanCount(processed as u64));
        println!("Total: {} tokens", HumanCount(self.total_tokens));
        println!("Average: {} tokens per record", HumanCount(average));
        println!(
            "Output files: {} and {}",
            data_file_path(&prefix).display(),
            index_file_path(&prefix).display()
        );
        if self.skipped > 0 {
            println!("Left out {} records without usable text", HumanCount(self.skipped as u64));
        }
        if self.errors > 0 {
            log::warn!("Skipped {} problematic records", self.errors);
            println!("Warning: skipped {} problematic records", HumanCount(self.errors as u64));
        }
        if self.stopped_early {
            println!("Warning: processing stopped before the end of the input");
        }
        if let Some(e) = &self.finalize_error {
            println!("Warning: the dataset could not be finalized: {e}");
        }
        println!("{RULE}\n");
        log::info!(
            "Converted {processed} records into {} tokens ({} errors)",
            self.total_tokens,
            self.errors
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{indexed::DType, tokenizer::testing};

    fn tokenizer() -> TextTokenizer {
        TextTokenizer::load(testing::TOKENIZER).unwrap()
    }

    fn builder(dir: &Path) -> IndexedDatasetBuilder {
        IndexedDatasetBuilder::new(dir.join("out.bin"), DType::I32).unwrap()
    }

    #[test]
    fn records_without_text_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = tokenizer();
        let mut builder = builder(dir.path());
        for record in [
            r#"{"id": 1}"#,
            r#"{"text": null}"#,
            r#"{"text": 42}"#,
            r#"{"text": "  \n "}"#,
            r#"["text"]"#,
        ] {
            assert_eq!(
                process_record(record.as_bytes(), &tokenizer, &mut builder).unwrap(),
                RecordOutcome::Skipped(SkipReason::NoText),
                "{record}"
            );
        }
        assert_eq!(builder.num_sequences(), 0);
    }

    #[test]
    fn accepted_and_failed_records() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = tokenizer();
        let mut builder = builder(dir.path());
        assert_eq!(
            process_record(
                br#"{"text": "the quick brown fox", "id": 3}"#,
                &tokenizer,
                &mut builder
            )
            .unwrap(),
            RecordOutcome::Accepted {
                text: "the quick brown fox".into(),
                num_tokens: 4
            }
        );
        let error = process_record(b"{not json", &tokenizer, &mut builder).unwrap_err();
        assert!(matches!(error, Error::Json(_)));
        assert!(
            error.to_string().starts_with("malformed JSON record: key must be a string at line 1"),
            "{error}"
        );
        assert!(matches!(
            process_record(br#"{"text": "lazy dog"}"#, &tokenizer, &mut builder),
            Err(Error::Tokenizer(_))
        ));
        assert_eq!(builder.num_sequences(), 1);
    }

    #[test]
    fn text_field_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, "\n{\"content\": \"a\", \"id\": 1}\n{\"text\": \"b\"}\n").unwrap();
        match check_text_field(&path) {
            Err(Error::MissingTextField(fields)) => assert_eq!(fields, ["content", "id"]),
            other => panic!("unexpected outcome {other:?}"),
        }
        std::fs::write(&path, "{\"text\": \"b\"}\n").unwrap();
        check_text_field(&path).unwrap();
        std::fs::write(&path, "").unwrap();
        check_text_field(&path).unwrap();
    }

    #[test]
    fn averages() {
        let stats = RunStats {
            records: 4,
            errors: 1,
            total_tokens: 10,
            ..RunStats::default()
        };
        assert_eq!(stats.processed(), 3);
        assert_eq!(stats.average_tokens(), 2);
        assert_eq!(RunStats::default().average_tokens(), 0);
    }
}
