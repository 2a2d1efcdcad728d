//! Fetching of Hugging Face Hub datasets into line-delimited JSON
//!
//! The data files of a dataset repository are grouped into splits according
//! to their path, downloaded into a local cache, and then read back record by
//! record. Every split gets summarized, and one of them is also saved as a
//! JSON Lines file whose first records are finally shown.

pub mod download;
pub mod hub;
pub mod shard;
pub mod summary;

use self::{hub::Hub, shard::Shard, summary::SplitSummary};
use crate::{
    config::{FetchConfig, DEFAULT_SPLIT},
    progress::{ProgressConfig, ProgressReport, Work},
    report_failure, truncate_for_display, TEXT_PREVIEW_LENGTH,
};
use anyhow::Context;
use dialoguer::FuzzySelect;
use futures::TryStreamExt;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt::Write as _,
    io::IsTerminal,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter},
};

/// Record of a dataset, as a JSON object
pub type Record = serde_json::Map<String, Value>;

/// Number of saved records that are displayed at the end
pub const SHOWN_RECORDS: usize = 5;

/// Data files of one split
pub type Split = (Box<str>, Vec<Shard>);

/// Fetch a dataset, summarize its splits and save one of them
pub async fn run(config: Arc<FetchConfig>) -> anyhow::Result<()> {
    // Prepare the output directory
    fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("creating output directory {}", config.output_dir.display()))?;

    // Find out which data files the dataset has
    println!("Loading dataset {}...", config.dataset_id);
    let hub = Hub::new(&config);
    let files = hub.dataset_files(&config.dataset_id, &config.revision).await?;
    let splits = group_splits(files.iter().map(|file| &**file));
    anyhow::ensure!(
        !splits.is_empty(),
        "dataset {} has no data file in a supported format (Parquet, JSON Lines, CSV or TSV)",
        config.dataset_id
    );
    let saved_split = choose_split(&config, &splits)?;

    // Make all data files available locally
    let report = ProgressReport::new();
    let shards = splits
        .iter()
        .flat_map(|(_split, shards)| shards.iter().cloned())
        .collect::<Vec<_>>();
    let mut local_paths = download::download_all(config.clone(), hub, &shards, &report)
        .await?
        .into_iter();
    println!("Dataset loaded successfully!");
    println!("\nDataset info:");

    // Go through every split, saving the selected one along the way
    let output_path = config.output_file();
    for (split, shards) in &splits {
        let paths = local_paths.by_ref().take(shards.len()).collect::<Vec<_>>();
        let mut output = if *split == saved_split {
            Some(SplitWriter::create(output_path.clone()).await?)
        } else {
            None
        };
        let summary = read_split(split, shards, &paths, output.as_mut(), &report).await?;
        if let Some(output) = output {
            output.finish().await?;
        }
        println!("\n{summary}");
    }
    println!("\nSaved {saved_split} split to {}", output_path.display());

    // Show what was saved
    println!("\nFirst {SHOWN_RECORDS} records of {}:", output_path.display());
    if let Err(e) = show_first_records(&output_path, SHOWN_RECORDS).await {
        report_failure("Failed to show the saved records", &*e);
    }
    Ok(())
}

/// Recognize the data files among the files of a dataset repository and
/// group them by split, in display order
pub fn group_splits<'a>(files: impl IntoIterator<Item = &'a str>) -> Vec<Split> {
    let mut splits = BTreeMap::<Box<str>, Vec<Shard>>::new();
    for file in files {
        match Shard::from_repo_path(file) {
            Some(shard) => splits.entry(shard.split.clone()).or_default().push(shard),
            None => log::trace!("Ignoring non-data file {file}"),
        }
    }
    let mut splits = splits.into_iter().collect::<Vec<_>>();
    splits.sort_by(|(a, _), (b, _)| shard::split_order(a, b));
    for (_split, shards) in &mut splits {
        shards.sort_by(|a, b| a.path.cmp(&b.path));
    }
    splits
}

/// Decide which split gets saved
///
/// When no split was requested and the dataset has no default split, the
/// user is asked to pick one if a terminal is attached.
fn choose_split(config: &FetchConfig, splits: &[Split]) -> anyhow::Result<Box<str>> {
    let names = splits.iter().map(|(name, _)| &**name).collect::<Vec<_>>();
    let wanted = config.split.as_deref().unwrap_or(DEFAULT_SPLIT);
    if names.contains(&wanted) {
        return Ok(wanted.into());
    }
    if config.split.is_none() && std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        println!("Dataset {} has no {wanted} split", config.dataset_id);
        let idx = prompt_split(&names).context("asking which split should be saved")?;
        return Ok(names[idx].into());
    }
    anyhow::bail!(
        "dataset {} has no {wanted} split, available splits are: {}",
        config.dataset_id,
        names.join(", ")
    )
}

/// Ask the user to select a split
fn prompt_split(names: &[&str]) -> dialoguer::Result<usize> {
    FuzzySelect::new()
        .with_prompt("Which split should I save?")
        .items(names)
        .default(0)
        .max_length(usize::MAX)
        .interact()
}

/// Read every record of a split, summarizing it and optionally saving it
async fn read_split(
    split: &str,
    shards: &[Shard],
    paths: &[PathBuf],
    mut output: Option<&mut SplitWriter>,
    report: &ProgressReport,
) -> anyhow::Result<SplitSummary> {
    let files = report.add(
        format!("Reading {split} split"),
        ProgressConfig::new(Work::Steps(shards.len())),
    );
    let mut summary = SplitSummary::new(split);
    for (shard, path) in shards.iter().zip(paths) {
        let mut records = shard::open_records(path, shard.format).await?;
        while let Some(record) = records.try_next().await? {
            summary.observe(&record);
            if let Some(output) = &mut output {
                output.write(&record).await?;
            }
        }
        log::debug!(
            "Read {} ({:?}), {split} split now has {} records",
            shard.path,
            shard.format,
            summary.num_rows()
        );
        files.make_progress(1);
    }
    Ok(summary)
}

/// JSON Lines file that a split is being saved into
///
/// Records first go into a temporary file, which only gets its final name
/// once the whole split has been written.
#[derive(Debug)]
struct SplitWriter {
    /// Final location of the file
    path: PathBuf,

    /// Temporary location of the file while it is being written
    partial_path: PathBuf,

    /// Buffered output
    file: BufWriter<File>,

    /// Serialization buffer for the current line
    line: Vec<u8>,
}
//
impl SplitWriter {
    /// Start writing a split
    async fn create(path: PathBuf) -> anyhow::Result<Self> {
        let mut partial_path = path.as_os_str().to_owned();
        partial_path.push(".part");
        let partial_path = PathBuf::from(partial_path);
        let file = File::create(&partial_path)
            .await
            .with_context(|| format!("creating output file {}", partial_path.display()))?;
        Ok(Self {
            path,
            partial_path,
            file: BufWriter::new(file),
            line: Vec::new(),
        })
    }

    /// Append a record
    async fn write(&mut self, record: &Record) -> anyhow::Result<()> {
        self.line.clear();
        serde_json::to_writer(&mut self.line, record).context("serializing a record")?;
        self.line.push(b'\n');
        self.file
            .write_all(&self.line)
            .await
            .with_context(|| format!("writing to {}", self.partial_path.display()))
    }

    /// Finish writing and move the file to its final location
    async fn finish(mut self) -> anyhow::Result<()> {
        let context = || format!("finishing output file {}", self.path.display());
        self.file.flush().await.with_context(context)?;
        self.file.get_ref().sync_all().await.with_context(context)?;
        fs::rename(&self.partial_path, &self.path)
            .await
            .with_context(context)
    }
}

/// Display the first records of a JSON Lines file
pub async fn show_first_records(path: &Path, count: usize) -> anyhow::Result<()> {
    let file = File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut number = 0;
    while number < count {
        let Some(line) = lines
            .next_line()
            .await
            .with_context(|| format!("reading {}", path.display()))?
        else {
            break;
        };
        number += 1;
        println!("{}", describe_line(number, &line));
    }
    Ok(())
}

/// Describe one line of a JSON Lines file, shortening long values
fn describe_line(number: usize, line: &str) -> String {
    let mut description = format!("Record {number}:");
    let record = match serde_json::from_str::<Record>(line) {
        Ok(record) => record,
        Err(e) => {
            let _ = write!(description, " not a JSON object ({e})");
            return description;
        }
    };
    for (field, value) in &record {
        let value = match value {
            Value::String(s) => truncate_for_display(s, TEXT_PREVIEW_LENGTH).into_owned(),
            other => truncate_for_display(&other.to_string(), TEXT_PREVIEW_LENGTH).into_owned(),
        };
        let _ = write!(description, "\n  {field}: {value}");
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::FetchArgs, fetch::shard::ShardFormat};
    use clap::Parser;

    #[test]
    fn splits_are_grouped_and_ordered() {
        let splits = group_splits([
            ".gitattributes",
            "README.md",
            "data/test-00000-of-00001.parquet",
            "data/train-00001-of-00002.parquet",
            "data/train-00000-of-00002.parquet",
            "data/validation-00000-of-00001.parquet",
            "extra/other.jsonl",
        ]);
        let layout = splits
            .iter()
            .map(|(split, shards)| {
                (
                    &**split,
                    shards.iter().map(|shard| &*shard.path).collect::<Vec<_>>(),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(
            layout,
            [
                (
                    "train",
                    vec![
                        "data/train-00000-of-00002.parquet",
                        "data/train-00001-of-00002.parquet",
                        "extra/other.jsonl",
                    ]
                ),
                ("validation", vec!["data/validation-00000-of-00001.parquet"]),
                ("test", vec!["data/test-00000-of-00001.parquet"]),
            ]
        );
        assert!(splits[0].1.iter().any(|shard| shard.format == ShardFormat::Json));
        assert!(group_splits(["README.md", "LICENSE"]).is_empty());
    }

    fn config(split: Option<&str>) -> Arc<FetchConfig> {
        let mut args = vec!["dataset-fetch", "-d", "owner/name"];
        if let Some(split) = split {
            args.extend(["--split", split]);
        }
        FetchConfig::new(FetchArgs::try_parse_from(args).unwrap())
    }

    #[test]
    fn split_choice() {
        let splits = group_splits(["train.jsonl", "test.jsonl"]);
        assert_eq!(&*choose_split(&config(None), &splits).unwrap(), "train");
        assert_eq!(&*choose_split(&config(Some("test")), &splits).unwrap(), "test");
        let error = choose_split(&config(Some("validation")), &splits).unwrap_err();
        assert!(error.to_string().contains("available splits are: train, test"));
    }

    #[test]
    fn line_descriptions() {
        let long = "y".repeat(120);
        let line = format!("{{\"text\": \"{long}\", \"score\": 1.5, \"tags\": [\"a\"]}}");
        assert_eq!(
            describe_line(3, &line),
            format!(
                "Record 3:\n  text: {}...\n  score: 1.5\n  tags: [\"a\"]",
                "y".repeat(TEXT_PREVIEW_LENGTH)
            )
        );
        assert!(describe_line(1, "[1, 2]").starts_with("Record 1: not a JSON object"));
    }

    #[tokio::test]
    async fn splits_are_saved_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("name.json");
        let mut writer = SplitWriter::create(path.clone()).await.unwrap();
        let record = serde_json::from_str::<Record>("{\"text\": \"héllo\", \"n\": 1}").unwrap();
        writer.write(&record).await.unwrap();
        writer.write(&record).await.unwrap();
        assert!(!path.exists());
        writer.finish().await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"text\":\"héllo\",\"n\":1}\n{\"text\":\"héllo\",\"n\":1}\n"
        );
        show_first_records(&path, SHOWN_RECORDS).await.unwrap();
    }

    #[tokio::test]
    async fn local_splits_are_summarized() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("train-0.jsonl");
        let second = dir.path().join("train-1.csv");
        std::fs::write(&first, "{\"text\": \"one\"}\n{\"text\": \"two\"}\n").unwrap();
        std::fs::write(&second, "text\nthree\n").unwrap();
        let splits = group_splits(["train-0.jsonl", "train-1.csv"]);
        let (split, shards) = &splits[0];

        let output_path = dir.path().join("out.json");
        let mut output = SplitWriter::create(output_path.clone()).await.unwrap();
        let report = ProgressReport::new();
        let summary = read_split(split, shards, &[first, second], Some(&mut output), &report)
            .await
            .unwrap();
        output.finish().await.unwrap();
        assert_eq!(summary.num_rows(), 3);
        assert_eq!(std::fs::read_to_string(&output_path).unwrap().lines().count(), 3);
    }
}
