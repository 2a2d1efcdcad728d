//! Data files of a Hub dataset, and decoding of their records

use super::Record;
use anyhow::Context;
use arrow::{json::LineDelimitedWriter, record_batch::RecordBatch};
use csv_async::AsyncReaderBuilder;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use parquet::arrow::async_reader::ParquetRecordBatchStreamBuilder;
use std::{
    cmp::Ordering,
    path::{Component, Path, PathBuf},
};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
};
use unicase::UniCase;

/// Name of the split that data files without a recognizable split go to
pub const FALLBACK_SPLIT: &str = "train";

/// Words that identify a split in data file paths, and the split they map to
///
/// Splits are listed in the order in which they are displayed.
const SPLIT_KEYWORDS: &[(&str, &str)] = &[
    ("train", "train"),
    ("training", "train"),
    ("validation", "validation"),
    ("valid", "validation"),
    ("val", "validation"),
    ("dev", "validation"),
    ("test", "test"),
    ("testing", "test"),
    ("eval", "test"),
    ("evaluation", "test"),
];

/// Data files that look like records but describe the dataset
const METADATA_FILES: &[&str] = &["dataset_info.json", "dataset_infos.json"];

/// Encoding of a data file
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ShardFormat {
    /// Apache Parquet
    Parquet,

    /// One JSON object per line, or a single JSON array of objects
    Json,

    /// Comma-separated values with a header line
    Csv,

    /// Tab-separated values with a header line
    Tsv,
}
//
impl ShardFormat {
    /// Recognize a data file extension
    fn from_extension(extension: &str) -> Option<Self> {
        let extension = UniCase::new(extension);
        [
            ("parquet", Self::Parquet),
            ("jsonl", Self::Json),
            ("json", Self::Json),
            ("ndjson", Self::Json),
            ("csv", Self::Csv),
            ("tsv", Self::Tsv),
        ]
        .into_iter()
        .find_map(|(known, format)| (UniCase::new(known) == extension).then_some(format))
    }
}

/// Data file of a dataset repository
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Shard {
    /// Path within the repository
    pub path: Box<str>,

    /// Split that the records of this file belong to
    pub split: Box<str>,

    /// Encoding of the records
    pub format: ShardFormat,

    /// Truth that the file is gzip-compressed
    pub gzipped: bool,
}
//
impl Shard {
    /// Recognize a data file from its path in the repository, or tell that
    /// it is not a data file
    pub fn from_repo_path(path: &str) -> Option<Self> {
        let file_name = path.rsplit('/').next()?;
        if file_name.starts_with('.')
            || METADATA_FILES
                .iter()
                .any(|metadata| UniCase::new(*metadata) == UniCase::new(file_name))
        {
            return None;
        }
        let (stem, extension) = file_name.rsplit_once('.')?;
        let (extension, gzipped) = if UniCase::new(extension) == UniCase::new("gz") {
            (stem.rsplit_once('.')?.1, true)
        } else {
            (extension, false)
        };
        Some(Self {
            path: path.into(),
            split: split_of(path).into(),
            format: ShardFormat::from_extension(extension)?,
            gzipped,
        })
    }

    /// Where the decompressed file goes within a local cache directory, if
    /// its path is safe to use
    pub fn local_path(&self, cache_dir: &Path) -> Option<PathBuf> {
        let relative = if self.gzipped {
            Path::new(&self.path[..self.path.len() - ".gz".len()])
        } else {
            Path::new(&*self.path)
        };
        relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
            .then(|| cache_dir.join(relative))
    }
}

/// Determine the split of a data file from its path
///
/// Path components are cut into words at `-`, `_`, `.`, spaces and digits,
/// and the first word that names a split decides. Files whose path does not
/// name a split belong to [`FALLBACK_SPLIT`].
pub fn split_of(path: &str) -> &'static str {
    path.split('/')
        .flat_map(|component| {
            component.split(|c: char| matches!(c, '-' | '_' | '.' | ' ') || c.is_ascii_digit())
        })
        .find_map(|word| {
            SPLIT_KEYWORDS
                .iter()
                .find(|(keyword, _split)| UniCase::new(*keyword) == UniCase::new(word))
                .map(|(_keyword, split)| *split)
        })
        .unwrap_or(FALLBACK_SPLIT)
}

/// Order in which splits are displayed: well-known splits first, in the
/// usual train/validation/test order, then other splits by name
pub fn split_order(a: &str, b: &str) -> Ordering {
    let rank = |split: &str| {
        SPLIT_KEYWORDS
            .iter()
            .position(|(_keyword, known)| *known == split)
            .unwrap_or(usize::MAX)
    };
    rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
}

/// Stream of records from a data file
pub type Records = BoxStream<'static, anyhow::Result<Record>>;

/// Start decoding the records of a local, uncompressed data file
pub async fn open_records(path: &Path, format: ShardFormat) -> anyhow::Result<Records> {
    let context = format!("opening data file {}", path.display());
    let file = File::open(path).await.context(context)?;
    let path = path.to_owned();
    Ok(match format {
        ShardFormat::Parquet => parquet_records(file, path).await?,
        ShardFormat::Json => json_records(file, path).await?,
        ShardFormat::Csv => delimited_records(file, path, b','),
        ShardFormat::Tsv => delimited_records(file, path, b'\t'),
    })
}

/// Decode a Parquet file, one batch of rows at a time
async fn parquet_records(file: File, path: PathBuf) -> anyhow::Result<Records> {
    let batches = ParquetRecordBatchStreamBuilder::new(file)
        .await
        .and_then(|builder| builder.build())
        .with_context(|| format!("reading Parquet metadata of {}", path.display()))?;
    Ok(batches
        .map(move |batch| -> anyhow::Result<Vec<Record>> {
            let batch =
                batch.with_context(|| format!("decoding Parquet rows of {}", path.display()))?;
            batch_to_records(&batch)
        })
        .map_ok(|records| stream::iter(records.into_iter().map(Ok::<_, anyhow::Error>)))
        .try_flatten()
        .boxed())
}

/// Turn a batch of columnar rows into JSON records
pub fn batch_to_records(batch: &RecordBatch) -> anyhow::Result<Vec<Record>> {
    let mut writer = LineDelimitedWriter::new(Vec::new());
    writer.write(batch).context("converting rows to JSON")?;
    writer.finish().context("converting rows to JSON")?;
    let json = writer.into_inner();
    json.split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).context("parsing rows converted to JSON"))
        .collect()
}

/// Decode a JSON Lines file, or a JSON file that holds an array of records
async fn json_records(file: File, path: PathBuf) -> anyhow::Result<Records> {
    // Peek at the first significant character to tell both layouts apart
    let mut reader = BufReader::new(file);
    let is_array = loop {
        let buffer = reader
            .fill_buf()
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let Some(first) = buffer.iter().position(|b| !b.is_ascii_whitespace()) else {
            if buffer.is_empty() {
                break false;
            }
            let len = buffer.len();
            reader.consume(len);
            continue;
        };
        break buffer[first] == b'[';
    };

    // Whole arrays are small enough to be parsed in one go
    if is_array {
        let mut json = Vec::new();
        reader
            .read_to_end(&mut json)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let records = serde_json::from_slice::<Vec<Record>>(&json)
            .with_context(|| format!("parsing JSON array in {}", path.display()))?;
        return Ok(stream::iter(records.into_iter().map(anyhow::Ok)).boxed());
    }

    // Otherwise, go line by line
    let lines = reader.lines();
    Ok(stream::try_unfold((lines, path, 0usize), |(mut lines, path, mut line_number)| async move {
        loop {
            line_number += 1;
            let Some(line) = lines
                .next_line()
                .await
                .with_context(|| format!("reading line {line_number} of {}", path.display()))?
            else {
                return Ok::<_, anyhow::Error>(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str::<Record>(&line)
                .with_context(|| format!("parsing line {line_number} of {}", path.display()))?;
            return Ok(Some((record, (lines, path, line_number))));
        }
    })
    .boxed())
}

/// Decode a delimited text file whose first line is a header
fn delimited_records(file: File, path: PathBuf, delimiter: u8) -> Records {
    AsyncReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .create_deserializer(file)
        .into_deserialize::<Record>()
        .map(move |record| record.with_context(|| format!("decoding row of {}", path.display())))
        .boxed()
}
