//! Command-line arguments of each tool, and the configuration digested from
//! them

use crate::indexed::DType;
use clap::Parser;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Default directory where fetched datasets are written
pub const LOCAL_DATASET_PATH: &str = "local_datasets";

/// Default Hugging Face Hub endpoint
pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

/// Default split that gets saved by the fetcher
pub const DEFAULT_SPLIT: &str = "train";

/// File name prefix of the indexed dataset written by the converter
pub const CONVERTED_DATASET_STEM: &str = "megatron_dataset";

/// Default file opened by the Parquet previewer
pub const DEFAULT_PREVIEW_FILE: &str = "train-00000-of-00001.parquet";

/// Default column whose first values are shown by the Parquet previewer
pub const DEFAULT_PREVIEW_COLUMN: &str = "deepseek_grade_reason";

/// Load a dataset from the Hugging Face Hub and save it locally
#[derive(Parser, Debug)]
#[command(version, author)]
pub struct FetchArgs {
    /// Dataset name, e.g. togethercomputer/RedPajama-Data-1T-Sample
    #[arg(short = 'd', long = "dataset_name", alias = "dataset-name")]
    pub dataset_name: String,

    /// Output directory
    #[arg(
        short = 'o',
        long = "output_dir",
        alias = "output-dir",
        default_value = LOCAL_DATASET_PATH
    )]
    pub output_dir: PathBuf,

    /// Split to save as line-delimited JSON
    ///
    /// Defaults to "train". If the dataset has no such split and a terminal
    /// is attached, you will be asked to pick one of the available splits.
    #[arg(short, long)]
    pub split: Option<String>,

    /// Dataset revision (branch, tag or commit)
    #[arg(short, long, default_value = "main")]
    pub revision: String,

    /// Directory where downloaded data files are cached
    ///
    /// Defaults to the user's cache directory.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Hugging Face Hub endpoint
    #[arg(long, env = "HF_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Access token for gated or private datasets
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}
//
impl FetchArgs {
    /// Decode and validate CLI arguments
    pub fn parse_and_check() -> anyhow::Result<Self> {
        Self::parse().check()
    }

    /// Check CLI arguments for basic sanity
    pub fn check(self) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !self.dataset_name.is_empty()
                && self.dataset_name.split('/').all(|segment| !segment.trim().is_empty()),
            "dataset name {:?} is not of the form name or owner/name",
            self.dataset_name
        );
        anyhow::ensure!(
            !self.endpoint.trim().is_empty(),
            "the Hub endpoint must not be empty"
        );
        Ok(self)
    }
}

/// Final fetcher configuration
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FetchConfig {
    /// Hub dataset identifier, e.g. "owner/name"
    pub dataset_id: Box<str>,

    /// Dataset revision
    pub revision: Box<str>,

    /// Split that should be saved, if the user expressed a preference
    pub split: Option<Box<str>>,

    /// Directory where the line-delimited JSON output goes
    pub output_dir: PathBuf,

    /// Root of the download cache, if not the default one
    pub cache_dir: Option<PathBuf>,

    /// Hub endpoint, without trailing slash
    pub endpoint: Box<str>,

    /// Hub access token
    pub token: Option<Box<str>>,
}
//
impl FetchConfig {
    /// Determine fetcher configuration from CLI arguments
    pub fn new(args: FetchArgs) -> Arc<Self> {
        let FetchArgs {
            dataset_name,
            output_dir,
            split,
            revision,
            cache_dir,
            endpoint,
            token,
        } = args;
        Arc::new(Self {
            dataset_id: dataset_name.into(),
            revision: revision.into(),
            split: split.map(Into::into),
            output_dir,
            cache_dir,
            endpoint: endpoint.trim_end_matches('/').into(),
            token: token.filter(|token| !token.is_empty()).map(Into::into),
        })
    }

    /// Last path segment of the dataset identifier
    pub fn short_name(&self) -> &str {
        self.dataset_id
            .rsplit('/')
            .next()
            .expect("rsplit always yields at least one segment")
    }

    /// Line-delimited JSON file where the saved split goes
    pub fn output_file(&self) -> PathBuf {
        self.output_dir.join(format!("{}.json", self.short_name()))
    }
}

/// Convert a line-delimited JSON dataset into the Megatron-LM indexed format
#[derive(Parser, Debug)]
#[command(version, author)]
pub struct ConvertArgs {
    /// Input file, one JSON record with a "text" field per line
    #[arg(short = 'i', long = "input_path", alias = "input-path")]
    pub input_path: PathBuf,

    /// Output directory
    #[arg(short = 'o', long = "output_dir", alias = "output-dir")]
    pub output_dir: PathBuf,

    /// Dataset name, defaults to the input file name without extension
    #[arg(short = 'n', long = "dataset_name", alias = "dataset-name")]
    pub dataset_name: Option<String>,

    /// Model whose tokenizer is used, e.g. a local model directory or
    /// meta-llama/Llama-2-70b-hf
    #[arg(short = 'm', long = "model_name", alias = "model-name")]
    pub model_name: String,

    /// Element type of the token ids in the output
    #[arg(long, value_enum, default_value_t = DType::I32)]
    pub dtype: DType,
}
//
impl ConvertArgs {
    /// Decode and validate CLI arguments
    pub fn parse_and_check() -> anyhow::Result<Self> {
        Self::parse().check()
    }

    /// Check CLI arguments for basic sanity
    pub fn check(self) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !self.model_name.trim().is_empty(),
            "a model name is needed to load the tokenizer"
        );
        anyhow::ensure!(
            self.dataset_name.is_some() || self.input_path.file_stem().is_some(),
            "cannot derive a dataset name from input path {}, please provide one",
            self.input_path.display()
        );
        Ok(self)
    }
}

/// Final converter configuration
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ConvertConfig {
    /// Line-delimited JSON input
    pub input_path: PathBuf,

    /// Directory where the indexed dataset goes
    pub output_dir: PathBuf,

    /// Name of the dataset, for reporting
    pub dataset_name: Box<str>,

    /// Model whose tokenizer is used
    pub model_name: Box<str>,

    /// Element type of the token ids in the output
    pub dtype: DType,
}
//
impl ConvertConfig {
    /// Determine converter configuration from CLI arguments
    pub fn new(args: ConvertArgs) -> Arc<Self> {
        let ConvertArgs {
            input_path,
            output_dir,
            dataset_name,
            model_name,
            dtype,
        } = args;
        let dataset_name = dataset_name.unwrap_or_else(|| file_stem(&input_path));
        Arc::new(Self {
            input_path,
            output_dir,
            dataset_name: dataset_name.into(),
            model_name: model_name.into(),
            dtype,
        })
    }

    /// Path prefix of the output indexed dataset
    pub fn output_prefix(&self) -> PathBuf {
        self.output_dir.join(CONVERTED_DATASET_STEM)
    }
}

/// Input file name without its extension
fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read a sequence from a Megatron-LM indexed dataset and decode it
#[derive(Parser, Debug)]
#[command(version, author)]
pub struct ReadArgs {
    /// Dataset path prefix, e.g. local_datasets/dataset_name/megatron_dataset
    #[arg(short = 'd', long = "dataset_prefix", alias = "dataset-prefix")]
    pub dataset_prefix: PathBuf,

    /// Model whose tokenizer is used for decoding
    #[arg(short = 'm', long = "model_name", alias = "model-name")]
    pub model_name: String,

    /// Index of the sequence to read, negative indices count from the end
    #[arg(short = 'i', long, default_value_t = 0, allow_negative_numbers = true)]
    pub index: isize,
}
//
impl ReadArgs {
    /// Decode and validate CLI arguments
    pub fn parse_and_check() -> anyhow::Result<Self> {
        Self::parse().check()
    }

    /// Check CLI arguments for basic sanity
    pub fn check(self) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !self.dataset_prefix.as_os_str().is_empty(),
            "the dataset path prefix must not be empty"
        );
        anyhow::ensure!(
            !self.model_name.trim().is_empty(),
            "a model name is needed to load the tokenizer"
        );
        Ok(self)
    }
}

/// Show the structure and statistics of a Parquet file
#[derive(Parser, Debug)]
#[command(version, author)]
pub struct PreviewArgs {
    /// Parquet file to preview
    #[arg(default_value = DEFAULT_PREVIEW_FILE)]
    pub path: PathBuf,

    /// Column whose first values are shown
    #[arg(long, default_value = DEFAULT_PREVIEW_COLUMN)]
    pub column: String,
}
