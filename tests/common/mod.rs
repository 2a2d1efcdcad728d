//! Fixtures shared by integration tests

use megatron_prep::{
    config::{ConvertArgs, ConvertConfig},
    convert::{Conversion, RunStats},
    indexed::DType,
    progress::ProgressReport,
    tokenizer::TextTokenizer,
};
use std::{path::Path, sync::Arc};

/// Word-level tokenizer that needs no download, whose vocabulary is
/// `</s> hello world the quick brown fox .` in id order
///
/// Words outside of this vocabulary make encoding fail.
pub const TOKENIZER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/tokenizer");

/// Write line-delimited JSON records
pub fn write_records(path: &Path, records: &[serde_json::Value]) {
    let lines = records
        .iter()
        .map(|record| format!("{record}\n"))
        .collect::<String>();
    std::fs::write(path, lines).unwrap();
}

/// Convert a line-delimited JSON file with the fixture tokenizer
pub fn convert(input: &Path, output_dir: &Path, model: &str) -> (Arc<ConvertConfig>, RunStats) {
    let args = ConvertArgs {
        input_path: input.to_owned(),
        output_dir: output_dir.to_owned(),
        dataset_name: None,
        model_name: model.to_owned(),
        dtype: DType::I32,
    };
    let config = ConvertConfig::new(args.check().unwrap());
    let tokenizer = TextTokenizer::load(model).unwrap();
    let stats = Conversion::open(config.clone())
        .unwrap()
        .run(&tokenizer, &ProgressReport::new())
        .unwrap();
    (config, stats)
}
