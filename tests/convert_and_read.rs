mod common;

use common::{convert, write_records, TOKENIZER};
use megatron_prep::{
    config::{ConvertArgs, ConvertConfig},
    convert::{Conversion, MAX_ERRORS},
    indexed::{data_file_path, index_file_path, DType, IndexedDataset},
    tokenizer::TextTokenizer,
    Error,
};
use serde_json::json;

#[test]
fn round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sample.json");
    let texts = ["hello world", "the quick brown fox", "hello ."];
    write_records(
        &input,
        &texts
            .iter()
            .map(|text| json!({"text": text, "source": "test"}))
            .collect::<Vec<_>>(),
    );

    let (config, stats) = convert(&input, &dir.path().join("out"), TOKENIZER);
    assert_eq!(config.dataset_name.as_ref(), "sample");
    assert_eq!((stats.records, stats.accepted, stats.errors), (3, 3, 0));
    assert_eq!(stats.total_tokens, 2 + 4 + 2);
    assert!(!stats.stopped_early);
    assert!(stats.finalize_error.is_none());

    let prefix = config.output_prefix();
    assert!(data_file_path(&prefix).is_file());
    assert!(index_file_path(&prefix).is_file());
    let dataset = IndexedDataset::open(&prefix).unwrap();
    assert_eq!(dataset.len(), 3);
    assert_eq!(dataset.num_documents(), 1);
    assert_eq!(dataset.dtype(), DType::I32);

    let tokenizer = TextTokenizer::load(TOKENIZER).unwrap();
    for (index, text) in texts.iter().enumerate() {
        let ids = dataset.get(index).unwrap();
        assert_eq!(tokenizer.decode(&ids).unwrap(), *text);
    }
    assert!(matches!(
        dataset.get(5),
        Err(Error::IndexOutOfRange { index: 5, len: 3 })
    ));
    let last = dataset.position(-1).unwrap();
    assert_eq!(tokenizer.decode(&dataset.get(last).unwrap()).unwrap(), "hello .");
}

#[test]
fn records_without_usable_text_are_left_out() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("mixed.jsonl");
    write_records(
        &input,
        &[
            json!({"text": "hello world"}),
            json!({"text": ""}),
            json!({"text": "   "}),
            json!({"text": 42}),
            json!({"title": "no text here"}),
            json!({"text": "quick fox"}),
        ],
    );

    let (config, stats) = convert(&input, &dir.path().join("out"), TOKENIZER);
    assert_eq!((stats.records, stats.accepted, stats.skipped), (6, 2, 4));
    assert_eq!(stats.total_tokens, 4);
    assert_eq!(stats.errors, 0);
    let dataset = IndexedDataset::open(&config.output_prefix()).unwrap();
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.get(1).unwrap(), [4, 6]);
}

#[test]
fn too_many_errors_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("unknown.jsonl");
    write_records(
        &input,
        &(0..150)
            .map(|i| json!({"text": format!("unknown words {i}")}))
            .collect::<Vec<_>>(),
    );

    let (config, stats) = convert(&input, &dir.path().join("out"), TOKENIZER);
    assert_eq!(stats.errors, MAX_ERRORS + 1);
    assert_eq!(stats.records, MAX_ERRORS + 1);
    assert_eq!(stats.total_tokens, 0);
    assert!(stats.stopped_early);
    assert!(stats.finalize_error.is_none());

    // The dataset is still finalized, and empty
    let dataset = IndexedDataset::open(&config.output_prefix()).unwrap();
    assert!(dataset.is_empty());
    assert_eq!(dataset.document_indices(), [0, 0]);
}

#[test]
fn setup_checks() {
    let dir = tempfile::tempdir().unwrap();
    let config = |input: &str| {
        ConvertConfig::new(ConvertArgs {
            input_path: dir.path().join(input),
            output_dir: dir.path().join("out"),
            dataset_name: None,
            model_name: "unused".to_owned(),
            dtype: DType::I32,
        })
    };

    assert!(matches!(
        Conversion::open(config("absent.json")),
        Err(Error::MissingFile(_))
    ));

    write_records(&dir.path().join("untitled.json"), &[json!({"body": "x", "id": 1})]);
    match Conversion::open(config("untitled.json")) {
        Err(Error::MissingTextField(fields)) => assert_eq!(fields, ["body", "id"]),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn narrow_dtypes_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sample.json");
    write_records(&input, &[json!({"text": "hello fox"})]);
    let config = ConvertConfig::new(ConvertArgs {
        input_path: input,
        output_dir: dir.path().join("out"),
        dataset_name: Some("narrow".to_owned()),
        model_name: TOKENIZER.to_owned(),
        dtype: DType::U8,
    });
    let tokenizer = TextTokenizer::load(TOKENIZER).unwrap();
    let stats = Conversion::open(config.clone())
        .unwrap()
        .run(&tokenizer, &Default::default())
        .unwrap();
    assert_eq!(stats.accepted, 1);
    let dataset = IndexedDataset::open(&config.output_prefix()).unwrap();
    assert_eq!(dataset.dtype(), DType::U8);
    assert_eq!(dataset.get(0).unwrap(), [1, 6]);
}
