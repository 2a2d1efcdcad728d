//! Read one sequence of a Megatron-LM indexed dataset and decode it back into
//! text

use megatron_prep::{
    config::ReadArgs, indexed::IndexedDataset, init_logging, stage, tokenizer::TextTokenizer,
    RULE,
};

fn main() -> anyhow::Result<()> {
    // Set up logging
    init_logging();

    // Decode CLI arguments
    let args = ReadArgs::parse_and_check()?;

    // Open the dataset
    let Some(dataset) = stage(
        "Failed to open indexed dataset",
        IndexedDataset::open(&args.dataset_prefix),
    ) else {
        return Ok(());
    };
    println!(
        "Dataset {}: {} sequences in {} documents, element type {}",
        args.dataset_prefix.display(),
        dataset.len(),
        dataset.num_documents(),
        dataset.dtype()
    );

    // Fetch the requested sequence
    let fetched = dataset
        .position(args.index)
        .and_then(|position| Ok((position, dataset.get(position)?)));
    let Some((position, ids)) = stage("Failed to fetch sequence", fetched) else {
        return Ok(());
    };
    println!("\nSequence {position} has {} tokens:", ids.len());
    println!("{ids:?}");

    // Decode it
    let tokenizer = TextTokenizer::load(&args.model_name);
    let Some(tokenizer) = stage("Failed to load tokenizer", tokenizer) else {
        return Ok(());
    };
    let Some(text) = stage("Failed to decode sequence", tokenizer.decode(&ids)) else {
        return Ok(());
    };
    println!("\nDecoded text:\n{RULE}\n{text}\n{RULE}");
    Ok(())
}
