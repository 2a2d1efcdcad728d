//! Tokenize a line-delimited JSON dataset into the Megatron-LM indexed format

use megatron_prep::{
    config::{ConvertArgs, ConvertConfig},
    convert::Conversion,
    init_logging,
    progress::ProgressReport,
    stage,
    tokenizer::TextTokenizer,
};

fn main() -> anyhow::Result<()> {
    // Set up logging
    init_logging();

    // Decode CLI arguments
    let args = ConvertArgs::parse_and_check()?;
    let config = ConvertConfig::new(args);
    println!("Converting {} to Megatron format", config.input_path.display());

    // Check the input before doing anything expensive
    let Some(conversion) = stage("Input check failed", Conversion::open(config.clone())) else {
        return Ok(());
    };

    // Load the tokenizer
    println!("Loading tokenizer {}...", config.model_name);
    let tokenizer = TextTokenizer::load(&config.model_name);
    let Some(tokenizer) = stage("Failed to load tokenizer", tokenizer) else {
        return Ok(());
    };
    println!("Tokenizer loaded, vocabulary size: {}", tokenizer.vocab_size());

    // Tokenize every record
    let report = ProgressReport::new();
    let stats = conversion.run(&tokenizer, &report);
    let Some(stats) = stage("Failed to set up the output dataset", stats) else {
        return Ok(());
    };
    stats.print_summary(&config);
    Ok(())
}
