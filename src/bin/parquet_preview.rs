//! Show the structure, first rows and summary statistics of a Parquet file

use clap::Parser;
use megatron_prep::{config::PreviewArgs, init_logging, preview};

fn main() {
    // Set up logging
    init_logging();

    // Decode CLI arguments
    let args = PreviewArgs::parse();

    // Preview the file, failures are only reported
    if let Err(e) = preview::run(&args) {
        log::error!("Failed to preview {}: {e}", args.path.display());
        println!("{}", preview::failure_message(&e));
    }
}
