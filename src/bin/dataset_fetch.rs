//! Load a dataset from the Hugging Face Hub, summarize its splits and save one
//! of them as line-delimited JSON

use megatron_prep::{
    config::{FetchArgs, FetchConfig},
    fetch, init_logging, report_failure,
};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Set up logging
    init_logging();

    // Fetch the dataset, any failure is fatal
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_failure("Error loading dataset", &*e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    // Decode CLI arguments
    let args = FetchArgs::parse_and_check()?;
    let config = FetchConfig::new(args);
    log::info!(
        "Fetching dataset {} at revision {} from {}",
        config.dataset_id,
        config.revision,
        config.endpoint
    );

    // Download, summarize and save
    fetch::run(config).await
}
