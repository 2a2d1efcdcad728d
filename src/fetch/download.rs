//! Download of dataset files into a local cache

use super::{hub::Hub, shard::Shard};
use crate::{
    config::FetchConfig,
    progress::{ProgressConfig, ProgressReport, ProgressTracker, Work},
};
use anyhow::Context;
use async_compression::tokio::bufread::GzipDecoder;
use directories::ProjectDirs;
use futures::stream::StreamExt;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncWriteExt},
    task::JoinSet,
};
use tokio_util::io::StreamReader;

/// Directory where the files of the configured dataset revision are cached
pub fn cache_dir(config: &FetchConfig) -> anyhow::Result<PathBuf> {
    let root = match &config.cache_dir {
        Some(dir) => dir.clone(),
        None => ProjectDirs::from("", "", "megatron-prep")
            .context("determining the user's cache directory, please specify one")?
            .cache_dir()
            .join("datasets"),
    };
    let mut dir = root;
    dir.extend(config.dataset_id.split('/'));
    dir.push(&*config.revision);
    Ok(dir)
}

/// Make sure that a set of data files is available locally, downloading the
/// missing ones
///
/// Returns the local path of each data file, in the order of `shards`.
/// Gzipped files are decompressed as they are downloaded.
pub async fn download_all(
    config: Arc<FetchConfig>,
    hub: Hub,
    shards: &[Shard],
    report: &ProgressReport,
) -> anyhow::Result<Vec<PathBuf>> {
    // Decide where each file goes
    let cache_dir = cache_dir(&config)?;
    let local_paths = shards
        .iter()
        .map(|shard| {
            shard.local_path(&cache_dir).with_context(|| {
                format!("refusing to cache data file with unusual path {}", shard.path)
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    log::info!("Caching data files into {}", cache_dir.display());

    // Track file downloads
    let downloads = report.add(
        "Initiating data downloads",
        ProgressConfig::new(Work::Steps(shards.len())).dont_show_rate_eta(),
    );
    let bytes = report.add(
        "Downloading data",
        ProgressConfig::new(Work::Bytes(0)).allow_adding_work(),
    );

    // Start file downloads
    let mut data_files = JoinSet::new();
    for (shard, local_path) in shards.iter().zip(&local_paths) {
        data_files.spawn(download(
            config.clone(),
            hub.clone(),
            shard.clone(),
            local_path.clone(),
            downloads.clone(),
            bytes.clone(),
        ));
    }

    // Wait for downloads to finish
    while let Some(outcome) = data_files.join_next().await {
        outcome.context("waiting for a data file download")??;
    }
    Ok(local_paths)
}

/// Download a data file, unless it is already cached
async fn download(
    config: Arc<FetchConfig>,
    hub: Hub,
    shard: Shard,
    local_path: PathBuf,
    downloads: ProgressTracker,
    bytes: ProgressTracker,
) -> anyhow::Result<()> {
    // Reuse files from previous runs
    if fs::try_exists(&local_path).await.unwrap_or(false) {
        log::debug!("Reusing cached data file {}", local_path.display());
        if downloads.make_progress(1) {
            bytes.done_adding_work();
        }
        return Ok(());
    }

    // Start the download
    let response = hub
        .download(&config.dataset_id, &config.revision, &shard.path)
        .await?;
    let length = response.content_length();
    bytes.add_work(length.unwrap_or(0));
    if downloads.make_progress(1) {
        bytes.done_adding_work();
    }

    // Slice the download into chunks of bytes
    let raw_bytes = StreamReader::new(response.bytes_stream().map(move |res| {
        res
            // Track how many input bytes have been downloaded so far
            .inspect(|bytes_block| {
                if length.is_some() {
                    bytes.make_progress(bytes_block.len() as u64);
                }
            })
            // Translate reqwest errors into I/O errors
            .map_err(|e| io::Error::new(ErrorKind::Other, Box::new(e)))
    }));

    // Apply gzip decoder to compressed bytes
    let mut file_bytes: Box<dyn AsyncRead + Unpin + Send> = if shard.gzipped {
        let mut decoder = GzipDecoder::new(raw_bytes);
        decoder.multiple_members(true);
        Box::new(decoder)
    } else {
        Box::new(raw_bytes)
    };

    // Write into a temporary file that only gets its final name once complete
    save(&mut file_bytes, &local_path)
        .await
        .with_context(|| format!("fetching {} into {}", shard.path, local_path.display()))
}

/// Save a byte stream to a file, atomically
async fn save(bytes: &mut (dyn AsyncRead + Unpin + Send), path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut partial_path = path.as_os_str().to_owned();
    partial_path.push(".part");
    let mut file = File::create(&partial_path).await?;
    tokio::io::copy(bytes, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    fs::rename(&partial_path, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchArgs;
    use clap::Parser;

    #[test]
    fn cache_layout() {
        let args = FetchArgs::try_parse_from([
            "dataset-fetch",
            "-d",
            "owner/name",
            "-r",
            "v1.0",
            "--cache-dir",
            "/tmp/hub-cache",
        ])
        .unwrap();
        let config = FetchConfig::new(args);
        assert_eq!(
            cache_dir(&config).unwrap(),
            Path::new("/tmp/hub-cache/owner/name/v1.0")
        );
    }

    #[tokio::test]
    async fn saving_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/train.jsonl");
        let mut bytes: &[u8] = b"{\"text\": \"saved\"}\n";
        save(&mut bytes, &path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"text\": \"saved\"}\n");
        assert!(!dir.path().join("nested/train.jsonl.part").exists());
    }
}
