//! Access to the dataset repositories of a Hugging Face Hub

use crate::config::FetchConfig;
use anyhow::Context;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;

/// Client of a Hub endpoint
#[derive(Clone, Debug)]
pub struct Hub {
    /// Underlying HTTP client
    client: reqwest::Client,

    /// Base URL, without trailing slash
    endpoint: Box<str>,

    /// Access token, if any
    token: Option<Box<str>>,
}
//
impl Hub {
    /// Set up access to the Hub endpoint of a fetcher configuration
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
        }
    }

    /// List the files of a dataset repository at some revision
    pub async fn dataset_files(
        &self,
        dataset: &str,
        revision: &str,
    ) -> anyhow::Result<Vec<Box<str>>> {
        let url = format!(
            "{}/api/datasets/{dataset}/revision/{}",
            self.endpoint,
            encode_revision(revision)
        );
        let context = || format!("listing files of dataset {dataset} at revision {revision}");
        let info = self
            .get(&url)
            .send()
            .await
            .and_then(Response::error_for_status)
            .with_context(context)?
            .json::<DatasetInfo>()
            .await
            .with_context(context)?;
        log::debug!("Dataset {dataset} has {} files", info.siblings.len());
        Ok(info
            .siblings
            .into_iter()
            .map(|sibling| sibling.rfilename)
            .collect())
    }

    /// Start downloading a file from a dataset repository
    pub async fn download(
        &self,
        dataset: &str,
        revision: &str,
        path: &str,
    ) -> anyhow::Result<Response> {
        let url = format!(
            "{}/datasets/{dataset}/resolve/{}/{path}",
            self.endpoint,
            encode_revision(revision)
        );
        log::trace!("Downloading {url}");
        self.get(&url)
            .send()
            .await
            .and_then(Response::error_for_status)
            .with_context(|| format!("initiating download of {url}"))
    }

    /// Prepare a GET request, authenticated if a token is available
    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Revisions such as `refs/convert/parquet` take a single URL path segment
fn encode_revision(revision: &str) -> String {
    revision.replace('/', "%2F")
}

/// Part of the Hub's dataset description that we care about
#[derive(Debug, Deserialize)]
struct DatasetInfo {
    /// Files of the repository
    #[serde(default)]
    siblings: Vec<Sibling>,
}

/// File of a dataset repository
#[derive(Debug, Deserialize)]
struct Sibling {
    /// Path within the repository
    rfilename: Box<str>,
}
