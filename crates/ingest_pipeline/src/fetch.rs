//! Resource link fetching.
//!
//! Remote links go through a retrying HTTP client with bounded exponential
//! backoff and an overall per-request timeout; `file:` URLs and plain
//! filesystem paths short-circuit the network entirely, which keeps tests
//! and local CLI runs offline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;

use crate::error::PipelineError;
use crate::model::SourceData;

/// HTTP client behavior for the link and file stages.
#[derive(Debug, Clone, Copy)]
pub struct FetchConfig {
    /// Transient transport failures are retried up to this many times.
    pub max_retries: u32,
    /// Overall deadline per request, connect through body.
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct LinkFetcher {
    client: ClientWithMiddleware,
}

impl LinkFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, PipelineError> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = reqwest_middleware::ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Ok(Self { client })
    }

    /// Check that the link is reachable without downloading the body.
    pub async fn check(&self, link: &str) -> Result<(), PipelineError> {
        match local_path(link) {
            Some(path) => {
                let metadata = tokio::fs::metadata(&path).await?;
                if !metadata.is_file() {
                    return Err(PipelineError::transport(format!(
                        "{} is not a regular file",
                        path.display()
                    )));
                }
                Ok(())
            }
            None => {
                let response = self.client.head(link).send().await?;
                response.error_for_status()?;
                Ok(())
            }
        }
    }

    /// Download the resource bytes and the name they arrived under.
    pub async fn fetch(&self, link: &str) -> Result<SourceData, PipelineError> {
        match local_path(link) {
            Some(path) => {
                let bytes = tokio::fs::read(&path).await?;
                let filename = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string);
                Ok(SourceData { bytes, filename })
            }
            None => {
                let response = self.client.get(link).send().await?;
                let response = response.error_for_status()?;
                let filename = response
                    .url()
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                let bytes = response.bytes().await?.to_vec();
                tracing::debug!(link, size = bytes.len(), "fetched resource");
                Ok(SourceData { bytes, filename })
            }
        }
    }
}

/// Resolve `file:` URLs and bare filesystem paths to a local path.
fn local_path(link: &str) -> Option<PathBuf> {
    if let Ok(parsed) = url::Url::parse(link) {
        if parsed.scheme() == "file" {
            return parsed.to_file_path().ok();
        }
        if parsed.scheme() == "http" || parsed.scheme() == "https" {
            return None;
        }
    }
    // Not an absolute URL at all; treat it as a filesystem path.
    Some(Path::new(link).to_path_buf())
}
