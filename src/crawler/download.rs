//! File downloader with atomic writes
//!
//! Bodies are streamed into `<destination>.part` and renamed onto the final
//! name only after a complete, flushed transfer. An existing destination is
//! therefore always a finished file, which is what makes re-runs skip it.

use futures::StreamExt;
use reqwest::Client;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::config::Config;
use crate::crawler::resolver::{ApiTarget, Resolution};
use crate::metrics;
use crate::models::{BasicAuth, DownloadTask, ResourceDescriptor, ResourceFormat};
use crate::utils::clean_filename;
use crate::utils::error::{DownloadError, FetchError};
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Result of a successful download call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Destination already existed, no request was made
    Skipped,
    /// File was transferred
    Downloaded { bytes: u64 },
}

/// Streams remote files to disk
pub struct Downloader {
    client: Client,
    retry: RetryConfig,
}

impl Downloader {
    /// Create a downloader from the application configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        Self::with_config(
            config.retry(),
            config.download_timeout(),
            &config.http.user_agent,
        )
    }

    /// Create a downloader with a custom retry policy and idle timeout
    ///
    /// `timeout` bounds connecting and every gap between two reads, never the
    /// whole transfer, so a slow but steady body is not cut off.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn with_config(
        retry: RetryConfig,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(user_agent)
            .gzip(true)
            .build()?;

        Ok(Self { client, retry })
    }

    /// Download one task's file unless it already exists
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Fetch` once the attempt budget is spent and
    /// `DownloadError::Io` when the destination cannot be written
    pub async fn download(&self, task: &DownloadTask) -> Result<DownloadOutcome, DownloadError> {
        let destination = task.destination();

        if tokio::fs::try_exists(&destination).await.unwrap_or(false) {
            tracing::info!(path = %destination.display(), "File already exists, skipping");
            metrics::record_download("skipped", 0);
            return Ok(DownloadOutcome::Skipped);
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let partial = partial_path(&destination);
        let _timer = metrics::start_download_timer();

        let result = with_retry_if(
            &self.retry,
            |attempt| {
                let partial = &partial;
                async move {
                    tracing::debug!(url = %task.resolved_url, attempt, "Downloading");
                    let written = self
                        .attempt(&task.resolved_url, task.auth.as_ref(), partial)
                        .await;
                    if written.is_err() {
                        let _ = tokio::fs::remove_file(partial).await;
                    }
                    written
                }
            },
            is_retryable,
        )
        .await;

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(
                    url = %task.resolved_url,
                    path = %destination.display(),
                    error = %e,
                    "Download failed"
                );
                metrics::record_download("failed", 0);
                return Err(match e {
                    DownloadError::Fetch(f) if f.is_transient() => {
                        DownloadError::Fetch(FetchError::MaxRetriesExceeded {
                            attempts: self.retry.max_attempts,
                            last: f.to_string(),
                        })
                    }
                    other => other,
                });
            }
        };

        if let Err(e) = tokio::fs::rename(&partial, &destination).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(DownloadError::io(&destination, e));
        }

        tracing::info!(
            path = %destination.display(),
            bytes,
            size = %crate::utils::format_bytes(bytes),
            "Download complete"
        );
        metrics::record_download("downloaded", bytes);
        Ok(DownloadOutcome::Downloaded { bytes })
    }

    async fn attempt(
        &self,
        url: &str,
        auth: Option<&BasicAuth>,
        partial: &Path,
    ) -> Result<u64, DownloadError> {
        let mut request = self.client.get(url);
        if let Some(auth) = auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::ServerError(status.as_u16()).into());
        }

        let file = File::create(partial)
            .await
            .map_err(|e| DownloadError::io(partial, e))?;
        stream_to_file(file, response, partial).await
    }
}

fn is_retryable(error: &DownloadError) -> bool {
    match error {
        DownloadError::Fetch(e) => e.is_transient(),
        DownloadError::Io { .. } => false,
    }
}

/// `<destination>.part`
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Http(e)
            }
        })?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| DownloadError::io(path, e))?;

    Ok(bytes_written)
}

/// Turn a resolved file resource into download tasks
///
/// A direct link becomes one task. Each listed CSV link becomes its own task,
/// suffixed with the link's sanitized text, or its index when the text is
/// empty.
pub fn tasks_for(
    dataset_name: &str,
    resource: &ResourceDescriptor,
    output_dir: &Path,
    resolution: &Resolution,
) -> Vec<DownloadTask> {
    let task = |resolved_url: &str, suffix: Option<String>| DownloadTask {
        dataset_name: dataset_name.to_string(),
        resource_name: resource.name.clone(),
        format: resource.format,
        output_dir: output_dir.to_path_buf(),
        resolved_url: resolved_url.to_string(),
        auth: None,
        suffix,
    };

    match resolution {
        Resolution::Direct { link, .. } => vec![task(link, None)],
        Resolution::Listed { links, .. } => links
            .iter()
            .enumerate()
            .map(|(idx, link)| {
                let text = clean_filename(&link.text);
                let suffix = if text.is_empty() { idx.to_string() } else { text };
                task(&link.href, Some(suffix))
            })
            .collect(),
    }
}

/// Turn a resolved API resource into its download task
///
/// Delegated resources produce no task; the harvester covers them.
pub fn api_task(
    dataset_name: &str,
    resource: &ResourceDescriptor,
    output_dir: &Path,
    target: &ApiTarget,
) -> Option<DownloadTask> {
    let (url, auth) = match target {
        ApiTarget::Delegated { .. } => return None,
        ApiTarget::Authenticated { url, auth } => (url, Some(auth.clone())),
        ApiTarget::Embedded { url } => (url, None),
    };

    Some(DownloadTask {
        dataset_name: dataset_name.to_string(),
        resource_name: resource.name.clone(),
        format: ResourceFormat::Api,
        output_dir: output_dir.to_path_buf(),
        resolved_url: url.clone(),
        auth,
        suffix: None,
    })
}
