//! Open-data REST API harvester
//!
//! Reads the Swagger document of the Ministry of Health API, selects every
//! unauthenticated paginated list endpoint and dumps each one to
//! `<dir>/<path>.json` with periodic `in_progress` checkpoints. Endpoints run
//! one after the other.

pub mod openapi;
pub mod page;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;

use crate::config::Config;
use crate::crawler::fetcher::PageFetcher;
use crate::metrics;
use crate::models::{DumpMetadata, DumpStatus, EndpointDescriptor};
use crate::storage::checkpoint::{dump_status, load_dump, save_dump_parts};
use crate::storage::progress::finished_runs;
use crate::utils::error::FetchError;

pub use openapi::extract_endpoints;
pub use page::page_records;

/// Subdirectory of the run directory that receives endpoint dumps
pub const OPENAPI_DIR: &str = "openapi";

/// Result of harvesting one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// A complete dump already existed
    AlreadyComplete,
    /// Every page was fetched
    Complete { records: usize, pages: usize },
    /// A page failed; what was collected is kept as `in_progress`
    Failed { records: usize, pages: usize },
}

/// Totals of a harvest run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub endpoints: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub records: usize,
}

/// Pages through the open-data API
pub struct OpenApiHarvester {
    fetcher: Arc<PageFetcher>,
    api_origin: String,
    spec_url: String,
    page_limit: usize,
    checkpoint_interval: usize,
    page_delay: Duration,
    endpoint_delay: Duration,
}

impl OpenApiHarvester {
    /// Create a harvester with its own fetcher using the API timeout
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let fetcher = PageFetcher::with_config(
            config.http.requests_per_second,
            config.retry(),
            config.api_timeout(),
            &config.http.user_agent,
        )?;
        Ok(Self::with_fetcher(Arc::new(fetcher), config))
    }

    /// Create a harvester around an existing fetcher
    pub fn with_fetcher(fetcher: Arc<PageFetcher>, config: &Config) -> Self {
        Self {
            fetcher,
            api_origin: config.catalog.api_origin.trim_end_matches('/').to_string(),
            spec_url: config.catalog.openapi_spec_url.clone(),
            page_limit: config.harvest.page_limit.max(1),
            checkpoint_interval: config.harvest.checkpoint_interval.max(1),
            page_delay: Duration::from_millis(config.harvest.page_delay_ms),
            endpoint_delay: Duration::from_millis(config.harvest.endpoint_delay_ms),
        }
    }

    /// Fetch the API description
    ///
    /// # Errors
    ///
    /// Returns the fetch error when the document cannot be retrieved or is
    /// not JSON
    pub async fn load_spec(&self, url: &str) -> Result<Value, FetchError> {
        tracing::info!(url, "Loading API specification");
        let spec = self.fetcher.fetch_json(url, &[]).await?;

        let (title, version) = openapi::spec_info(&spec);
        tracing::info!(title, version, "Specification loaded");
        Ok(spec)
    }

    /// Endpoints this harvester will page through
    pub fn extract_endpoints(&self, spec: &Value) -> Vec<EndpointDescriptor> {
        extract_endpoints(spec, self.page_limit)
    }

    /// Dump one endpoint into `dir`
    ///
    /// A complete dump on disk is left alone, and so is one in the `openapi`
    /// directory of a finished sibling run when `dir` is itself a run's
    /// `openapi` directory. Anything else, including an `in_progress` dump
    /// from an interrupted run, is fetched again from offset 0.
    pub async fn harvest(&self, endpoint: &EndpointDescriptor, dir: &Path) -> HarvestOutcome {
        let path = endpoint.dump_path(dir);

        if let Some(previous) = completed_elsewhere(endpoint, dir) {
            tracing::info!(
                endpoint = %endpoint.path,
                file = %previous.display(),
                "Endpoint complete in a previous run, skipping"
            );
            return HarvestOutcome::AlreadyComplete;
        }

        match load_dump(&path) {
            Ok(Some(dump)) if dump.is_complete() => {
                tracing::info!(
                    endpoint = %endpoint.path,
                    records = dump.metadata.total_records,
                    "Endpoint already complete, skipping"
                );
                return HarvestOutcome::AlreadyComplete;
            }
            Ok(Some(dump)) => {
                tracing::info!(
                    endpoint = %endpoint.path,
                    records = dump.metadata.total_records,
                    "Found incomplete dump, restarting from offset 0"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(endpoint = %endpoint.path, error = %e, "Unreadable dump, restarting from offset 0");
            }
        }

        tracing::info!(
            endpoint = %endpoint.path,
            summary = %endpoint.summary,
            page_limit = endpoint.page_limit,
            "Downloading endpoint"
        );

        let url = format!("{}{}", self.api_origin, endpoint.path);
        let limit = endpoint.page_limit.max(1);
        let start = Instant::now();
        let mut data: Vec<Value> = Vec::new();
        let mut offset = 0usize;
        let mut pages = 0usize;

        loop {
            let query = [("offset", offset.to_string()), ("limit", limit.to_string())];
            let body = match self.fetcher.fetch_json(&url, &query).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!(endpoint = %endpoint.path, offset, error = %e, "Page failed, stopping endpoint");
                    self.write(endpoint, &path, &data, pages, start, DumpStatus::InProgress);
                    return HarvestOutcome::Failed {
                        records: data.len(),
                        pages,
                    };
                }
            };

            pages += 1;
            let records = page_records(body);
            let in_page = records.len();
            data.extend(records);
            tracing::debug!(endpoint = %endpoint.path, page = pages, offset, records = in_page, "Page received");

            if in_page < limit {
                tracing::debug!(endpoint = %endpoint.path, records = in_page, limit, "Last page reached");
                break;
            }

            if pages % self.checkpoint_interval == 0 {
                self.write(endpoint, &path, &data, pages, start, DumpStatus::InProgress);
                tracing::info!(endpoint = %endpoint.path, records = data.len(), "Checkpoint saved");
            }

            offset += limit;
            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        if !self.write(endpoint, &path, &data, pages, start, DumpStatus::Complete) {
            return HarvestOutcome::Failed {
                records: data.len(),
                pages,
            };
        }

        tracing::info!(
            endpoint = %endpoint.path,
            records = data.len(),
            pages,
            elapsed_secs = start.elapsed().as_secs_f64(),
            file = %path.display(),
            "Endpoint complete"
        );
        HarvestOutcome::Complete {
            records: data.len(),
            pages,
        }
    }

    fn write(
        &self,
        endpoint: &EndpointDescriptor,
        path: &Path,
        data: &[Value],
        pages: usize,
        start: Instant,
        status: DumpStatus,
    ) -> bool {
        let metadata = DumpMetadata {
            endpoint: endpoint.path.clone(),
            summary: endpoint.summary.clone(),
            tag: endpoint.tag.clone(),
            download_date: Utc::now(),
            total_records: data.len(),
            pages_downloaded: pages,
            elapsed_seconds: (start.elapsed().as_secs_f64() * 100.0).round() / 100.0,
            status,
        };

        match save_dump_parts(path, &metadata, data) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(endpoint = %endpoint.path, error = %e, "Failed to write dump");
                false
            }
        }
    }

    /// Harvest every qualifying endpoint into `<dir>/openapi`
    pub async fn run(&self, dir: &Path) -> HarvestSummary {
        let mut summary = HarvestSummary::default();
        let openapi_dir = dir.join(OPENAPI_DIR);

        if let Err(e) = tokio::fs::create_dir_all(&openapi_dir).await {
            tracing::error!(dir = %openapi_dir.display(), error = %e, "Failed to create API output directory");
            return summary;
        }

        let spec = match self.load_spec(&self.spec_url).await {
            Ok(spec) => spec,
            Err(e) => {
                tracing::error!(url = %self.spec_url, error = %e, "Failed to load API specification");
                return summary;
            }
        };

        let endpoints = self.extract_endpoints(&spec);
        summary.endpoints = endpoints.len();
        tracing::info!(endpoints = endpoints.len(), "Found endpoints for download");

        let mut by_tag: BTreeMap<&str, usize> = BTreeMap::new();
        for endpoint in &endpoints {
            *by_tag.entry(endpoint.tag.as_str()).or_default() += 1;
        }
        for (tag, count) in &by_tag {
            tracing::info!(tag, endpoints = count, "Endpoints by category");
        }

        for (i, endpoint) in endpoints.iter().enumerate() {
            tracing::info!(
                endpoint = %endpoint.path,
                index = i + 1,
                total = endpoints.len(),
                "Starting endpoint"
            );

            match self.harvest(endpoint, &openapi_dir).await {
                HarvestOutcome::AlreadyComplete => {
                    summary.skipped += 1;
                    metrics::record_endpoint("skipped", 0);
                }
                HarvestOutcome::Complete { records, .. } => {
                    summary.successful += 1;
                    summary.records += records;
                    metrics::record_endpoint("complete", records);
                }
                HarvestOutcome::Failed { records, .. } => {
                    summary.failed += 1;
                    summary.records += records;
                    metrics::record_endpoint("failed", records);
                }
            }

            if i + 1 < endpoints.len() && !self.endpoint_delay.is_zero() {
                tokio::time::sleep(self.endpoint_delay).await;
            }
        }

        tracing::info!(
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            records = summary.records,
            "API harvest finished"
        );
        summary
    }
}

/// Complete dump of `endpoint` in a finished sibling run, if any
///
/// Only applies when `dir` is the `openapi` directory of a run.
fn completed_elsewhere(endpoint: &EndpointDescriptor, dir: &Path) -> Option<PathBuf> {
    if dir.file_name().and_then(|n| n.to_str()) != Some(OPENAPI_DIR) {
        return None;
    }
    let run_dir = dir.parent()?;

    finished_runs(run_dir)
        .into_iter()
        .map(|run| endpoint.dump_path(&run.join(OPENAPI_DIR)))
        .find(|path| matches!(dump_status(path), Ok(Some(DumpStatus::Complete))))
}
