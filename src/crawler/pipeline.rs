//! Dataset processing pipeline
//!
//! This module implements a producer-consumer pattern using tokio::mpsc
//! channels:
//!
//! ```text
//!   ┌──────────┐  DatasetJob   ┌───────────────┐  JobResult  ┌───────────┐
//!   │ Catalog  │ ────────────> │ Worker pool   │ ──────────> │ Collector │
//!   │ producer │  mpsc channel │ (N workers)   │ mpsc channel│ (stats)   │
//!   └──────────┘               └───────────────┘             └───────────┘
//! ```
//!
//! The producer walks the catalog pages and deduplicates datasets by name.
//! Each worker takes one dataset at a time through detail page, format
//! selection, resolution and downloads, then marks it completed. Once the
//! pool drains, the API harvester runs over the same output directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::crawler::catalog::CatalogParser;
use crate::crawler::download::{api_task, tasks_for, DownloadOutcome, Downloader};
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::format::{parse_resources, select_best};
use crate::crawler::resolver::{Resolution, ResourceResolver};
use crate::error::{ColetorErrorTrait, Error, ErrorCategory, Result};
use crate::harvester::{HarvestSummary, OpenApiHarvester};
use crate::metrics;
use crate::models::{DatasetHeading, DownloadTask, ResourceFormat};
use crate::storage::{verify_dataset_files, ProgressTracker};

// ============================================================================
// Job Types
// ============================================================================

/// One dataset queued for processing
#[derive(Debug, Clone)]
pub struct DatasetJob {
    pub job_id: u64,
    pub heading: DatasetHeading,
}

/// Result message for tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    /// Every file of the dataset is on disk
    Success {
        name: String,
        files: u64,
        bytes: u64,
    },
    /// A page, link or download failed; retried on the next run
    Failed {
        name: String,
        reason: String,
        category: ErrorCategory,
    },
    /// Nothing downloadable was found
    Skipped { name: String, reason: String },
    /// Completed by an earlier run
    AlreadyDone { name: String },
}

// ============================================================================
// Pipeline Statistics
// ============================================================================

/// Pipeline statistics (thread-safe)
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub total_jobs: AtomicU64,
    pub success_count: AtomicU64,
    pub failed_count: AtomicU64,
    pub skipped_count: AtomicU64,
    pub already_done_count: AtomicU64,
    pub files_downloaded: AtomicU64,
    pub bytes_downloaded: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fold one job result into the counters
    pub fn record(&self, result: &JobResult) {
        match result {
            JobResult::Success { files, bytes, .. } => {
                self.success_count.fetch_add(1, Ordering::Relaxed);
                self.files_downloaded.fetch_add(*files, Ordering::Relaxed);
                self.bytes_downloaded.fetch_add(*bytes, Ordering::Relaxed);
            }
            JobResult::Failed { .. } => {
                self.failed_count.fetch_add(1, Ordering::Relaxed);
            }
            JobResult::Skipped { .. } => {
                self.skipped_count.fetch_add(1, Ordering::Relaxed);
            }
            JobResult::AlreadyDone { .. } => {
                self.already_done_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Jobs that have reported a result
    pub fn processed(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
            + self.failed_count.load(Ordering::Relaxed)
            + self.skipped_count.load(Ordering::Relaxed)
            + self.already_done_count.load(Ordering::Relaxed)
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            datasets: self.total_jobs.load(Ordering::Relaxed),
            success: self.success_count.load(Ordering::Relaxed),
            failed: self.failed_count.load(Ordering::Relaxed),
            skipped: self.skipped_count.load(Ordering::Relaxed),
            already_done: self.already_done_count.load(Ordering::Relaxed),
            files_downloaded: self.files_downloaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            harvest: None,
        }
    }
}

/// Aggregate counts of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub datasets: u64,
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    pub already_done: u64,
    pub files_downloaded: u64,
    pub bytes_downloaded: u64,
    pub harvest: Option<HarvestSummary>,
}

impl RunSummary {
    /// Share of processed datasets that ended completed (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        let total = self.success + self.failed + self.skipped + self.already_done;
        if total == 0 {
            return 1.0;
        }
        (self.success + self.already_done) as f64 / total as f64
    }
}

// ============================================================================
// Dataset Worker
// ============================================================================

/// Per-dataset processing shared by all pool workers
struct DatasetWorker {
    catalog: Arc<CatalogParser>,
    resolver: ResourceResolver,
    downloader: Downloader,
    progress: Arc<ProgressTracker>,
}

impl DatasetWorker {
    async fn process(&self, heading: &DatasetHeading, output_dir: &Path) -> JobResult {
        let name = heading.name.clone();

        if self.progress.is_completed(&name).await {
            tracing::debug!(dataset = %name, "Already completed, skipping");
            return JobResult::AlreadyDone { name };
        }

        if verify_on_disk(&name, output_dir).await {
            self.complete(&name).await;
            return JobResult::AlreadyDone { name };
        }

        let entry = match self.catalog.try_load_dataset(heading).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dataset = %name, url = %heading.url, error = %e, "Failed to get dataset page");
                return failed(name, &e);
            }
        };

        let resources = parse_resources(&entry.detail);
        let Some(resource) = select_best(&resources) else {
            tracing::warn!(dataset = %name, resources = resources.len(), "No resource in a recognized format");
            return JobResult::Skipped {
                name,
                reason: "no recognized resource format".into(),
            };
        };
        tracing::info!(
            dataset = %name,
            resource = %resource.name,
            format = %resource.format,
            "Selected resource"
        );

        let resolution = match self.resolver.try_resolve(resource).await {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!(dataset = %name, resource = %resource.name, error = %e, "Download link not found");
                return failed(name, &e);
            }
        };

        let tasks: Vec<DownloadTask> = match (resource.format, &resolution) {
            (ResourceFormat::Api, Resolution::Direct { page, link }) => {
                match self.resolver.resolve_api(page, link).await {
                    Ok(target) => match api_task(&name, resource, output_dir, &target) {
                        Some(task) => vec![task],
                        None => {
                            self.complete(&name).await;
                            return JobResult::Success {
                                name,
                                files: 0,
                                bytes: 0,
                            };
                        }
                    },
                    Err(e) => {
                        tracing::warn!(dataset = %name, resource = %resource.name, error = %e, "API resolution failed");
                        return failed(name, &e);
                    }
                }
            }
            _ => tasks_for(&name, resource, output_dir, &resolution),
        };

        if tasks.is_empty() {
            tracing::warn!(dataset = %name, resource = %resource.name, "Resource lists no files");
            return JobResult::Skipped {
                name,
                reason: "resource lists no files".into(),
            };
        }

        let mut files = 0u64;
        let mut bytes = 0u64;
        let mut failures = 0usize;
        let mut category = None;
        for task in &tasks {
            match self.downloader.download(task).await {
                Ok(DownloadOutcome::Downloaded { bytes: written }) => {
                    files += 1;
                    bytes += written;
                }
                Ok(DownloadOutcome::Skipped) => {}
                Err(e) => {
                    tracing::warn!(dataset = %name, url = %task.resolved_url, error = %e, "Download failed");
                    failures += 1;
                    category.get_or_insert(e.category());
                }
            }
        }

        if let Some(category) = category {
            return JobResult::Failed {
                reason: format!("{failures} of {} downloads failed", tasks.len()),
                name,
                category,
            };
        }

        self.complete(&name).await;
        JobResult::Success { name, files, bytes }
    }

    async fn complete(&self, name: &str) {
        if let Err(e) = self.progress.mark_completed(name).await {
            tracing::warn!(dataset = name, error = %e, "Failed to persist progress");
        }
    }
}

fn failed(name: String, error: &impl ColetorErrorTrait) -> JobResult {
    JobResult::Failed {
        name,
        reason: error.to_string(),
        category: error.category(),
    }
}

/// Scan the run directory and its finished siblings off the async workers
async fn verify_on_disk(name: &str, output_dir: &Path) -> bool {
    let name = name.to_string();
    let output_dir = output_dir.to_path_buf();
    match tokio::task::spawn_blocking(move || verify_dataset_files(&name, &output_dir)).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(error = %e, "File verification task failed");
            false
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs the dataset pipeline followed by the API harvest
pub struct Orchestrator {
    workers: usize,
    catalog: Arc<CatalogParser>,
    fetcher: Arc<PageFetcher>,
    config: Config,
    harvester: Option<OpenApiHarvester>,
    stats: Arc<PipelineStats>,
}

impl Orchestrator {
    /// Build every component from the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be created
    pub fn new(config: &Config) -> Result<Self> {
        let fetcher = Arc::new(PageFetcher::new(config)?);
        let catalog = Arc::new(CatalogParser::new(
            Arc::clone(&fetcher),
            &config.catalog.catalog_url,
            &config.catalog.site_origin,
        ));

        let harvester = if config.harvest.enabled {
            Some(OpenApiHarvester::new(config)?)
        } else {
            None
        };

        Ok(Self {
            workers: config.pipeline.workers.max(1),
            catalog,
            fetcher,
            config: config.clone(),
            harvester,
            stats: PipelineStats::new(),
        })
    }

    /// Live counters of the current run
    pub fn stats(&self) -> RunSummary {
        self.stats.snapshot()
    }

    /// Process the whole catalog into `output_dir`
    ///
    /// Individual dataset or endpoint failures are counted, not returned.
    ///
    /// # Errors
    ///
    /// Fails only when `output_dir` cannot be created or components cannot be
    /// built
    pub async fn run(&self, output_dir: &Path) -> Result<RunSummary> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| Error::io(output_dir, e))?;

        let progress = Arc::new(ProgressTracker::load(output_dir));
        let worker = Arc::new(DatasetWorker {
            catalog: Arc::clone(&self.catalog),
            resolver: ResourceResolver::new(
                Arc::clone(&self.fetcher),
                &self.config.catalog.site_origin,
                &self.config.catalog.api_origin,
            ),
            downloader: Downloader::new(&self.config)?,
            progress: Arc::clone(&progress),
        });

        tracing::info!(
            workers = self.workers,
            output = %output_dir.display(),
            already_completed = progress.completed_count().await,
            "Starting dataset pipeline"
        );

        let (job_tx, job_rx) = mpsc::channel::<DatasetJob>(self.workers * 2);
        let (result_tx, mut result_rx) = mpsc::channel::<JobResult>(self.workers * 2);

        let handles = self.spawn_workers(job_rx, result_tx, worker, output_dir.to_path_buf());

        let stats = Arc::clone(&self.stats);
        let collector = tokio::spawn(async move {
            while let Some(result) = result_rx.recv().await {
                stats.record(&result);
                let processed = stats.processed();
                match &result {
                    JobResult::Success { name, files, bytes } => {
                        metrics::record_dataset("success");
                        tracing::info!(dataset = %name, files, bytes, processed, "Dataset completed");
                    }
                    JobResult::Failed {
                        name,
                        reason,
                        category,
                    } => {
                        metrics::record_dataset("failed");
                        metrics::record_dataset_failure(category.as_str());
                        tracing::warn!(
                            dataset = %name,
                            reason = %reason,
                            category = category.as_str(),
                            processed,
                            "Dataset failed"
                        );
                    }
                    JobResult::Skipped { name, reason } => {
                        metrics::record_dataset("skipped");
                        tracing::info!(dataset = %name, reason = %reason, processed, "Dataset skipped");
                    }
                    JobResult::AlreadyDone { name } => {
                        metrics::record_dataset("already_done");
                        tracing::debug!(dataset = %name, processed, "Dataset already done");
                    }
                }
            }
        });

        self.produce(job_tx).await;

        for handle in handles {
            let _ = handle.await;
        }
        let _ = collector.await;

        let mut summary = self.stats.snapshot();
        tracing::info!(
            datasets = summary.datasets,
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            already_done = summary.already_done,
            files = summary.files_downloaded,
            bytes = summary.bytes_downloaded,
            "Dataset pipeline completed"
        );

        if let Some(harvester) = &self.harvester {
            summary.harvest = Some(harvester.run(output_dir).await);
        }

        Ok(summary)
    }

    /// Walk the catalog and queue each distinct dataset once
    async fn produce(&self, job_tx: mpsc::Sender<DatasetJob>) {
        let pages = match self.catalog.page_count().await {
            Ok(pages) => pages,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read catalog pagination");
                return;
            }
        };

        let mut seen: HashMap<String, String> = HashMap::new();
        let mut job_id = 0u64;

        for page in 1..=pages {
            for heading in self.catalog.list_headings(page).await {
                if let Some(first_url) = seen.get(&heading.name) {
                    if *first_url != heading.url {
                        tracing::warn!(
                            dataset = %heading.name,
                            kept = %first_url,
                            dropped = %heading.url,
                            "Dataset name collision, keeping first"
                        );
                    }
                    continue;
                }
                seen.insert(heading.name.clone(), heading.url.clone());

                job_id += 1;
                self.stats.total_jobs.fetch_add(1, Ordering::Relaxed);
                if job_tx.send(DatasetJob { job_id, heading }).await.is_err() {
                    tracing::error!("Job channel closed");
                    return;
                }
            }
        }

        tracing::info!(datasets = seen.len(), pages, "Catalog fully listed");
    }

    fn spawn_workers(
        &self,
        job_rx: mpsc::Receiver<DatasetJob>,
        result_tx: mpsc::Sender<JobResult>,
        worker: Arc<DatasetWorker>,
        output_dir: PathBuf,
    ) -> Vec<JoinHandle<()>> {
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
        let mut handles = Vec::with_capacity(self.workers);

        for worker_id in 0..self.workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let worker = Arc::clone(&worker);
            let output_dir = output_dir.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = job_rx.lock().await;
                        rx.recv().await
                    };

                    let Some(job) = job else {
                        break;
                    };

                    tracing::debug!(worker_id, job_id = job.job_id, dataset = %job.heading.name, "Processing dataset");
                    let result = worker.process(&job.heading, &output_dir).await;

                    if result_tx.send(result).await.is_err() {
                        tracing::error!("Result channel closed");
                        break;
                    }
                }

                tracing::debug!(worker_id, "Worker shutting down");
            }));
        }

        handles
    }
}
