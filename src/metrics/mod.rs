//! Prometheus metrics for the dataset pipeline and the API harvester
//!
//! This module tracks:
//! - Datasets by outcome (success, failed, skipped, already_done)
//! - Dataset failures by error category
//! - File downloads by outcome, bytes written and transfer duration
//! - Harvested endpoints by outcome and records collected
//!
//! # Usage
//!
//! Call `init_metrics()` once at startup. If initialization fails, recording
//! functions become no-ops. `gather_text()` renders the text exposition that
//! `crawl --metrics-file` writes at the end of a run.

use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct ColetorMetrics {
    datasets: CounterVec,
    dataset_failures: CounterVec,
    downloads: CounterVec,
    download_bytes: Counter,
    download_duration: Histogram,
    endpoints: CounterVec,
    harvest_records: Counter,
}

static METRICS: OnceLock<ColetorMetrics> = OnceLock::new();

static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Register all metrics with the default Prometheus registry
///
/// Safe to call more than once; only the first call registers anything.
///
/// # Errors
///
/// Returns the registration error if a metric could not be registered
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = ColetorMetrics {
        datasets: register_counter_vec!(
            "coletor_datasets_total",
            "Datasets processed by outcome",
            &["outcome"]
        )?,
        dataset_failures: register_counter_vec!(
            "coletor_dataset_failures_total",
            "Failed datasets by error category",
            &["category"]
        )?,
        downloads: register_counter_vec!(
            "coletor_downloads_total",
            "File downloads by outcome",
            &["outcome"]
        )?,
        download_bytes: register_counter!(
            "coletor_download_bytes_total",
            "Bytes written by completed downloads"
        )?,
        download_duration: register_histogram!(
            "coletor_download_duration_seconds",
            "Time spent on one file download, retries included",
            vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
        )?,
        endpoints: register_counter_vec!(
            "coletor_endpoints_total",
            "Harvested API endpoints by outcome",
            &["outcome"]
        )?,
        harvest_records: register_counter!(
            "coletor_harvest_records_total",
            "Records collected from the open-data API"
        )?,
    };

    METRICS
        .set(metrics)
        .map_err(|_| "Metrics already initialized")?;

    tracing::debug!("Prometheus metrics initialized");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    METRICS.get().is_some()
}

// ============================================================================
// Recording
// ============================================================================

/// Render every registered metric in the Prometheus text format
///
/// # Errors
///
/// Returns an error if encoding fails
pub fn gather_text() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the outcome of one dataset
pub fn record_dataset(outcome: &str) {
    if let Some(m) = METRICS.get() {
        m.datasets.with_label_values(&[outcome]).inc();
    }
}

/// Record the error category of a failed dataset
pub fn record_dataset_failure(category: &str) {
    if let Some(m) = METRICS.get() {
        m.dataset_failures.with_label_values(&[category]).inc();
    }
}

/// Record one download attempt sequence
pub fn record_download(outcome: &str, bytes: u64) {
    let Some(m) = METRICS.get() else {
        return;
    };

    m.downloads.with_label_values(&[outcome]).inc();
    if bytes > 0 {
        m.download_bytes.inc_by(bytes as f64);
    }
}

/// Record the outcome of one harvested endpoint
pub fn record_endpoint(outcome: &str, records: usize) {
    let Some(m) = METRICS.get() else {
        return;
    };

    m.endpoints.with_label_values(&[outcome]).inc();
    if records > 0 {
        m.harvest_records.inc_by(records as f64);
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start timing a download
pub fn start_download_timer() -> MetricsTimer {
    MetricsTimer {
        timer: METRICS.get().map(|m| m.download_duration.start_timer()),
    }
}
