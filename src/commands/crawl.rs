use anyhow::{Context, Result};
use std::path::PathBuf;

use coletor::config::Config;
use coletor::crawler::{Orchestrator, RunSummary};
use coletor::metrics;
use coletor::storage::RunLayout;
use coletor::utils::format_bytes;

use super::print_harvest_summary;

pub async fn crawl(config: Config, metrics_file: Option<PathBuf>) -> Result<()> {
    println!("Starting DataSUS download");
    println!("=========================");

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let layout = RunLayout::create(&config.pipeline.output_root)
        .context("Failed to prepare output directory")?;
    println!("Run directory: {}", layout.tmp_dir().display());

    let orchestrator = Orchestrator::new(&config).context("Failed to build HTTP clients")?;
    let summary = orchestrator
        .run(layout.tmp_dir())
        .await
        .context("Dataset pipeline failed")?;

    let final_dir = match layout.promote() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::error!(error = %e, "Failed to promote run directory, files stay in place");
            layout.tmp_dir().to_path_buf()
        }
    };

    print_run_summary(&summary);
    println!("Output directory: {}", final_dir.display());

    if let Some(path) = metrics_file {
        match metrics::gather_text() {
            Ok(text) => match tokio::fs::write(&path, text).await {
                Ok(()) => println!("Metrics: {}", path.display()),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to write metrics"),
            },
            Err(e) => tracing::warn!(error = %e, "Failed to encode metrics"),
        }
    }

    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    println!("\nDataset Summary");
    println!("===============");
    println!("Datasets found: {}", summary.datasets);
    println!("Downloaded: {}", summary.success);
    println!("Already done: {}", summary.already_done);
    println!("Skipped: {}", summary.skipped);
    println!("Failed: {}", summary.failed);
    println!(
        "Files: {} ({})",
        summary.files_downloaded,
        format_bytes(summary.bytes_downloaded)
    );
    println!("Success rate: {:.1}%", summary.success_rate() * 100.0);

    if let Some(harvest) = &summary.harvest {
        print_harvest_summary(harvest);
    }
}
