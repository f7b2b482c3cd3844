use anyhow::{Context, Result};

use coletor::config::Config;
use coletor::harvester::OpenApiHarvester;
use coletor::metrics;
use coletor::storage::RunLayout;

use super::print_harvest_summary;

pub async fn harvest(config: Config) -> Result<()> {
    println!("Starting open-data API harvest");
    println!("==============================");

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let layout = RunLayout::create(&config.pipeline.output_root)
        .context("Failed to prepare output directory")?;

    let harvester = OpenApiHarvester::new(&config).context("Failed to build HTTP client")?;
    let summary = harvester.run(layout.tmp_dir()).await;

    let final_dir = match layout.promote() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::error!(error = %e, "Failed to promote run directory, files stay in place");
            layout.tmp_dir().to_path_buf()
        }
    };

    print_harvest_summary(&summary);
    println!("Output directory: {}", final_dir.display());
    Ok(())
}
