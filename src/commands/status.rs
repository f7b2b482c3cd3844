use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use coletor::config::Config;
use coletor::harvester::OPENAPI_DIR;
use coletor::models::DumpStatus;
use coletor::storage::dump_status;
use coletor::storage::layout::SOURCE_DIR;
use coletor::storage::progress::{ProgressTracker, PROGRESS_FILE, TMP_DIR_PREFIX};

pub async fn status(config: &Config) -> Result<()> {
    let source_dir = config.pipeline.output_root.join(SOURCE_DIR);

    if !source_dir.exists() {
        println!("No downloads found under {}", source_dir.display());
        println!("Run `coletor crawl` first.");
        return Ok(());
    }

    let tracker = ProgressTracker::open(source_dir.join(PROGRESS_FILE));
    let completed = tracker.completed_count().await;

    println!("DataSUS Download Status");
    println!("=======================");
    println!("Progress file: {}", tracker.path().display());
    println!("Completed datasets: {completed}");

    let mut runs: Vec<_> = fs::read_dir(&source_dir)
        .with_context(|| format!("Failed to read {}", source_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    runs.sort();

    println!("\nRuns");
    println!("----");
    for run in &runs {
        let name = run
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let kind = if name.starts_with(TMP_DIR_PREFIX) {
            "interrupted"
        } else {
            "finished"
        };
        let (complete, in_progress) = dump_counts(&run.join(OPENAPI_DIR));

        println!(
            "{name} [{kind}] files: {}, API dumps: {complete} complete / {in_progress} in progress",
            count_files(run)
        );
    }

    if runs.is_empty() {
        println!("(none)");
    }

    Ok(())
}

fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .count()
        })
        .unwrap_or(0)
}

fn dump_counts(dir: &Path) -> (usize, usize) {
    let Ok(entries) = fs::read_dir(dir) else {
        return (0, 0);
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|e| e == "json"))
        .fold((0, 0), |(complete, in_progress), path| match dump_status(&path) {
            Ok(Some(DumpStatus::Complete)) => (complete + 1, in_progress),
            _ => (complete, in_progress + 1),
        })
}
