//! Dataset completion tracking
//!
//! The set of completed datasets lives in a sidecar file one level above the
//! run directory (`<parent>/.datasus_progress.json`), so it survives the
//! per-run `tmp_<id>` directories. The file is rewritten in full on every
//! change.

use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::models::{DumpStatus, ProgressState};
use crate::storage::checkpoint::{dump_status, write_json_atomic};
use crate::utils::error::CheckpointError;

/// Sidecar file name
pub const PROGRESS_FILE: &str = ".datasus_progress.json";

/// Prefix of in-flight run directories, never consulted by verification
pub const TMP_DIR_PREFIX: &str = "tmp_";

/// Tracks which datasets are done, shared by all pipeline workers
pub struct ProgressTracker {
    path: PathBuf,
    state: Mutex<ProgressState>,
}

impl ProgressTracker {
    /// Load the sidecar belonging to `output_dir`
    ///
    /// A missing sidecar starts empty. An unreadable or corrupt one is logged
    /// and also starts empty; verification on disk then decides what is done.
    pub fn load(output_dir: &Path) -> Self {
        Self::open(sidecar_path(output_dir))
    }

    /// Load a sidecar file at an explicit location
    pub fn open(path: PathBuf) -> Self {
        let state = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<ProgressState>(&content) {
                Ok(state) => {
                    tracing::info!(
                        completed = state.completed_datasets.len(),
                        path = %path.display(),
                        "Loaded progress"
                    );
                    state
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse progress file, starting fresh");
                    ProgressState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No previous progress found, starting fresh");
                ProgressState::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read progress file, starting fresh");
                ProgressState::default()
            }
        };

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Location of the sidecar file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_completed(&self, name: &str) -> bool {
        self.state.lock().await.completed_datasets.contains(name)
    }

    /// Record `name` as done and persist the whole state
    ///
    /// Marking an already completed dataset rewrites nothing.
    ///
    /// # Errors
    ///
    /// Returns the write error; the in-memory state keeps the dataset either way
    pub async fn mark_completed(&self, name: &str) -> Result<(), CheckpointError> {
        let mut state = self.state.lock().await;
        if !state.completed_datasets.insert(name.to_string()) {
            return Ok(());
        }

        write_json_atomic(&self.path, &*state)?;
        tracing::info!(
            dataset = name,
            total = state.completed_datasets.len(),
            "Marked dataset as completed"
        );
        Ok(())
    }

    pub async fn completed_count(&self) -> usize {
        self.state.lock().await.completed_datasets.len()
    }
}

/// `<parent of output_dir>/.datasus_progress.json`
pub fn sidecar_path(output_dir: &Path) -> PathBuf {
    output_dir
        .parent()
        .unwrap_or(output_dir)
        .join(PROGRESS_FILE)
}

/// Check whether a dataset's files already exist on disk
///
/// Looks in `output_dir` first, then in every finished sibling run. A
/// directory verifies when it holds at least one `<name>_*` file and every
/// matching checkpoint document in it is complete. Blocking.
pub fn verify_dataset_files(name: &str, output_dir: &Path) -> bool {
    verify_directory(output_dir, name)
        || finished_runs(output_dir)
            .iter()
            .any(|dir| verify_directory(dir, name))
}

/// Sibling run directories of `run_dir` that finished
///
/// Leaves out `run_dir` itself and every in-flight `tmp_*` directory.
pub fn finished_runs(run_dir: &Path) -> Vec<PathBuf> {
    let Some(parent) = run_dir.parent() else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(parent) else {
        return Vec::new();
    };

    let mut runs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path != run_dir)
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.starts_with(TMP_DIR_PREFIX))
        })
        .collect();
    runs.sort();
    runs
}

fn verify_directory(dir: &Path, name: &str) -> bool {
    let files = matching_files(dir, name);
    if files.is_empty() {
        return false;
    }

    for file in files.iter().filter(|f| f.extension().is_some_and(|e| e == "json")) {
        match dump_status(file) {
            Ok(None) | Ok(Some(DumpStatus::Complete)) => {}
            Ok(Some(DumpStatus::InProgress)) => {
                tracing::warn!(dataset = name, path = %file.display(), "Found incomplete checkpoint");
                return false;
            }
            Err(e) => {
                tracing::warn!(dataset = name, path = %file.display(), error = %e, "Failed to check JSON file");
                return false;
            }
        }
    }

    tracing::info!(
        dataset = name,
        files = files.len(),
        dir = %dir.display(),
        "Found complete files for dataset"
    );
    true
}

fn matching_files(dir: &Path, name: &str) -> Vec<PathBuf> {
    let prefix = format!("{name}_");
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name().and_then(|n| n.to_str()).is_some_and(|n| {
                n.starts_with(&prefix) && !n.ends_with(".part") && !n.ends_with(".tmp")
            })
        })
        .collect()
}
