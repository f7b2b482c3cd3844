//! Run directory layout
//!
//! A run downloads into `<root>/datasus/tmp_<uuid>` and, once finished, its
//! contents move into `<root>/datasus/<YYYYmmdd_HHMMSS>`. Interrupted runs
//! leave their `tmp_*` directory behind; verification ignores those.

use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::storage::progress::TMP_DIR_PREFIX;
use crate::utils::error::CheckpointError;

/// Source directory name under the output root
pub const SOURCE_DIR: &str = "datasus";

/// Directories of one run
#[derive(Debug, Clone)]
pub struct RunLayout {
    source_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl RunLayout {
    /// Create a fresh `tmp_<uuid>` directory under `<root>/datasus`
    ///
    /// # Errors
    ///
    /// Returns `CheckpointError::Io` if the directory cannot be created
    pub fn create(root: &Path) -> Result<Self, CheckpointError> {
        let source_dir = root.join(SOURCE_DIR);
        let tmp_dir = source_dir.join(format!("{TMP_DIR_PREFIX}{}", Uuid::new_v4()));

        fs::create_dir_all(&tmp_dir).map_err(|e| CheckpointError::io(&tmp_dir, e))?;
        tracing::info!(dir = %tmp_dir.display(), "Created run directory");

        Ok(Self {
            source_dir,
            tmp_dir,
        })
    }

    /// Directory the current run writes into
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    /// `<root>/datasus`
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Move finished files into a timestamped directory and drop the tmp dir
    ///
    /// Leftover `.part`/`.tmp` files are discarded rather than moved.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointError::Io` if a file cannot be moved
    pub fn promote(&self) -> Result<PathBuf, CheckpointError> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let final_dir = self.source_dir.join(timestamp);
        fs::create_dir_all(&final_dir).map_err(|e| CheckpointError::io(&final_dir, e))?;

        let entries = fs::read_dir(&self.tmp_dir).map_err(|e| CheckpointError::io(&self.tmp_dir, e))?;
        let mut moved = 0usize;
        for entry in entries {
            let entry = entry.map_err(|e| CheckpointError::io(&self.tmp_dir, e))?;
            let from = entry.path();
            let file_name = entry.file_name();

            if file_name
                .to_str()
                .is_some_and(|n| n.ends_with(".part") || n.ends_with(".tmp"))
            {
                let _ = fs::remove_file(&from);
                continue;
            }

            let to = final_dir.join(&file_name);
            fs::rename(&from, &to).map_err(|e| CheckpointError::io(&from, e))?;
            moved += 1;
        }

        fs::remove_dir(&self.tmp_dir).map_err(|e| CheckpointError::io(&self.tmp_dir, e))?;
        tracing::info!(dir = %final_dir.display(), entries = moved, "Run output promoted");
        Ok(final_dir)
    }
}
