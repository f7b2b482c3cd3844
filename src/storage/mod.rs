//! On-disk state: progress sidecar, endpoint dumps and run directories

pub mod checkpoint;
pub mod layout;
pub mod progress;

pub use checkpoint::{dump_status, load_dump, save_dump, save_dump_parts, write_json_atomic};
pub use layout::RunLayout;
pub use progress::{finished_runs, verify_dataset_files, ProgressTracker};
