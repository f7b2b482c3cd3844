//! coletor - DataSUS open-data downloader
//!
//! Crawls the Ministry of Health catalog on opendatasus.saude.gov.br, keeps one
//! resource per dataset by format preference, downloads it with retries and
//! atomic writes, and then harvests the paginated endpoints of the open-data
//! REST API. Progress is tracked on disk so interrupted runs resume.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Catalog crawling, resolution, downloads and the worker pool
//! - [`harvester`] - OpenAPI endpoint discovery and paginated dumps
//! - [`parser`] - HTML document abstraction, selectors and script extraction
//! - [`models`] - Core data structures and types
//! - [`storage`] - Progress sidecar, endpoint dumps and run directories
//! - [`metrics`] - Prometheus counters
//! - [`utils`] - Retry policy, domain errors and filename helpers
//!
//! # Example
//!
//! ```no_run
//! use coletor::config::Config;
//! use coletor::crawler::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let orchestrator = Orchestrator::new(&config)?;
//!     let summary = orchestrator.run(std::path::Path::new("./output/datasus")).await?;
//!     println!("{} datasets downloaded", summary.success);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod harvester;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{Orchestrator, RunSummary};
    pub use crate::error::{ColetorErrorTrait, Error, ErrorCategory, Result};
    pub use crate::harvester::{HarvestSummary, OpenApiHarvester};
    pub use crate::models::{DownloadTask, EndpointDescriptor, ResourceFormat};
    pub use crate::storage::{ProgressTracker, RunLayout};
}

pub use models::{DatasetEntry, DatasetHeading, ResourceDescriptor, ResourceFormat};
