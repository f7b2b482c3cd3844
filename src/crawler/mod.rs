//! Catalog crawling and file downloading
//!
//! This module turns the DataSUS catalog into files on disk:
//! - [`fetcher`] - paced, retrying HTTP GET
//! - [`catalog`] - listing pages and dataset detail pages
//! - [`format`] - resource discovery and format selection
//! - [`resolver`] - download link, notes and API resolution
//! - [`download`] - streaming downloads with atomic writes
//! - [`pipeline`] - bounded worker pool driving all of the above

pub mod catalog;
pub mod download;
pub mod fetcher;
pub mod format;
pub mod pipeline;
pub mod resolver;

pub use catalog::CatalogParser;
pub use download::{DownloadOutcome, Downloader};
pub use fetcher::PageFetcher;
pub use format::{parse_resources, select_best};
pub use pipeline::{JobResult, Orchestrator, RunSummary};
pub use resolver::{ApiTarget, ListedLink, Resolution, ResourceResolver};
