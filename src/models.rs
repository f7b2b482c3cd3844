// Core data structures for the coletor downloader

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::parser::Document;

/// A dataset as listed on a catalog page, before its detail page is fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHeading {
    pub name: String, // Sanitized heading text, unique key
    pub url: String,  // Absolute URL of the dataset detail page
}

/// A dataset together with its fetched detail page
#[derive(Debug, Clone)]
pub struct DatasetEntry {
    pub name: String,
    pub source_url: String,
    pub detail: Document,
}

/// Resource formats in preference order
///
/// Declaration order is the priority rank: lower is more preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceFormat {
    Api,
    Csv,
    Json,
    ZipCsv,
    Xlsx,
    Xls,
    Zip,
    Pdf,
    Odt,
}

impl ResourceFormat {
    /// All recognized formats, most preferred first
    pub const ALL: [ResourceFormat; 9] = [
        Self::Api,
        Self::Csv,
        Self::Json,
        Self::ZipCsv,
        Self::Xlsx,
        Self::Xls,
        Self::Zip,
        Self::Pdf,
        Self::Odt,
    ];

    /// Parse the format label shown on a resource item
    ///
    /// Labels are matched case-insensitively after trimming; unknown labels
    /// return `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        Self::ALL.into_iter().find(|f| f.label() == label)
    }

    /// Label as displayed by the catalog
    pub fn label(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::ZipCsv => "zip csv",
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Zip => "zip",
            Self::Pdf => "pdf",
            Self::Odt => "odt",
        }
    }

    /// Position in the preference order
    pub fn priority_rank(&self) -> usize {
        *self as usize
    }

    /// File extension used for downloads of this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Api => "json",
            Self::ZipCsv => "zip",
            other => other.label(),
        }
    }
}

impl fmt::Display for ResourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One downloadable resource offered by a dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub format: ResourceFormat,
    pub name: String, // Sanitized resource label
    pub href: String, // Link to the resource detail page, possibly relative
}

impl ResourceDescriptor {
    pub fn priority_rank(&self) -> usize {
        self.format.priority_rank()
    }
}

/// HTTP Basic credentials scraped from a resource page
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// One file to fetch, built after a resource has been resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub dataset_name: String,
    pub resource_name: String,
    pub format: ResourceFormat,
    pub output_dir: PathBuf,
    pub resolved_url: String,
    pub auth: Option<BasicAuth>,
    pub suffix: Option<String>, // Distinguishes several files of one resource
}

impl DownloadTask {
    /// `<dataset>_<resource>[_<suffix>].<ext>`
    pub fn file_name(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!(
                "{}_{}_{}.{}",
                self.dataset_name,
                self.resource_name,
                suffix,
                self.format.extension()
            ),
            None => format!(
                "{}_{}.{}",
                self.dataset_name,
                self.resource_name,
                self.format.extension()
            ),
        }
    }

    /// Full destination path
    pub fn destination(&self) -> PathBuf {
        self.output_dir.join(self.file_name())
    }
}

/// Persisted set of completed datasets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    #[serde(default)]
    pub completed_datasets: BTreeSet<String>,
}

/// A paginated list endpoint of the open-data API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub path: String,
    pub summary: String,
    pub tag: String,
    pub page_limit: usize,
}

impl EndpointDescriptor {
    /// Where the dump for this endpoint lives inside `dir`
    pub fn dump_path(&self, dir: &Path) -> PathBuf {
        dir.join(crate::utils::endpoint_filename(&self.path))
    }
}

/// Completion marker of an endpoint dump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpStatus {
    InProgress,
    Complete,
}

/// Metadata block of an endpoint dump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpMetadata {
    pub endpoint: String,
    pub summary: String,
    pub tag: String,
    pub download_date: DateTime<Utc>,
    pub total_records: usize,
    pub pages_downloaded: usize,
    pub elapsed_seconds: f64,
    pub status: DumpStatus,
}

/// Full contents of an endpoint dump file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDump {
    pub metadata: DumpMetadata,
    pub data: Vec<serde_json::Value>,
}

impl EndpointDump {
    pub fn is_complete(&self) -> bool {
        self.metadata.status == DumpStatus::Complete
    }
}
