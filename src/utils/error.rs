//! Error types for the coletor downloader
//!
//! This module defines the domain error types used throughout the application.
//! Every variant maps onto one of four handling strategies: transient network
//! failures are retried, parse mismatches are skipped immediately, credential
//! extraction failures skip a single resource, and checkpoint corruption forces
//! a redo.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts exceeded after {attempts} attempts: {last}")]
    MaxRetriesExceeded { attempts: u32, last: String },

    /// Content decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Timeouts, transport errors and status failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::ServerError(_) | Self::Timeout => true,
            Self::MaxRetriesExceeded { .. } | Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Errors raised when a page does not have the expected structure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Expected element is absent
    #[error("Element not found: {0}")]
    MissingElement(&'static str),

    /// Expected attribute is absent
    #[error("Attribute '{attribute}' missing on {element}")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    /// Invalid CSS selector
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

/// Errors that can occur while resolving a resource to a downloadable URL
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Fetching the resource page or link target failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// The resource page did not have the expected structure
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// An api resource had neither credentials nor an embedded URL
    #[error("No credentials or embedded API URL found at {0}")]
    CredentialExtraction(String),
}

/// Errors that can occur while downloading a file to disk
#[derive(Error, Debug)]
pub enum DownloadError {
    /// All attempts to fetch the file failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Writing the file failed
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that can occur while reading or writing checkpoint files
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// File system error
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid JSON
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Checkpoint document carries no status marker
    #[error("Checkpoint {0} has no status field")]
    MissingStatus(PathBuf),
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
