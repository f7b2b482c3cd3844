//! Crate-wide error type
//!
//! Each stage (fetch, parse, resolve, download, checkpoint) raises its own
//! enum from [`crate::utils::error`]. [`ColetorErrorTrait`] tells callers
//! whether a failure is worth another run and which [`ErrorCategory`] it
//! belongs to; the pipeline tags every failed dataset with that category.
//! [`Error`] is what the orchestrator itself can fail with.
//!
//! ```rust,ignore
//! use coletor::error::{ColetorErrorTrait, ErrorCategory, ResolveError};
//!
//! fn report(err: &ResolveError) {
//!     match err.category() {
//!         ErrorCategory::Credentials => eprintln!("API page changed: {err}"),
//!         _ if err.is_recoverable() => eprintln!("Re-run to retry: {err}"),
//!         _ => eprintln!("{err}"),
//!     }
//! }
//! ```

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub use crate::utils::error::{
    CheckpointError, DownloadError, FetchError, ParseError, ResolveError,
};

/// Common trait for all coletor error types
pub trait ColetorErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Timeouts, transport failures, non-2xx responses
    Network,
    /// Page did not have the expected structure
    Parsing,
    /// An API resource exposed neither credentials nor an embedded URL
    Credentials,
    /// File system and checkpoint errors
    Storage,
    /// Malformed URLs and other settings that cannot work
    Config,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Credentials => "credentials",
            Self::Storage => "storage",
            Self::Config => "config",
        }
    }
}

impl ColetorErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        self.is_transient()
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidUrl(_) => ErrorCategory::Config,
            Self::Decode(_) => ErrorCategory::Parsing,
            _ => ErrorCategory::Network,
        }
    }
}

impl ColetorErrorTrait for ParseError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Parsing
    }
}

impl ColetorErrorTrait for ResolveError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Parse(_) | Self::CredentialExtraction(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Parse(_) => ErrorCategory::Parsing,
            Self::CredentialExtraction(_) => ErrorCategory::Credentials,
        }
    }
}

impl ColetorErrorTrait for DownloadError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Io { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Io { .. } => ErrorCategory::Storage,
        }
    }
}

impl ColetorErrorTrait for CheckpointError {
    // A corrupt or unfinished checkpoint is redone from scratch
    fn is_recoverable(&self) -> bool {
        true
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

/// Unified error type for the coletor crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Creating the run directory failed
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ColetorErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Io { .. } => true, // I/O errors are often transient
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Io { .. } => ErrorCategory::Storage,
        }
    }
}

impl Error {
    /// Create an I/O error for `path`
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
