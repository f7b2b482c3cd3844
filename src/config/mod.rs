//! Configuration management for the coletor downloader
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Every field has a default matching the public
//! DataSUS portals, so an empty file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::retry::RetryConfig;

/// Catalog listing of the health ministry organization
pub const CATALOG_URL: &str = "https://opendatasus.saude.gov.br/organization/ministerio-da-saude";

/// Origin that relative catalog links are resolved against
pub const SITE_ORIGIN: &str = "https://opendatasus.saude.gov.br";

/// Origin of the open-data REST API
pub const API_ORIGIN: &str = "https://apidadosabertos.saude.gov.br";

/// Swagger document describing the REST API
pub const OPENAPI_SPEC_URL: &str = "https://apidadosabertos.saude.gov.br/static/swagger.json";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream locations
    pub catalog: CatalogConfig,

    /// HTTP client behavior
    pub http: HttpConfig,

    /// Dataset pipeline configuration
    pub pipeline: PipelineConfig,

    /// OpenAPI harvest configuration
    pub harvest: HarvestConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Upstream URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// First page of the dataset listing
    pub catalog_url: String,

    /// Origin for relative links found in catalog pages
    pub site_origin: String,

    /// Origin prepended to API paths found in embedded scripts and specs
    pub api_origin: String,

    /// Machine-readable API description
    pub openapi_spec_url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            catalog_url: CATALOG_URL.to_string(),
            site_origin: SITE_ORIGIN.to_string(),
            api_origin: API_ORIGIN.to_string(),
            openapi_spec_url: OPENAPI_SPEC_URL.to_string(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout for catalog and resource pages in seconds
    pub request_timeout_secs: u64,

    /// Timeout for file downloads in seconds
    pub download_timeout_secs: u64,

    /// Timeout for API page requests in seconds
    pub api_timeout_secs: u64,

    /// Total attempts per request
    pub max_attempts: u32,

    /// Constant delay between attempts in seconds
    pub retry_delay_secs: u64,

    /// Request pacing (requests per second)
    pub requests_per_second: u32,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            download_timeout_secs: 120,
            api_timeout_secs: 60,
            max_attempts: 5,
            retry_delay_secs: 20,
            requests_per_second: 5,
            user_agent: format!("coletor/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Dataset pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of datasets processed concurrently
    pub workers: usize,

    /// Root under which `datasus/tmp_<id>` run directories are created
    pub output_root: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            output_root: PathBuf::from("./output/downloader"),
        }
    }
}

/// OpenAPI harvest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Run the harvest after the dataset pipeline
    pub enabled: bool,

    /// Records requested per page
    pub page_limit: usize,

    /// Pages between two checkpoint writes
    pub checkpoint_interval: usize,

    /// Pause between two pages of one endpoint in milliseconds
    pub page_delay_ms: u64,

    /// Pause between two endpoints in milliseconds
    pub endpoint_delay_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            page_limit: 100,
            checkpoint_interval: 10,
            page_delay_ms: 500,
            endpoint_delay_ms: 1000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Override fields with any `COLETOR_*` environment variables that are set
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("COLETOR_CATALOG_URL") {
            self.catalog.catalog_url = v;
        }
        if let Ok(v) = std::env::var("COLETOR_SITE_ORIGIN") {
            self.catalog.site_origin = v;
        }
        if let Ok(v) = std::env::var("COLETOR_API_ORIGIN") {
            self.catalog.api_origin = v;
        }
        if let Ok(v) = std::env::var("COLETOR_OPENAPI_SPEC_URL") {
            self.catalog.openapi_spec_url = v;
        }
        if let Some(v) = env_parse("COLETOR_REQUEST_TIMEOUT") {
            self.http.request_timeout_secs = v;
        }
        if let Some(v) = env_parse("COLETOR_DOWNLOAD_TIMEOUT") {
            self.http.download_timeout_secs = v;
        }
        if let Some(v) = env_parse("COLETOR_MAX_ATTEMPTS") {
            self.http.max_attempts = v;
        }
        if let Some(v) = env_parse("COLETOR_RETRY_DELAY") {
            self.http.retry_delay_secs = v;
        }
        if let Some(v) = env_parse("COLETOR_RATE_LIMIT") {
            self.http.requests_per_second = v;
        }
        if let Ok(v) = std::env::var("COLETOR_USER_AGENT") {
            self.http.user_agent = v;
        }
        if let Some(v) = env_parse("COLETOR_WORKERS") {
            self.pipeline.workers = v;
        }
        if let Ok(v) = std::env::var("COLETOR_OUTPUT_ROOT") {
            self.pipeline.output_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("COLETOR_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("COLETOR_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            anyhow::bail!("pipeline.workers must be greater than 0");
        }

        if self.http.max_attempts == 0 {
            anyhow::bail!("http.max_attempts must be greater than 0");
        }

        if self.http.requests_per_second == 0 {
            anyhow::bail!("http.requests_per_second must be greater than 0");
        }

        if self.harvest.page_limit == 0 {
            anyhow::bail!("harvest.page_limit must be greater than 0");
        }

        if self.harvest.checkpoint_interval == 0 {
            anyhow::bail!("harvest.checkpoint_interval must be greater than 0");
        }

        for (name, value) in [
            ("catalog.catalog_url", &self.catalog.catalog_url),
            ("catalog.site_origin", &self.catalog.site_origin),
            ("catalog.api_origin", &self.catalog.api_origin),
            ("catalog.openapi_spec_url", &self.catalog.openapi_spec_url),
        ] {
            url::Url::parse(value).with_context(|| format!("{name} is not a valid URL"))?;
        }

        Ok(())
    }

    /// Retry policy shared by page fetches, downloads and API pages
    #[must_use]
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(
            self.http.max_attempts,
            Duration::from_secs(self.http.retry_delay_secs),
        )
    }

    /// Get page request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout_secs)
    }

    /// Get download timeout as Duration
    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.http.download_timeout_secs)
    }

    /// Get API page timeout as Duration
    #[must_use]
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.http.api_timeout_secs)
    }
}
