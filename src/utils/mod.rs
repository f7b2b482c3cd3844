//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use crate::utils::error::FetchError;

/// Strip every character that cannot be part of a catalog-derived filename
///
/// Catalog headings and resource labels are turned into file name fragments by
/// deleting all whitespace (including newlines and tabs) and path separators.
/// Nothing is substituted, so `"Dados SUS / 2024"` becomes `"DadosSUS2024"`.
pub fn clean_filename(name: &str) -> String {
    static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();

    let re = UNSAFE_CHARS.get_or_init(|| Regex::new(r"[\s/\\]+").expect("Invalid regex pattern"));

    re.replace_all(name, "").into_owned()
}

/// File name for an endpoint dump: `/a/b` → `a_b.json`
pub fn endpoint_filename(path: &str) -> String {
    let stem = path.trim_start_matches('/').replace('/', "_");
    format!("{stem}.json")
}

/// Resolve a possibly relative link against a site origin
///
/// Absolute links are returned as-is, links starting with `/` are joined onto
/// the origin.
pub fn absolute_url(origin: &str, href: &str) -> Result<String, FetchError> {
    let href = href.trim();
    if let Ok(url) = Url::parse(href) {
        return Ok(url.to_string());
    }

    let base = Url::parse(origin).map_err(|e| FetchError::InvalidUrl(format!("{origin}: {e}")))?;
    base.join(href)
        .map(|u| u.to_string())
        .map_err(|e| FetchError::InvalidUrl(format!("{href}: {e}")))
}

/// Format byte size as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return String::from("0 B");
    }

    let base: f64 = 1024.0;
    let exponent = (bytes as f64).log(base).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes as f64 / base.powi(exponent as i32);

    format!("{value:.2} {}", UNITS[exponent])
}
