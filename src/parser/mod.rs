//! HTML parsing and data extraction
//!
//! This module hides the markup library behind a narrow document interface
//! and keeps the catalog's selectors and inline-script extraction in one place.

pub mod document;
pub mod script;
pub mod selectors;

pub use document::{Document, Element};
pub use selectors::{CatalogSelectors, ResourceSelectors};
