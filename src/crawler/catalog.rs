//! Catalog listing crawler with pagination support
//!
//! This module walks the CKAN organization listing: it counts the pagination
//! controls, reads each page's dataset items and fetches dataset detail pages.
//! Missing headings, links or pages are logged and skipped, never fatal.

use std::sync::Arc;

use crate::crawler::fetcher::PageFetcher;
use crate::models::{DatasetEntry, DatasetHeading};
use crate::parser::{CatalogSelectors, Document};
use crate::utils::error::FetchError;
use crate::utils::{absolute_url, clean_filename};

/// Catalog listing parser
pub struct CatalogParser {
    fetcher: Arc<PageFetcher>,
    selectors: CatalogSelectors,
    catalog_url: String,
    site_origin: String,
}

impl CatalogParser {
    /// Create a parser for the listing at `catalog_url`
    ///
    /// Relative dataset links are resolved against `site_origin`.
    #[must_use]
    pub fn new(fetcher: Arc<PageFetcher>, catalog_url: &str, site_origin: &str) -> Self {
        Self {
            fetcher,
            selectors: CatalogSelectors::new(),
            catalog_url: catalog_url.to_string(),
            site_origin: site_origin.to_string(),
        }
    }

    /// URL of listing page `page` (1-based)
    pub fn page_url(&self, page: u32) -> String {
        let separator = if self.catalog_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}page={page}", self.catalog_url)
    }

    /// Determine how many listing pages exist
    ///
    /// The catalog renders one `li.page-item` per page number plus a trailing
    /// "next" control, so the page count is one less than the number of
    /// controls. A listing without controls has a single page.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when the first page cannot be retrieved
    pub async fn page_count(&self) -> Result<u32, FetchError> {
        let document = self.fetcher.fetch(&self.catalog_url).await?;
        let pages = pages_from_controls(document.count(self.selectors.page_item));

        tracing::info!(url = %self.catalog_url, pages, "Found catalog pages");
        Ok(pages)
    }

    /// Read the dataset headings of one listing page
    ///
    /// A page that cannot be fetched yields an empty list.
    pub async fn list_headings(&self, page: u32) -> Vec<DatasetHeading> {
        let url = self.page_url(page);
        let document = match self.fetcher.fetch(&url).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(page, url = %url, error = %e, "Failed to get catalog page");
                return Vec::new();
            }
        };

        let headings = self.parse_headings(&document);
        tracing::info!(page, datasets = headings.len(), "Found datasets on page");
        headings
    }

    /// Extract dataset headings from a listing page
    pub fn parse_headings(&self, document: &Document) -> Vec<DatasetHeading> {
        document
            .select_all(self.selectors.dataset_item)
            .iter()
            .filter_map(|item| {
                let Some(link) = item.select_first(self.selectors.heading_link) else {
                    tracing::warn!("Dataset heading link not found");
                    return None;
                };

                let name = clean_filename(link.text());
                if name.is_empty() {
                    tracing::warn!("Dataset heading has no text");
                    return None;
                }

                let Some(href) = link.attr("href") else {
                    tracing::warn!(dataset = %name, "Dataset heading link has no href");
                    return None;
                };

                match absolute_url(&self.site_origin, href) {
                    Ok(url) => Some(DatasetHeading { name, url }),
                    Err(e) => {
                        tracing::warn!(dataset = %name, href, error = %e, "Invalid dataset link");
                        None
                    }
                }
            })
            .collect()
    }

    /// Fetch a dataset's detail page
    pub async fn load_dataset(&self, heading: &DatasetHeading) -> Option<DatasetEntry> {
        match self.try_load_dataset(heading).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(
                    dataset = %heading.name,
                    url = %heading.url,
                    error = %e,
                    "Failed to get dataset page"
                );
                None
            }
        }
    }

    /// [`load_dataset`](Self::load_dataset) keeping the fetch error
    ///
    /// # Errors
    ///
    /// Returns the fetch error once retries are exhausted
    pub async fn try_load_dataset(&self, heading: &DatasetHeading) -> Result<DatasetEntry, FetchError> {
        let detail = self.fetcher.fetch(&heading.url).await?;
        Ok(DatasetEntry {
            name: heading.name.clone(),
            source_url: heading.url.clone(),
            detail,
        })
    }

    /// Read one listing page and fetch the detail page of every dataset on it
    ///
    /// Datasets whose detail page cannot be retrieved are dropped.
    pub async fn extract_datasets(&self, page: u32) -> Vec<DatasetEntry> {
        let mut entries = Vec::new();
        for heading in self.list_headings(page).await {
            if let Some(entry) = self.load_dataset(&heading).await {
                entries.push(entry);
            }
        }
        entries
    }
}

fn pages_from_controls(controls: usize) -> u32 {
    (controls.saturating_sub(1).max(1)) as u32
}
