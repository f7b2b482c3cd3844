//! CSS selectors for the CKAN-based open-data catalog
//!
//! All knowledge about the catalog's markup lives here. When the portal
//! changes its templates, this is the only file that should need to change.

use lazy_static::lazy_static;
use scraper::Selector;

// Helper macro to parse selectors safely at compile time
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    // Catalog listing page
    static ref PAGE_ITEM: Selector = parse_selector!("li.page-item");
    static ref DATASET_ITEM: Selector = parse_selector!("li.dataset-item");
    static ref DATASET_HEADING_LINK: Selector = parse_selector!("h2.dataset-heading a");

    // Dataset detail page
    static ref RESOURCE_ITEM: Selector = parse_selector!("li.resource-item");
    static ref ANCHOR: Selector = parse_selector!("a");
    static ref ANCHOR_WITH_HREF: Selector = parse_selector!("a[href]");
    static ref LABEL: Selector = parse_selector!("span");

    // Resource detail page
    static ref DOWNLOAD_BUTTON: Selector = parse_selector!("div.btn-group");
    static ref NOTES: Selector = parse_selector!("div.prose.notes");
    static ref API_LINK: Selector = parse_selector!("div.row.wrapper > section > div > p > a");
    static ref PARAGRAPH: Selector = parse_selector!("p");

    // Any page
    static ref SCRIPT: Selector = parse_selector!("script");
}

/// Selectors for catalog listing pages
pub struct CatalogSelectors {
    /// One per pagination control
    pub page_item: &'static Selector,
    /// One per dataset in the listing
    pub dataset_item: &'static Selector,
    /// Heading link inside a dataset item
    pub heading_link: &'static Selector,
}

impl CatalogSelectors {
    pub fn new() -> Self {
        Self {
            page_item: &PAGE_ITEM,
            dataset_item: &DATASET_ITEM,
            heading_link: &DATASET_HEADING_LINK,
        }
    }
}

impl Default for CatalogSelectors {
    fn default() -> Self {
        Self::new()
    }
}

/// Selectors for dataset and resource detail pages
pub struct ResourceSelectors {
    pub resource_item: &'static Selector,
    pub anchor: &'static Selector,
    pub anchor_with_href: &'static Selector,
    pub label: &'static Selector,
    pub download_button: &'static Selector,
    pub notes: &'static Selector,
    pub api_link: &'static Selector,
    pub paragraph: &'static Selector,
    pub script: &'static Selector,
}

impl ResourceSelectors {
    pub fn new() -> Self {
        Self {
            resource_item: &RESOURCE_ITEM,
            anchor: &ANCHOR,
            anchor_with_href: &ANCHOR_WITH_HREF,
            label: &LABEL,
            download_button: &DOWNLOAD_BUTTON,
            notes: &NOTES,
            api_link: &API_LINK,
            paragraph: &PARAGRAPH,
            script: &SCRIPT,
        }
    }
}

impl Default for ResourceSelectors {
    fn default() -> Self {
        Self::new()
    }
}
