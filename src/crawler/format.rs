//! Resource discovery and format selection
//!
//! A dataset page lists one `li.resource-item` per downloadable artifact. The
//! label span inside each item's link names the format; exactly one resource
//! per dataset is chosen by the fixed preference order of [`ResourceFormat`].

use std::collections::HashMap;

use crate::models::{ResourceDescriptor, ResourceFormat};
use crate::parser::{Document, ResourceSelectors};
use crate::utils::clean_filename;

/// Read the resource list of a dataset detail page
///
/// Items without a link, a label span or an href are skipped, as are items
/// whose label is not a recognized format.
pub fn parse_resources(detail: &Document) -> Vec<ResourceDescriptor> {
    let selectors = ResourceSelectors::new();

    detail
        .select_all(selectors.resource_item)
        .iter()
        .filter_map(|item| {
            let link = item.select_first(selectors.anchor)?;
            let label = link.select_first(selectors.label)?;
            let href = link.attr("href")?;

            let Some(format) = ResourceFormat::from_label(label.text()) else {
                tracing::debug!(label = %label.text().trim(), "Ignoring unrecognized resource format");
                return None;
            };

            Some(ResourceDescriptor {
                format,
                name: clean_filename(link.text()),
                href: href.to_string(),
            })
        })
        .collect()
}

/// Pick the most preferred resource
///
/// Keeps the first-seen resource of every format, then returns the one with
/// the lowest priority rank. Returns `None` for an empty list.
pub fn select_best(resources: &[ResourceDescriptor]) -> Option<&ResourceDescriptor> {
    let mut best_per_format: HashMap<ResourceFormat, &ResourceDescriptor> = HashMap::new();

    for resource in resources {
        best_per_format.entry(resource.format).or_insert(resource);
    }

    best_per_format
        .into_values()
        .min_by_key(|r| r.priority_rank())
}
