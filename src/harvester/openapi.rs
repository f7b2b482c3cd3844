//! Swagger document inspection
//!
//! Selects the endpoints the harvester can page through without
//! authentication or path parameters.

use serde_json::Value;

use crate::models::EndpointDescriptor;

/// Tag used when an operation declares none
pub const UNKNOWN_TAG: &str = "Unknown";

/// Keep GET operations that are unauthenticated, untemplated and paginated
///
/// An operation qualifies when its path has no `{param}` segment, it carries
/// no `security` key and it declares both a `limit` and an `offset`
/// parameter. Every endpoint uses `page_limit`, whatever maximum the
/// document declares.
pub fn extract_endpoints(spec: &Value, page_limit: usize) -> Vec<EndpointDescriptor> {
    let Some(paths) = spec.get("paths").and_then(Value::as_object) else {
        tracing::warn!("API document has no paths");
        return Vec::new();
    };

    paths
        .iter()
        .filter(|(path, _)| !path.contains('{'))
        .filter_map(|(path, methods)| {
            let get = methods.get("get")?.as_object()?;
            if get.contains_key("security") {
                return None;
            }

            let parameters = get
                .get("parameters")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let declares = |name: &str| {
                parameters
                    .iter()
                    .any(|p| p.get("name").and_then(Value::as_str) == Some(name))
            };
            if !(declares("limit") && declares("offset")) {
                return None;
            }

            let summary = get
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let tag = get
                .get("tags")
                .and_then(Value::as_array)
                .and_then(|tags| tags.first())
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_TAG)
                .to_string();

            Some(EndpointDescriptor {
                path: path.clone(),
                summary,
                tag,
                page_limit,
            })
        })
        .collect()
}

/// `title` and `version` from the document's `info` block
pub fn spec_info(spec: &Value) -> (&str, &str) {
    let info = spec.get("info");
    let field = |key: &str| {
        info.and_then(|i| i.get(key))
            .and_then(Value::as_str)
            .unwrap_or("?")
    };
    (field("title"), field("version"))
}
