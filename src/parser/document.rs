//! Opaque page handles
//!
//! The rest of the crate never touches `scraper` types directly. A fetched page
//! becomes a [`Document`] and every match becomes an owned [`Element`]
//! snapshot (tag, attributes, text, outer HTML). Both are `Send + Sync`, so
//! pages can travel between worker tasks, which `scraper::Html` cannot.

use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;

/// A parsed HTML page
///
/// Only the source text is stored. Every query parses it again, so a query
/// costs a full parse of the page; catalog and resource pages are small and
/// each is queried a handful of times. Reading several things from one page
/// should go through [`Element`] snapshots of a single `select_all` rather
/// than one query per field.
#[derive(Debug, Clone)]
pub struct Document {
    source: Arc<str>,
}

impl Document {
    /// Wrap raw HTML
    pub fn parse(html: impl Into<String>) -> Self {
        Self {
            source: Arc::from(html.into()),
        }
    }

    /// Raw HTML the document was built from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// All elements matching `selector`, in document order
    pub fn select_all(&self, selector: &Selector) -> Vec<Element> {
        let html = Html::parse_document(&self.source);
        html.select(selector).map(Element::from_ref).collect()
    }

    /// First element matching `selector`
    pub fn select_first(&self, selector: &Selector) -> Option<Element> {
        let html = Html::parse_document(&self.source);
        let first = html.select(selector).next().map(Element::from_ref);
        first
    }

    /// Number of elements matching `selector`
    pub fn count(&self, selector: &Selector) -> usize {
        let html = Html::parse_document(&self.source);
        let count = html.select(selector).count();
        count
    }
}

/// Owned snapshot of one HTML element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    html: String,
}

impl Element {
    fn from_ref(element: ElementRef<'_>) -> Self {
        let value = element.value();
        Self {
            tag: value.name().to_string(),
            attrs: value
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            text: element.text().collect(),
            html: element.html(),
        }
    }

    /// Lower-case tag name
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Attribute value by name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of the element and all its descendants
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Outer HTML of the element
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Whether the element carries `class` among its classes
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Descendants matching `selector`, in document order
    pub fn select_all(&self, selector: &Selector) -> Vec<Element> {
        let fragment = Html::parse_fragment(&self.html);
        let found = fragment
            .select(selector)
            .filter(|e| !self.is_self(e))
            .map(Element::from_ref)
            .collect();
        found
    }

    /// First descendant matching `selector`
    pub fn select_first(&self, selector: &Selector) -> Option<Element> {
        self.select_all(selector).into_iter().next()
    }

    // The re-parsed fragment contains this element itself as the outermost
    // node; queries only ever look at descendants.
    fn is_self(&self, candidate: &ElementRef<'_>) -> bool {
        candidate.value().name() == self.tag
            && candidate
                .parent()
                .and_then(ElementRef::wrap)
                .map(|p| p.value().name() == "html")
                .unwrap_or(false)
    }
}
