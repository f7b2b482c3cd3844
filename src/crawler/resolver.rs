//! Resource link resolution
//!
//! A resource descriptor only points at the resource detail page. The actual
//! file link sits behind the page's download button, in the free-text notes
//! for multi-file CSV resources, or, for API resources, behind credentials
//! or an embedded script configuration.

use std::sync::Arc;

use crate::crawler::fetcher::PageFetcher;
use crate::models::{BasicAuth, ResourceDescriptor, ResourceFormat};
use crate::parser::script::find_embedded_url;
use crate::parser::{Document, ResourceSelectors};
use crate::utils::absolute_url;
use crate::utils::error::{ParseError, ResolveError};

const USER_MARKER: &str = "Usuário:";
const PASSWORD_MARKER: &str = "Senha:";

/// An anchor found in a resource's notes block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedLink {
    pub text: String,
    pub href: String,
}

/// Where a resource's file(s) can be fetched from
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Single download button
    Direct { page: Document, link: String },
    /// CSV resource listing individually named files in its notes
    Listed { page: Document, links: Vec<ListedLink> },
}

impl Resolution {
    /// The resource detail page the resolution was read from
    pub fn page(&self) -> &Document {
        match self {
            Self::Direct { page, .. } | Self::Listed { page, .. } => page,
        }
    }
}

/// Outcome of resolving an API resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiTarget {
    /// Served by the open-data REST API, covered by the harvester
    Delegated { link: String },
    /// Download with HTTP Basic credentials published on the page
    Authenticated { url: String, auth: BasicAuth },
    /// URL read from the target page's `user_config` script
    Embedded { url: String },
}

/// Resolves resource descriptors into downloadable links
pub struct ResourceResolver {
    fetcher: Arc<PageFetcher>,
    selectors: ResourceSelectors,
    site_origin: String,
    api_origin: String,
}

impl ResourceResolver {
    #[must_use]
    pub fn new(fetcher: Arc<PageFetcher>, site_origin: &str, api_origin: &str) -> Self {
        Self {
            fetcher,
            selectors: ResourceSelectors::new(),
            site_origin: site_origin.to_string(),
            api_origin: api_origin.to_string(),
        }
    }

    /// Fetch the resource detail page and locate its download link(s)
    ///
    /// Returns `None`, after logging, when the page cannot be fetched or holds
    /// neither a download button nor (for CSV) a notes block.
    pub async fn resolve(&self, resource: &ResourceDescriptor) -> Option<Resolution> {
        match self.try_resolve(resource).await {
            Ok(resolution) => Some(resolution),
            Err(e) => {
                tracing::warn!(
                    resource = %resource.name,
                    format = %resource.format,
                    error = %e,
                    "Download link not found"
                );
                None
            }
        }
    }

    /// [`resolve`](Self::resolve) keeping the reason of a failure
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Fetch` when the resource link is invalid or the
    /// page cannot be fetched, and `ResolveError::Parse` when the page holds
    /// no usable link
    pub async fn try_resolve(
        &self,
        resource: &ResourceDescriptor,
    ) -> Result<Resolution, ResolveError> {
        let url = absolute_url(&self.site_origin, &resource.href)?;
        let page = self.fetcher.fetch(&url).await?;
        Ok(self.read_resolution(page, resource.format)?)
    }

    /// Locate the download link(s) on an already fetched resource page
    ///
    /// # Errors
    ///
    /// Returns `ParseError::MissingElement` when the page has no usable
    /// download button (and, for CSV, no notes block either)
    pub fn read_resolution(
        &self,
        page: Document,
        format: ResourceFormat,
    ) -> Result<Resolution, ParseError> {
        if let Some(button) = page.select_first(self.selectors.download_button) {
            let href = button
                .select_first(self.selectors.anchor_with_href)
                .and_then(|a| a.attr("href").map(str::to_string))
                .ok_or(ParseError::MissingAttribute {
                    element: "div.btn-group a",
                    attribute: "href",
                })?;

            let link = absolute_url(&self.site_origin, &href)
                .map_err(|_| ParseError::MissingElement("div.btn-group a[href]"))?;
            return Ok(Resolution::Direct { page, link });
        }

        if format != ResourceFormat::Csv {
            return Err(ParseError::MissingElement("div.btn-group"));
        }

        let notes = page
            .select_first(self.selectors.notes)
            .ok_or(ParseError::MissingElement("div.prose.notes"))?;

        let links = notes
            .select_all(self.selectors.anchor_with_href)
            .iter()
            .filter_map(|a| {
                let href = absolute_url(&self.site_origin, a.attr("href")?).ok()?;
                Some(ListedLink {
                    text: a.text().trim().to_string(),
                    href,
                })
            })
            .collect();

        Ok(Resolution::Listed { page, links })
    }

    /// Decide how an API resource is fetched
    ///
    /// `page` is the resource detail page and `link` the download button's
    /// target. Published credentials take precedence; the target page's
    /// embedded script is only consulted when they are absent.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Fetch` when the link target cannot be fetched
    /// and `ResolveError::CredentialExtraction` when neither credentials nor
    /// an embedded URL are found
    pub async fn resolve_api(&self, page: &Document, link: &str) -> Result<ApiTarget, ResolveError> {
        if let Some(api_link) = page
            .select_first(self.selectors.api_link)
            .and_then(|a| a.attr("href").map(str::to_string))
        {
            if api_link.contains(&self.api_origin) {
                tracing::info!(link = %api_link, "API resource served by the open-data API, left to the harvester");
                return Ok(ApiTarget::Delegated { link: api_link });
            }
        }

        if let Some(auth) = extract_credentials(page, &self.selectors) {
            tracing::debug!(url = link, username = %auth.username, "Using published API credentials");
            return Ok(ApiTarget::Authenticated {
                url: link.to_string(),
                auth,
            });
        }

        let target = self.fetcher.fetch(link).await?;
        let scripts: Vec<String> = target
            .select_all(self.selectors.script)
            .iter()
            .map(|s| s.text().to_string())
            .collect();

        let path = find_embedded_url(scripts.iter().map(String::as_str)).ok_or_else(|| {
            ResolveError::CredentialExtraction(format!("no credentials or user_config url at {link}"))
        })?;

        let url = format!("{}{}", self.api_origin.trim_end_matches('/'), path);
        tracing::debug!(url = %url, "Resolved API URL from embedded script");
        Ok(ApiTarget::Embedded { url })
    }
}

/// Read `Usuário:`/`Senha:` paragraphs
///
/// Returns `None` unless both values are present and non-empty.
pub fn extract_credentials(page: &Document, selectors: &ResourceSelectors) -> Option<BasicAuth> {
    let mut username = None;
    let mut password = None;

    for paragraph in page.select_all(selectors.paragraph) {
        let text = paragraph.text();
        if let Some((_, rest)) = text.split_once(USER_MARKER) {
            username = Some(rest.trim().to_string());
        } else if let Some((_, rest)) = text.split_once(PASSWORD_MARKER) {
            password = Some(rest.trim().to_string());
        }
    }

    match (username, password) {
        (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
            Some(BasicAuth { username, password })
        }
        _ => None,
    }
}
