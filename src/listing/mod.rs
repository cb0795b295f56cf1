//! Directory-listing parser.
//!
//! Turns the HTML of an autoindex-style page (Apache, nginx, lighttpd, ...)
//! into an ordered list of [`DirectoryEntry`] values: sub-directory links and
//! file links whose extension passes the [`ExtensionFilter`].
//!
//! Parsing never fails. Malformed markup yields whatever anchors the HTML5
//! parser recovers, which may be none.

mod filter;

use std::collections::HashSet;

use scraper::{Html, Selector};
use tracing::trace;
use url::Url;

pub use filter::ExtensionFilter;

/// One child link of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Absolute URL of the child, without fragment.
    pub url: Url,
    /// True when the link target ends in `/`.
    pub is_directory: bool,
}

impl DirectoryEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(url: Url, is_directory: bool) -> Self {
        Self { url, is_directory }
    }
}

/// Parses one listing page into its child entries, in document order.
///
/// Skipped anchors:
/// - parent and current directory markers (`../`, `./`, `..`, `.`)
/// - empty, fragment-only (`#top`) and query-only (`?C=M;O=D`) targets
/// - targets that resolve to anything other than `http`/`https`
/// - file targets whose extension is not in `filter`
///
/// Repeated anchors to the same target yield a single entry.
#[must_use]
pub fn parse_listing(html: &str, page_url: &Url, filter: &ExtensionFilter) -> Vec<DirectoryEntry> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(entry) = classify_href(href, page_url, filter) else {
            continue;
        };
        if seen.insert(entry.url.as_str().to_string()) {
            entries.push(entry);
        }
    }

    trace!(page = %page_url, entries = entries.len(), "listing parsed");
    entries
}

fn classify_href(href: &str, page_url: &Url, filter: &ExtensionFilter) -> Option<DirectoryEntry> {
    let href = href.trim();
    if is_navigation_marker(href) {
        return None;
    }

    let mut url = page_url.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);

    if url.path().ends_with('/') {
        return Some(DirectoryEntry::new(url, true));
    }
    if filter.matches(url.path()) {
        return Some(DirectoryEntry::new(url, false));
    }
    None
}

fn is_navigation_marker(href: &str) -> bool {
    href.is_empty()
        || href.starts_with('#')
        || href.starts_with('?')
        || matches!(href, "../" | "./" | ".." | ".")
}
