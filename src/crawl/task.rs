use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::download::local_path;

/// One file discovered by a crawl, identified by its source URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileTask {
    source_url: Url,
    relative_path: String,
}

impl FileTask {
    /// Creates a task for `source_url` under `base_url`.
    ///
    /// Returns `None` when the source is not inside the base URL (different
    /// origin or path outside the base directory) or names the base itself.
    /// The query string is not part of the relative path.
    #[must_use]
    pub fn new(source_url: Url, base_url: &Url) -> Option<Self> {
        let relative_path = relative_to(&source_url, base_url)?;
        if relative_path.is_empty() {
            return None;
        }
        Some(Self {
            source_url,
            relative_path,
        })
    }

    /// URL the file is fetched from.
    #[must_use]
    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    /// Percent-encoded path of the file relative to the base URL.
    #[must_use]
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Local file path under `root`, or `None` if the relative path would
    /// escape it.
    #[must_use]
    pub fn destination(&self, root: &Path) -> Option<PathBuf> {
        local_path(root, &self.relative_path)
    }
}

impl fmt::Display for FileTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_url.as_str())
    }
}

/// Path of `url` relative to the directory URL `base`, if `url` lies under it.
pub(crate) fn relative_to(url: &Url, base: &Url) -> Option<String> {
    if url.origin() != base.origin() {
        return None;
    }
    url.path()
        .strip_prefix(base.path())
        .map(ToString::to_string)
}
