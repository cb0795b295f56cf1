//! Session configuration: base URL, depth, extension filter, destination.
//!
//! A [`SessionConfig`] is validated once, before a session starts, and never
//! changes afterwards. Every error in this module is fatal to *starting* a
//! session and is reported before any request is made.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::listing::ExtensionFilter;

/// File types selected when the user does not supply a list.
pub const DEFAULT_FILE_TYPES: &str = ".bsp,.bz2";

/// Prefix of the timestamp-named destination folder.
pub const DESTINATION_PREFIX: &str = "SCRAPE_";

/// Errors raised while building or preparing a session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The base URL could not be parsed.
    #[error("invalid base URL: {url}")]
    InvalidBaseUrl {
        /// The rejected input.
        url: String,
    },

    /// The base URL parsed but is not http(s) or has no host.
    #[error("base URL must be http(s) with a host: {url}")]
    UnsupportedBaseUrl {
        /// The rejected input.
        url: String,
    },

    /// The max depth is not a non-negative integer.
    #[error("invalid max depth '{value}': expected a non-negative integer")]
    InvalidDepth {
        /// The rejected input.
        value: String,
    },

    /// An extension entry does not look like `.ext`.
    #[error("invalid file extension '{extension}': expected a leading dot, e.g. .bsp")]
    InvalidExtension {
        /// The rejected entry.
        extension: String,
    },

    /// The extension list contained no usable entries.
    #[error("no file extensions given")]
    NoExtensions,

    /// The destination root could not be created.
    #[error("could not create destination {path}: {source}")]
    CreateDestination {
        /// The directory that failed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Immutable configuration for one crawl-and-download session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    base_url: Url,
    max_depth: u32,
    extensions: ExtensionFilter,
    destination_root: PathBuf,
}

impl SessionConfig {
    /// Builds a configuration from already-typed values.
    ///
    /// A trailing `/` is added to the base URL so relative links on the root
    /// listing resolve under it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the base URL is unparsable, not http(s), or
    /// has no host.
    pub fn new(
        base_url: &str,
        max_depth: u32,
        extensions: ExtensionFilter,
        destination_root: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let base_url = parse_base_url(base_url)?;
        Ok(Self {
            base_url,
            max_depth,
            extensions,
            destination_root: destination_root.into(),
        })
    }

    /// Builds a configuration from raw text inputs as typed by a user.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an invalid URL, a non-numeric depth, or a
    /// malformed extension list.
    pub fn from_raw(
        base_url: &str,
        max_depth: &str,
        file_types: &str,
        destination_root: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let max_depth = parse_depth(max_depth)?;
        let extensions = ExtensionFilter::parse(file_types)?;
        Self::new(base_url, max_depth, extensions, destination_root)
    }

    /// Root of the listing tree; always ends with `/`.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Maximum recursion depth; the root listing is depth 0.
    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Extensions selected for download.
    #[must_use]
    pub fn extensions(&self) -> &ExtensionFilter {
        &self.extensions
    }

    /// Local directory that mirrors the listing tree.
    #[must_use]
    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }

    /// Creates the destination root. Creating an existing directory is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CreateDestination`] if the directory cannot be
    /// created.
    pub fn prepare_destination(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.destination_root).map_err(|source| {
            ConfigError::CreateDestination {
                path: self.destination_root.clone(),
                source,
            }
        })?;
        debug!(path = %self.destination_root.display(), "destination ready");
        Ok(())
    }
}

/// Parses a base URL, requiring an http(s) scheme and a host.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    let mut url = Url::parse(trimmed).map_err(|_| ConfigError::InvalidBaseUrl {
        url: trimmed.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::UnsupportedBaseUrl {
            url: trimmed.to_string(),
        });
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_fragment(None);
    Ok(url)
}

/// Parses a user-supplied depth string.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDepth`] if the input is not a non-negative
/// integer.
pub fn parse_depth(raw: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidDepth {
            value: raw.to_string(),
        })
}

/// Name of the destination folder for a session started at `now`:
/// `SCRAPE_<DD-MM_HH-MM>`.
#[must_use]
pub fn destination_folder_name(now: DateTime<Local>) -> String {
    format!("{DESTINATION_PREFIX}{}", now.format("%d-%m_%H-%M"))
}

/// Timestamp-named destination folder under `parent` for a session started now.
#[must_use]
pub fn timestamped_destination(parent: &Path) -> PathBuf {
    parent.join(destination_folder_name(Local::now()))
}
