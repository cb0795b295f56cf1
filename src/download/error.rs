//! Error types for the download module.
//!
//! These cover every fetch the crate performs: listing pages, size probes
//! and file transfers. None of them is fatal to a session; callers turn them
//! into data (an abandoned subtree, a zero-byte probe, a failed transfer).

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching listings or files.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-2xx HTTP response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while writing a transfer to disk.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The relative path of a file cannot be mapped under the destination root.
    #[error("unsafe local path for {url}: {relative_path}")]
    UnsafePath {
        /// The source URL of the file.
        url: String,
        /// The offending relative path.
        relative_path: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an unsafe-path error.
    pub fn unsafe_path(url: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self::UnsafePath {
            url: url.into(),
            relative_path: relative_path.into(),
        }
    }

    /// Maps a reqwest error to `Timeout` or `Network`.
    pub(crate) fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("http://x/root/a.bsp");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("http://x/root/a.bsp"));
    }

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("http://x/root/", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "Expected '503' in: {msg}");
        assert!(msg.contains("http://x/root/"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/maps/a.bsp"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/maps/a.bsp"), "Expected path in: {msg}");
    }

    #[test]
    fn test_download_error_unsafe_path_display() {
        let error = DownloadError::unsafe_path("http://x/root/%2E%2E/a.bsp", "../a.bsp");
        let msg = error.to_string();
        assert!(msg.contains("unsafe local path"), "Expected prefix in: {msg}");
        assert!(msg.contains("../a.bsp"), "Expected relative path in: {msg}");
    }
}
