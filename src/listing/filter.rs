//! File-extension filter applied to listing file links.

use std::collections::BTreeSet;
use std::fmt;

use crate::config::ConfigError;

/// Set of lower-cased extensions (each with its leading dot) selected for
/// download.
///
/// Matching is case-insensitive and looks at the *final* extension only, so a
/// `.bsp` filter accepts `MAP.BSP` but not `map.bsp.tmp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: BTreeSet<String>,
}

impl ExtensionFilter {
    /// Parses a comma-separated list such as `.bsp, .BZ2`.
    ///
    /// Blank entries are ignored. Every remaining entry must start with a dot
    /// and contain at least one further character that is not a dot or a path
    /// separator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidExtension`] for a malformed entry and
    /// [`ConfigError::NoExtensions`] when nothing usable is left.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let mut extensions = BTreeSet::new();
        for raw in list.split(',') {
            let entry = raw.trim();
            if entry.is_empty() {
                continue;
            }
            let Some(stem) = entry.strip_prefix('.') else {
                return Err(ConfigError::InvalidExtension {
                    extension: entry.to_string(),
                });
            };
            if stem.is_empty() || stem.contains(['.', '/', '\\']) || stem.contains(char::is_whitespace)
            {
                return Err(ConfigError::InvalidExtension {
                    extension: entry.to_string(),
                });
            }
            extensions.insert(entry.to_lowercase());
        }

        if extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        Ok(Self { extensions })
    }

    /// Returns true when the last path segment of `target` carries one of the
    /// configured extensions.
    ///
    /// `target` may be a bare file name, a path, or a full URL; any query
    /// string or fragment is ignored.
    #[must_use]
    pub fn matches(&self, target: &str) -> bool {
        final_extension(target).is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Iterates over the configured extensions in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }
}

impl fmt::Display for ExtensionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

/// Lower-cased final extension of the last path segment, with its dot.
///
/// Leading dots of the name do not start an extension, so `.bsp` alone has
/// none.
fn final_extension(target: &str) -> Option<String> {
    let without_fragment = target.split('#').next().unwrap_or_default();
    let path = without_fragment.split('?').next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();
    let name = urlencoding::decode(segment).map_or_else(|_| segment.to_string(), |s| s.into_owned());

    let stem_start = name.find(|c| c != '.')?;
    let dot = name.rfind('.')?;
    if dot <= stem_start || dot + 1 == name.len() {
        return None;
    }
    Some(name[dot..].to_lowercase())
}
