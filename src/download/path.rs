//! Mapping of remote relative paths onto the local destination tree.

use std::path::{Component, Path, PathBuf};

/// Maps a `/`-separated, percent-encoded relative path under `root`.
///
/// Each segment is percent-decoded and sanitized. Returns `None` when any
/// segment is empty, `.` or `..` after decoding, so the result can never
/// escape `root`.
#[must_use]
pub fn local_path(root: &Path, relative_path: &str) -> Option<PathBuf> {
    if relative_path.is_empty() {
        return None;
    }

    let mut path = root.to_path_buf();
    for raw in relative_path.split('/') {
        let decoded = urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |s| s.into_owned());
        if decoded.is_empty() || decoded == "." || decoded == ".." {
            return None;
        }
        let segment = sanitize_segment(&decoded);
        if !is_safe_segment(&segment) {
            return None;
        }
        path.push(segment);
    }
    Some(path)
}

/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > | and control characters.
pub(crate) fn sanitize_segment(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn is_safe_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
