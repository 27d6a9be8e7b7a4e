//! Relative folder path helpers
//!
//! Folder keys are `/`-separated strings rooted at the scan root: the root is
//! `"/"`, a child folder is `"/sub"`, never with a trailing slash.

use std::path::{Component, Path, PathBuf};

/// The relative path of the scan root
pub const ROOT: &str = "/";

/// Strip a single trailing `/` (the root stays `"/"`); empty means the root
pub fn normalize_relative(path: &str) -> String {
    if path.is_empty() {
        return ROOT.to_string();
    }
    match path.strip_suffix('/') {
        Some(stripped) if path.len() > 1 => stripped.to_string(),
        _ => path.to_string(),
    }
}

/// Nesting level of a relative folder: `"/"` is 0, `"/a"` is 1, `"/a/b"` is 2
pub fn depth(relative: &str) -> usize {
    if relative == ROOT || relative.is_empty() {
        0
    } else {
        relative.matches('/').count()
    }
}

/// Replace runs of `/` with a single `/`
pub fn collapse_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !previous_slash {
                out.push(c);
            }
            previous_slash = true;
        } else {
            out.push(c);
            previous_slash = false;
        }
    }
    out
}

/// Join `/`-separated path parts, collapsing doubled separators
///
/// The result has no trailing slash unless it is `"/"` itself.
pub fn join(parts: &[&str]) -> String {
    let joined = collapse_separators(&parts.join("/"));
    match joined.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => joined,
    }
}

/// Child folder key under `parent`
pub fn child(parent: &str, name: &str) -> String {
    join(&[parent, name])
}

/// Strip a single leading separator, leaving the root as `"/"`
pub fn strip_leading_separator(folder: &str) -> &str {
    if folder.len() > 1 {
        folder.strip_prefix('/').unwrap_or(folder)
    } else {
        folder
    }
}

/// Resolve a relative folder key (with or without leading `/`) under a local root
pub fn local_folder(root: &Path, folder: &str) -> PathBuf {
    folder
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// Relative folder key of `folder` below `root`, or `None` if it is outside the root
pub fn relative_key(root: &Path, folder: &Path) -> Option<String> {
    let rest = folder.strip_prefix(root).ok()?;
    let mut key = String::from(ROOT);
    for component in rest.components() {
        match component {
            Component::Normal(segment) => {
                if key.len() > 1 {
                    key.push('/');
                }
                key.push_str(&segment.to_string_lossy());
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(key)
}
