use std::path::Path;

/// Canonical string key for a path: forward slashes, no trailing separator.
pub fn normalize(path: &Path) -> String {
    let mut normalized = path.to_string_lossy().replace('\\', "/");
    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }
    normalized
}

/// True when `path` equals `root` or lies underneath it. Matching is per
/// component, so `/a/bc` is not within `/a/b`.
pub fn is_within_scope(path: &str, root: &str) -> bool {
    if path == root {
        return true;
    }

    if root == "/" {
        return path.starts_with('/');
    }

    if cfg!(windows) {
        let path_lower = path.to_ascii_lowercase();
        let root_lower = root.to_ascii_lowercase();
        return path_lower == root_lower || path_lower.starts_with(&(root_lower + "/"));
    }

    path.starts_with(&format!("{root}/"))
}

/// Number of components, used to order folders deepest first.
pub fn depth(path: &Path) -> usize {
    path.components().count()
}
