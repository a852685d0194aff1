//! Remote path utilities
//!
//! Remote SFTP paths always use `/` as separator (per SFTP protocol), even when
//! the server runs on Windows.

/// Join remote SFTP path components using `/` separator.
pub fn join_remote_path(base: &str, component: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// Normalize a remote path into absolute POSIX form.
///
/// - forces a leading `/`
/// - collapses repeated separators and `.` segments
/// - resolves `..` lexically, never above `/`
/// - drops any trailing separator (except for the root itself)
pub fn normalize_remote_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Parent of a normalized remote path (`/` is its own parent)
pub fn parent_remote_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// True when `candidate` equals `base` or lies underneath it.
/// Both paths must already be normalized.
pub fn is_same_or_nested(base: &str, candidate: &str) -> bool {
    if base == "/" {
        return true;
    }
    candidate == base
        || (candidate.starts_with(base) && candidate.as_bytes().get(base.len()) == Some(&b'/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_remote_path() {
        assert_eq!(join_remote_path("/home", "file.txt"), "/home/file.txt");
        assert_eq!(join_remote_path("/home/", "file.txt"), "/home/file.txt");
        assert_eq!(join_remote_path("/", "home"), "/home");
    }

    #[test]
    fn test_normalize_remote_path() {
        assert_eq!(normalize_remote_path(""), "/");
        assert_eq!(normalize_remote_path("/"), "/");
        assert_eq!(normalize_remote_path("docs"), "/docs");
        assert_eq!(normalize_remote_path("//docs///2024/"), "/docs/2024");
        assert_eq!(normalize_remote_path("/docs/./a/../b"), "/docs/b");
        assert_eq!(normalize_remote_path("/../../etc"), "/etc");
    }

    #[test]
    fn test_parent_remote_path() {
        assert_eq!(parent_remote_path("/a/b/c"), "/a/b");
        assert_eq!(parent_remote_path("/a"), "/");
        assert_eq!(parent_remote_path("/"), "/");
    }

    #[test]
    fn test_is_same_or_nested() {
        assert!(is_same_or_nested("/a", "/a"));
        assert!(is_same_or_nested("/a", "/a/b"));
        assert!(!is_same_or_nested("/a", "/ab"));
        assert!(!is_same_or_nested("/a/b", "/a"));
        assert!(is_same_or_nested("/", "/anything"));
    }
}
