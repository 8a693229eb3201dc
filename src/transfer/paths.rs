//! Remote path helpers. Remote paths always use `/`, whatever the local
//! platform does.

/// Replace backslashes with `/` and collapse repeated separators. A trailing
/// separator is dropped except for the root itself.
pub fn normalize_remote(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let absolute = replaced.starts_with('/');
    let parts: Vec<&str> = replaced.split('/').filter(|p| !p.is_empty()).collect();

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => String::new(),
        (false, false) => joined,
    }
}

/// Append one entry name to a remote directory path. Only `dir` is
/// normalized; `name` is taken verbatim and must already be a single
/// component.
pub fn join_remote(dir: &str, name: &str) -> String {
    let dir = normalize_remote(dir);
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_remote() {
        assert_eq!(normalize_remote("a\\b\\c"), "a/b/c");
        assert_eq!(normalize_remote("/a//b/"), "/a/b");
        assert_eq!(normalize_remote("/"), "/");
        assert_eq!(normalize_remote(""), "");
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/", "docs"), "/docs");
        assert_eq!(join_remote("upload", "my file.txt"), "upload/my file.txt");
        assert_eq!(join_remote("up\\load\\", "a"), "up/load/a");
        assert_eq!(join_remote("", "a"), "a");
    }

    #[test]
    fn test_join_remote_keeps_name_verbatim() {
        assert_eq!(join_remote("up\\load", "..\\evil.txt"), "up/load/..\\evil.txt");
    }
}
