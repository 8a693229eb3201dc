//! Storage operations
//!
//! Maps virtual paths (`/docs/a.txt`, relative to the logged-in user's
//! home) onto the real filesystem and performs the file operations behind
//! CWD, MKD, LIST, RETR, STOR and DELE.
//!
//! Virtual paths are normalized lexically, so `..` can never climb above
//! `/`. Each path, or its nearest existing ancestor, is also canonicalized
//! and checked against the home directory, which catches symlinks pointing
//! elsewhere.

use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

use crate::error::StorageError;

/// A virtual path and the real path it maps to.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub virtual_path: String,
    pub real: PathBuf,
}

/// One directory entry as reported by LIST and MLSD.
#[derive(Debug, Clone)]
pub struct DirItem {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: SystemTime,
}

/// Join `arg` onto `cwd` and normalize. Absolute arguments replace `cwd`.
pub fn normalize_virtual(cwd: &str, arg: &str) -> String {
    let arg = arg.replace('\\', "/");
    let combined = if arg.starts_with('/') {
        arg
    } else {
        format!("{}/{}", cwd, arg)
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in combined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

pub fn virtual_to_real(home: &Path, virtual_path: &str) -> PathBuf {
    let relative = virtual_path.trim_start_matches('/');
    if relative.is_empty() {
        home.to_path_buf()
    } else {
        home.join(relative)
    }
}

pub fn resolve(home: &Path, cwd: &str, arg: &str) -> Resolved {
    let virtual_path = normalize_virtual(cwd, arg);
    let real = virtual_to_real(home, &virtual_path);
    Resolved { virtual_path, real }
}

/// Reject paths whose canonical form leaves the home directory. A path that
/// does not exist yet is judged by its nearest existing ancestor.
async fn ensure_inside(home: &Path, resolved: &Resolved) -> Result<(), StorageError> {
    let canonical_home = fs::canonicalize(home).await?;
    let mut candidate = resolved.real.as_path();
    let canonical = loop {
        match fs::canonicalize(candidate).await {
            Ok(canonical) => break canonical,
            Err(e) if e.kind() == io::ErrorKind::NotFound => match candidate.parent() {
                Some(parent) => candidate = parent,
                None => return Err(StorageError::IoError(e)),
            },
            Err(e) => return Err(StorageError::IoError(e)),
        }
    };

    if canonical.starts_with(&canonical_home) {
        Ok(())
    } else {
        Err(StorageError::PathTraversal(resolved.virtual_path.clone()))
    }
}

async fn metadata(resolved: &Resolved) -> Result<std::fs::Metadata, StorageError> {
    fs::metadata(&resolved.real).await.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound(resolved.virtual_path.clone()),
        _ => StorageError::IoError(e),
    })
}

/// Validate a CWD target and return the new virtual working directory.
pub async fn change_directory(home: &Path, cwd: &str, arg: &str) -> Result<String, StorageError> {
    let resolved = resolve(home, cwd, arg);
    ensure_inside(home, &resolved).await?;
    if !metadata(&resolved).await?.is_dir() {
        return Err(StorageError::NotADirectory(resolved.virtual_path));
    }
    debug!("Changed directory to {}", resolved.virtual_path);
    Ok(resolved.virtual_path)
}

/// Create one directory. The parent must exist; an existing entry of the
/// same name is `AlreadyExists`.
pub async fn make_directory(home: &Path, cwd: &str, arg: &str) -> Result<String, StorageError> {
    let resolved = resolve(home, cwd, arg);
    if resolved.virtual_path == "/" {
        return Err(StorageError::AlreadyExists(resolved.virtual_path));
    }
    ensure_inside(home, &resolved).await?;

    match fs::create_dir(&resolved.real).await {
        Ok(()) => {
            info!("Created directory {}", resolved.real.display());
            Ok(resolved.virtual_path)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(StorageError::AlreadyExists(resolved.virtual_path))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(StorageError::NotFound(resolved.virtual_path))
        }
        Err(e) => Err(StorageError::IoError(e)),
    }
}

/// Entries of a directory, sorted by name. A file argument lists just that
/// file. `.` and `..` are never included.
pub async fn list_directory(
    home: &Path,
    cwd: &str,
    arg: Option<&str>,
) -> Result<Vec<DirItem>, StorageError> {
    let resolved = resolve(home, cwd, arg.unwrap_or("."));
    ensure_inside(home, &resolved).await?;
    let meta = metadata(&resolved).await?;

    if !meta.is_dir() {
        let name = resolved
            .real
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(vec![DirItem {
            name,
            is_dir: false,
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }]);
    }

    let mut reader = fs::read_dir(&resolved.real).await?;
    let mut items = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        // Follows symlinks; a dangling link is left out.
        let meta = match fs::metadata(entry.path()).await {
            Ok(meta) => meta,
            Err(e) => {
                debug!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        items.push(DirItem {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    items.sort_by(|a, b| a.name.cmp(&b.name));

    debug!("Listed {} ({} entries)", resolved.virtual_path, items.len());
    Ok(items)
}

/// Resolve a RETR target. It must be an existing regular file.
pub async fn prepare_file_retrieval(
    home: &Path,
    cwd: &str,
    arg: &str,
) -> Result<Resolved, StorageError> {
    let resolved = resolve(home, cwd, arg);
    ensure_inside(home, &resolved).await?;
    if !metadata(&resolved).await?.is_file() {
        return Err(StorageError::NotFound(resolved.virtual_path));
    }
    Ok(resolved)
}

/// Resolve a STOR target and pick the temporary file the upload is written
/// to before being renamed into place. Existing files are overwritten; an
/// existing directory is a conflict.
pub async fn prepare_file_storage(
    home: &Path,
    cwd: &str,
    arg: &str,
) -> Result<(Resolved, PathBuf), StorageError> {
    let resolved = resolve(home, cwd, arg);
    if resolved.virtual_path == "/" {
        return Err(StorageError::AlreadyExists(resolved.virtual_path));
    }
    ensure_inside(home, &resolved).await?;

    match fs::metadata(&resolved.real).await {
        Ok(meta) if meta.is_dir() => {
            return Err(StorageError::AlreadyExists(resolved.virtual_path));
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(StorageError::IoError(e)),
    }

    let parent = resolved.real.parent().map(Path::to_path_buf).unwrap_or_default();
    match fs::metadata(&parent).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(StorageError::NotADirectory(parent_virtual(&resolved))),
        Err(_) => return Err(StorageError::NotFound(parent_virtual(&resolved))),
    }

    let name = resolved
        .real
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = resolved.real.with_file_name(format!(".{}.upload", name));
    Ok((resolved, temp))
}

fn parent_virtual(resolved: &Resolved) -> String {
    normalize_virtual(&resolved.virtual_path, "..")
}

pub async fn delete_file(home: &Path, cwd: &str, arg: &str) -> Result<String, StorageError> {
    let resolved = resolve(home, cwd, arg);
    ensure_inside(home, &resolved).await?;
    if !metadata(&resolved).await?.is_file() {
        return Err(StorageError::NotFound(resolved.virtual_path));
    }
    fs::remove_file(&resolved.real).await?;
    info!("Deleted file {}", resolved.real.display());
    Ok(resolved.virtual_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_virtual() {
        assert_eq!(normalize_virtual("/", "docs"), "/docs");
        assert_eq!(normalize_virtual("/docs", "../a/./b"), "/a/b");
        assert_eq!(normalize_virtual("/docs", "/x"), "/x");
        assert_eq!(normalize_virtual("/", "../../etc/passwd"), "/etc/passwd");
        assert_eq!(normalize_virtual("/a", ".."), "/");
        assert_eq!(normalize_virtual("/", "sub\\dir"), "/sub/dir");
    }

    #[test]
    fn test_virtual_to_real_stays_in_home() {
        let home = Path::new("/srv/ftp/user");
        let resolved = resolve(home, "/", "../../etc");
        assert_eq!(resolved.real, PathBuf::from("/srv/ftp/user/etc"));
        assert_eq!(resolve(home, "/", "/").real, PathBuf::from("/srv/ftp/user"));
    }

    #[tokio::test]
    async fn test_make_directory_conflict() {
        let home = tempdir().unwrap();
        assert_eq!(make_directory(home.path(), "/", "a").await.unwrap(), "/a");
        assert!(matches!(
            make_directory(home.path(), "/", "a").await,
            Err(StorageError::AlreadyExists(_))
        ));
        assert!(matches!(
            make_directory(home.path(), "/", "missing/child").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_change_directory_requires_directory() {
        let home = tempdir().unwrap();
        std::fs::write(home.path().join("f.txt"), b"x").unwrap();
        std::fs::create_dir(home.path().join("d")).unwrap();

        assert_eq!(change_directory(home.path(), "/", "d").await.unwrap(), "/d");
        assert!(matches!(
            change_directory(home.path(), "/", "f.txt").await,
            Err(StorageError::NotADirectory(_))
        ));
        assert!(matches!(
            change_directory(home.path(), "/", "nope").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_directory_sorted_without_dots() {
        let home = tempdir().unwrap();
        std::fs::write(home.path().join("b.txt"), b"12345").unwrap();
        std::fs::create_dir(home.path().join("a")).unwrap();

        let items = list_directory(home.path(), "/", None).await.unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["a", "b.txt"]);
        assert!(items[0].is_dir);
        assert_eq!(items[1].size, 5);
    }

    #[tokio::test]
    async fn test_storage_over_directory_is_conflict() {
        let home = tempdir().unwrap();
        std::fs::create_dir(home.path().join("taken")).unwrap();
        assert!(matches!(
            prepare_file_storage(home.path(), "/", "taken").await,
            Err(StorageError::AlreadyExists(_))
        ));

        let (resolved, temp) = prepare_file_storage(home.path(), "/", "new.bin").await.unwrap();
        assert_eq!(resolved.virtual_path, "/new.bin");
        assert_eq!(temp, home.path().join(".new.bin.upload"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected() {
        let home = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), home.path().join("out")).unwrap();
        assert!(matches!(
            change_directory(home.path(), "/", "out").await,
            Err(StorageError::PathTraversal(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_create_through_symlink_rejected() {
        let home = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), home.path().join("out")).unwrap();

        assert!(matches!(
            make_directory(home.path(), "/", "out/planted").await,
            Err(StorageError::PathTraversal(_))
        ));
        assert!(matches!(
            make_directory(home.path(), "/", "out/a/b").await,
            Err(StorageError::PathTraversal(_))
        ));
        assert!(matches!(
            prepare_file_storage(home.path(), "/", "out/new.bin").await,
            Err(StorageError::PathTraversal(_))
        ));
        assert_eq!(std::fs::read_dir(outside.path()).unwrap().count(), 0);

        // Missing paths under real directories are still fine.
        assert_eq!(make_directory(home.path(), "/", "inside").await.unwrap(), "/inside");
        assert!(prepare_file_storage(home.path(), "/inside", "new.bin").await.is_ok());
    }
}
