use std::path::{Component, Path, PathBuf};

use crate::error::{BookmarkError, Result};

/// Maximum allowed path length for security
const MAX_PATH_LENGTH: usize = 4096;

/// Whether the host filesystem compares names case-insensitively.
pub const CASE_INSENSITIVE_FS: bool = cfg!(any(windows, target_os = "macos"));

/// Validate that a path is usable as a bookmark target
pub fn validate_path(path: &Path) -> Result<()> {
    let path_str = path.to_string_lossy();

    if path_str.len() > MAX_PATH_LENGTH {
        return Err(BookmarkError::Validation(format!(
            "path too long (max {MAX_PATH_LENGTH} bytes)"
        )));
    }

    if path_str.bytes().any(|b| b == 0) {
        return Err(BookmarkError::Validation("path contains null bytes".to_string()));
    }

    if path_str.is_empty() {
        return Err(BookmarkError::Validation("path is empty".to_string()));
    }

    Ok(())
}

/// Lexically normalize a path: drops `.` segments, folds `..` into the
/// preceding segment and removes trailing separators. Symlinks are not
/// resolved and the path does not need to exist.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Identity key for a path. Two paths with the same key refer to the same
/// filesystem entry on this platform.
pub fn path_key(path: &Path) -> PathBuf {
    let normalized = normalize_path(path);
    if CASE_INSENSITIVE_FS {
        PathBuf::from(normalized.to_string_lossy().to_lowercase())
    } else {
        normalized
    }
}

/// Comparison key for a bare name (bookmark names map to descriptor files,
/// so they follow the filesystem's case rules too).
pub fn name_key(name: &str) -> String {
    if CASE_INSENSITIVE_FS {
        name.to_lowercase()
    } else {
        name.to_string()
    }
}

pub fn paths_equal(a: &Path, b: &Path) -> bool {
    path_key(a) == path_key(b)
}

/// True when `child` lies strictly below `parent`.
pub fn is_sub_path(parent: &Path, child: &Path) -> bool {
    let parent_key = path_key(parent);
    let child_key = path_key(child);
    child_key != parent_key && child_key.starts_with(&parent_key)
}

/// Final segment of a path as an owned string, empty for roots.
pub fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Split a name into stem and extension (extension keeps its leading dot).
/// Directories and dot-files have no extension.
pub fn split_name(name: &str, is_file: bool) -> (&str, &str) {
    if !is_file {
        return (name, "");
    }
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Extension of the last path segment including the dot, or empty.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Probe `base`, `base_1`, `base_2`, ... until `is_taken` says no.
pub fn unique_name(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(base) {
        return base.to_string();
    }
    let mut counter = 1usize;
    loop {
        let candidate = format!("{base}_{counter}");
        if !is_taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// `candidate` with `_counter` appended to its name; counter 0 is the
/// candidate itself. For files the suffix goes before the extension.
pub fn suffixed_path(candidate: &Path, is_file: bool, counter: usize) -> PathBuf {
    if counter == 0 {
        return candidate.to_path_buf();
    }
    let parent = candidate.parent().map(Path::to_path_buf).unwrap_or_default();
    let name = file_name_string(candidate);
    let (stem, ext) = split_name(&name, is_file);
    parent.join(format!("{stem}_{counter}{ext}"))
}

/// Return a path in the same directory as `candidate` that nothing occupies
/// on disk and `reserved` does not claim (`b.txt`, `b_1.txt`, `b_2.txt`, ...).
pub async fn unique_fs_path(
    candidate: &Path,
    is_file: bool,
    reserved: impl Fn(&Path) -> bool,
) -> PathBuf {
    let mut counter = 0usize;
    loop {
        let next = suffixed_path(candidate, is_file, counter);
        if !reserved(&next) && !occupied(&next).await {
            return next;
        }
        counter += 1;
    }
}

/// Whether `path` resolves to an existing file or directory. A dangling
/// symlink does not exist.
pub async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

/// Whether any directory entry sits at `path`, dangling symlinks included.
/// Used before creating or replacing entries.
pub async fn occupied(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

/// [`validate_path`] plus the requirement that bookmarked originals are
/// absolute.
pub fn validate_original_path(path: &Path) -> Result<()> {
    validate_path(path)?;
    if !path.is_absolute() {
        return Err(BookmarkError::Validation(format!(
            "path must be absolute: {}",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_path_rejects_null_bytes() {
        assert!(validate_path(Path::new("test\0file")).is_err());
        assert!(validate_path(Path::new("")).is_err());
    }

    #[test]
    fn test_validate_path_accepts_valid() {
        assert!(validate_path(Path::new("/tmp/test")).is_ok());
        assert!(validate_path(Path::new("C:\\Users\\test")).is_ok());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/ws/./a/../b/")), PathBuf::from("/ws/b"));
        assert_eq!(normalize_path(Path::new("/ws/a")), PathBuf::from("/ws/a"));
    }

    #[test]
    fn test_is_sub_path() {
        assert!(is_sub_path(Path::new("/ws/a"), Path::new("/ws/a/child")));
        assert!(is_sub_path(Path::new("/ws/a"), Path::new("/ws/a/x/../child")));
        assert!(!is_sub_path(Path::new("/ws/a"), Path::new("/ws/a")));
        assert!(!is_sub_path(Path::new("/ws/a"), Path::new("/ws/ab")));
        assert!(!is_sub_path(Path::new("/ws/a/child"), Path::new("/ws/a")));
    }

    #[test]
    fn test_paths_equal_follows_platform_case_rules() {
        assert!(paths_equal(Path::new("/ws/a.txt"), Path::new("/ws/./a.txt")));
        assert_eq!(
            paths_equal(Path::new("/ws/A.txt"), Path::new("/ws/a.txt")),
            CASE_INSENSITIVE_FS
        );
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("b.txt", true), ("b", ".txt"));
        assert_eq!(split_name("archive.tar.gz", true), ("archive.tar", ".gz"));
        assert_eq!(split_name(".gitignore", true), (".gitignore", ""));
        assert_eq!(split_name("dir.d", false), ("dir.d", ""));
    }

    #[test]
    fn test_unique_name() {
        let taken = ["config", "config_1"];
        assert_eq!(unique_name("config", |n| taken.contains(&n)), "config_2");
        assert_eq!(unique_name("other", |n| taken.contains(&n)), "other");
    }

    #[tokio::test]
    async fn test_unique_fs_path_suffixes_before_extension() {
        let temp = TempDir::new().unwrap();
        let candidate = temp.path().join("b.txt");
        assert_eq!(unique_fs_path(&candidate, true, |_| false).await, candidate);

        std::fs::write(&candidate, "x").unwrap();
        assert_eq!(unique_fs_path(&candidate, true, |_| false).await, temp.path().join("b_1.txt"));

        std::fs::write(temp.path().join("b_1.txt"), "x").unwrap();
        assert_eq!(unique_fs_path(&candidate, true, |_| false).await, temp.path().join("b_2.txt"));

        let reserved = temp.path().join("b_2.txt");
        assert_eq!(
            unique_fs_path(&candidate, true, |p| p == reserved).await,
            temp.path().join("b_3.txt")
        );
    }

    #[test]
    fn test_validate_original_path_requires_absolute() {
        assert!(validate_original_path(Path::new("rel.txt")).is_err());
        assert!(validate_original_path(Path::new("./a/b.txt")).is_err());
        let absolute = std::env::temp_dir().join("a.txt");
        assert!(validate_original_path(&absolute).is_ok());
    }

    #[test]
    fn test_suffixed_path() {
        let base = Path::new("/ws/b.txt");
        assert_eq!(suffixed_path(base, true, 0), PathBuf::from("/ws/b.txt"));
        assert_eq!(suffixed_path(base, true, 3), PathBuf::from("/ws/b_3.txt"));
        assert_eq!(suffixed_path(base, false, 1), PathBuf::from("/ws/b.txt_1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_is_occupied_but_missing() {
        let temp = TempDir::new().unwrap();
        let link = temp.path().join("link.txt");
        std::os::unix::fs::symlink(temp.path().join("nowhere.txt"), &link).unwrap();

        assert!(!exists(&link).await);
        assert!(occupied(&link).await);
        assert_eq!(unique_fs_path(&link, true, |_| false).await, temp.path().join("link_1.txt"));
    }

    #[tokio::test]
    async fn test_unique_fs_path_for_directories() {
        let temp = TempDir::new().unwrap();
        let candidate = temp.path().join("v1.0");
        std::fs::create_dir(&candidate).unwrap();
        assert_eq!(unique_fs_path(&candidate, false, |_| false).await, temp.path().join("v1.0_1"));
    }
}
