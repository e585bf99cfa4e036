//! Copy / paste / create / delete against real paths.
//!
//! These never touch descriptor files; bookmark state changes go through
//! [`crate::sync_engine::SyncEngine`].

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use walkdir::WalkDir;

use crate::config::BookmarkConfig;
use crate::error::{BookmarkError, Result};
use crate::host::Notifier;
use crate::input_validation::validate_file_name;
use crate::logging::LogManager;
use crate::path_validation::{exists, file_name_string, is_sub_path, occupied, paths_equal};

type CopyFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OperationError {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of a batch operation. Individual failures never abort the batch.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct OperationResult {
    pub succeeded: usize,
    pub skipped: usize,
    pub errors: Vec<OperationError>,
}

impl OperationResult {
    fn fail(&mut self, path: &Path, message: impl Into<String>) {
        self.errors.push(OperationError {
            path: path.to_path_buf(),
            message: message.into(),
        });
    }
}

pub struct OperationService {
    log: Arc<LogManager>,
    notifier: Arc<dyn Notifier>,
    copy_limit: Arc<Semaphore>,
    preserve_times: bool,
}

impl OperationService {
    pub fn new(config: &BookmarkConfig, log: Arc<LogManager>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            log,
            notifier,
            copy_limit: Arc::new(Semaphore::new(config.copy_concurrency.max(1))),
            preserve_times: config.preserve_times,
        }
    }

    /// Recursively copy `source` to `target`.
    ///
    /// Refuses to copy onto itself or into its own subtree. Entries of a
    /// directory are copied in parallel; at most `copyConcurrency` files are
    /// being read or written at any time.
    pub async fn copy_file_or_folder(&self, source: &Path, target: &Path) -> Result<()> {
        if paths_equal(source, target) || is_sub_path(source, target) {
            let message = format!(
                "cannot copy {} into itself ({})",
                source.display(),
                target.display()
            );
            self.log.error(&message, Some(source));
            return Err(BookmarkError::UnsafeOperation(message));
        }

        if !exists(source).await {
            return Err(BookmarkError::NotFound(source.to_path_buf()));
        }

        copy_entry(
            source.to_path_buf(),
            target.to_path_buf(),
            self.copy_limit.clone(),
            self.preserve_times,
        )
        .await
    }

    /// Paste copied items into `target_dir`, replacing same-named entries.
    pub async fn paste_items(&self, copied: &[PathBuf], target_dir: &Path) -> OperationResult {
        let mut result = OperationResult::default();

        for item in copied {
            let name = file_name_string(item);
            if name.is_empty() {
                result.fail(item, "item has no file name");
                continue;
            }
            let destination = target_dir.join(&name);

            if paths_equal(&destination, item) {
                self.log
                    .info("Source and destination are the same, skipping", Some(item));
                result.skipped += 1;
                continue;
            }

            let stat = match fs::metadata(item).await {
                Ok(stat) => stat,
                Err(_) => {
                    let message = format!("Source no longer exists: {}", item.display());
                    self.notifier.error(&message);
                    result.fail(item, message);
                    continue;
                }
            };

            if stat.is_dir() && (paths_equal(item, target_dir) || is_sub_path(item, target_dir)) {
                let message = format!("Cannot paste folder '{name}' into itself");
                self.log.error(&message, Some(item));
                result.fail(item, message);
                continue;
            }

            // Replacing the destination would delete the source with it.
            if is_sub_path(&destination, item) {
                let message = format!("Cannot paste '{name}' over a folder that contains it");
                self.log.error(&message, Some(item));
                result.fail(item, message);
                continue;
            }

            if occupied(&destination).await {
                if let Err(e) = remove_path(&destination).await {
                    self.log.error(
                        &format!("Failed to replace existing entry: {e}"),
                        Some(&destination),
                    );
                    result.fail(&destination, e.to_string());
                    continue;
                }
            }

            match self.copy_file_or_folder(item, &destination).await {
                Ok(()) => result.succeeded += 1,
                Err(e) => {
                    self.log
                        .error(&format!("Paste failed: {e}"), Some(item));
                    result.fail(item, e.to_string());
                }
            }
        }

        if result.succeeded > 0 {
            self.notifier
                .info(&format!("Pasted {}", plural(result.succeeded, "item")));
        }
        result
    }

    /// Overwrite bookmarked originals with copied files of the same name.
    ///
    /// Copied folders are flattened to the files inside them. A file whose
    /// name is a key of `name_to_original` replaces that original
    /// (delete, then copy); every other file is skipped.
    pub async fn paste_items_to_root(
        &self,
        copied: &[PathBuf],
        name_to_original: &HashMap<String, PathBuf>,
    ) -> OperationResult {
        let mut result = OperationResult::default();

        let mut files = Vec::new();
        for item in copied {
            match fs::metadata(item).await {
                Ok(stat) if stat.is_dir() => {
                    files.extend(
                        WalkDir::new(item)
                            .into_iter()
                            .filter_map(|e| e.ok())
                            .filter(|e| e.file_type().is_file())
                            .map(|e| e.into_path()),
                    );
                }
                Ok(_) => files.push(item.clone()),
                Err(_) => {
                    let message = format!("Source no longer exists: {}", item.display());
                    self.notifier.error(&message);
                    result.fail(item, message);
                }
            }
        }

        for file in files {
            let name = file_name_string(&file);
            let Some(original) = name_to_original.get(&name) else {
                result.skipped += 1;
                continue;
            };

            // Already the original; nothing to overwrite.
            if paths_equal(original, &file) {
                self.log.debug("Copied file is the original itself", Some(&file));
                continue;
            }

            if occupied(original).await {
                if let Err(e) = remove_path(original).await {
                    self.log
                        .error(&format!("Failed to overwrite: {e}"), Some(original));
                    result.fail(original, e.to_string());
                    continue;
                }
            }

            match self.copy_file_or_folder(&file, original).await {
                Ok(()) => result.succeeded += 1,
                Err(e) => {
                    self.log
                        .error(&format!("Overwrite failed: {e}"), Some(original));
                    result.fail(original, e.to_string());
                }
            }
        }

        if result.succeeded > 0 {
            self.notifier
                .info(&format!("{} overwritten", plural(result.succeeded, "file")));
        }
        if result.skipped > 0 {
            self.notifier.warning(&format!(
                "{} skipped (no matching bookmark)",
                plural(result.skipped, "file")
            ));
        }
        result
    }

    /// Create an empty folder. Returns `None` when the name is taken.
    pub async fn create_folder(&self, parent: &Path, name: &str) -> Result<Option<PathBuf>> {
        self.validated(name)?;
        let name = name.trim();
        let target = parent.join(name);

        if occupied(&target).await {
            self.notifier
                .warning(&format!("'{name}' already exists in {}", parent.display()));
            return Ok(None);
        }

        fs::create_dir(&target).await?;
        self.log.info("Folder created", Some(&target));
        self.notifier.info(&format!("Folder '{name}' created"));
        Ok(Some(target))
    }

    /// Create a zero-length file and ask the host to open it.
    /// Returns `None` when the name is taken.
    pub async fn create_file(&self, parent: &Path, name: &str) -> Result<Option<PathBuf>> {
        self.validated(name)?;
        let name = name.trim();
        let target = parent.join(name);

        let created = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await;
        match created {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                self.notifier
                    .warning(&format!("'{name}' already exists in {}", parent.display()));
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        self.log.info("File created", Some(&target));
        self.notifier.info(&format!("File '{name}' created"));
        if let Err(e) = self.notifier.open_document(&target) {
            self.log
                .warn(&format!("Could not open new file: {e}"), Some(&target));
        }
        Ok(Some(target))
    }

    /// Delete each path recursively. Failures are logged per item.
    pub async fn delete_original_files(&self, items: &[PathBuf]) -> OperationResult {
        let mut result = OperationResult::default();

        for item in items {
            match remove_path(item).await {
                Ok(()) => {
                    self.log.info("Deleted original", Some(item));
                    result.succeeded += 1;
                }
                Err(e) => {
                    self.log.error(&format!("Failed to delete: {e}"), Some(item));
                    result.fail(item, e.to_string());
                }
            }
        }

        if result.succeeded > 0 {
            self.notifier
                .info(&format!("Deleted {}", plural(result.succeeded, "item")));
        }
        result
    }

    /// Paths among `paths` that no longer exist, in input order.
    pub async fn check_for_changes(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut set = JoinSet::new();
        for (idx, path) in paths.iter().cloned().enumerate() {
            set.spawn(async move {
                let present = fs::metadata(&path).await.is_ok();
                (idx, path, present)
            });
        }

        let mut missing = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok((idx, path, false)) = joined {
                missing.push((idx, path));
            }
        }
        missing.sort_by_key(|(idx, _)| *idx);
        missing.into_iter().map(|(_, path)| path).collect()
    }

    fn validated(&self, name: &str) -> Result<()> {
        validate_file_name(name).inspect_err(|e| {
            self.log.warn(&e.to_string(), None);
            self.notifier.error(&e.to_string());
        })
    }
}

fn copy_entry(
    source: PathBuf,
    target: PathBuf,
    limit: Arc<Semaphore>,
    preserve_times: bool,
) -> CopyFuture {
    Box::pin(async move {
        let link = fs::symlink_metadata(&source).await?;
        let stat = if link.file_type().is_symlink() {
            fs::metadata(&source).await?
        } else {
            link.clone()
        };

        if stat.is_dir() {
            if link.file_type().is_symlink() {
                return Err(BookmarkError::UnsafeOperation(format!(
                    "not following directory symlink {}",
                    source.display()
                )));
            }

            fs::create_dir_all(&target).await?;
            let mut entries = fs::read_dir(&source).await?;
            let mut set = JoinSet::new();
            while let Some(entry) = entries.next_entry().await? {
                set.spawn(copy_entry(
                    entry.path(),
                    target.join(entry.file_name()),
                    limit.clone(),
                    preserve_times,
                ));
            }
            while let Some(joined) = set.join_next().await {
                joined.map_err(|e| BookmarkError::Io(std::io::Error::other(e.to_string())))??;
            }
            return Ok(());
        }

        let _permit = limit
            .acquire()
            .await
            .map_err(|e| BookmarkError::Io(std::io::Error::other(e.to_string())))?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let contents = fs::read(&source).await?;
        fs::write(&target, contents).await?;

        if preserve_times {
            let modified = stat.modified()?;
            filetime::set_file_mtime(&target, filetime::FileTime::from_system_time(modified))?;
        }
        Ok(())
    })
}

async fn remove_path(path: &Path) -> std::io::Result<()> {
    let stat = fs::symlink_metadata(path).await?;
    if stat.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{Notice, RecordingNotifier};
    use tempfile::TempDir;

    fn service() -> (OperationService, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = OperationService::new(
            &BookmarkConfig::default(),
            Arc::new(LogManager::new(100)),
            notifier.clone(),
        );
        (service, notifier)
    }

    fn tree(root: &Path) {
        std::fs::create_dir_all(root.join("nested/deeper")).unwrap();
        std::fs::write(root.join("top.txt"), "top").unwrap();
        std::fs::write(root.join("nested/mid.txt"), "mid").unwrap();
        std::fs::write(root.join("nested/deeper/low.txt"), "low").unwrap();
    }

    #[tokio::test]
    async fn test_copy_directory_recursively() -> Result<()> {
        let temp = TempDir::new()?;
        let source = temp.path().join("src");
        tree(&source);
        let (ops, _) = service();

        let target = temp.path().join("dst");
        ops.copy_file_or_folder(&source, &target).await?;

        assert_eq!(std::fs::read_to_string(target.join("top.txt"))?, "top");
        assert_eq!(std::fs::read_to_string(target.join("nested/deeper/low.txt"))?, "low");
        Ok(())
    }

    #[tokio::test]
    async fn test_copy_preserves_mtime() -> Result<()> {
        let temp = TempDir::new()?;
        let source = temp.path().join("a.txt");
        std::fs::write(&source, "x")?;
        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&source, old)?;
        let (ops, _) = service();

        let target = temp.path().join("b.txt");
        ops.copy_file_or_folder(&source, &target).await?;
        let meta = std::fs::metadata(&target)?;
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), old);
        Ok(())
    }

    #[tokio::test]
    async fn test_copy_refuses_self_and_subtree() -> Result<()> {
        let temp = TempDir::new()?;
        let dir = temp.path().join("dirA");
        tree(&dir);
        let before = WalkDir::new(temp.path()).into_iter().count();
        let (ops, _) = service();

        let err = ops.copy_file_or_folder(&dir, &dir).await.unwrap_err();
        assert_eq!(err.code(), "ERR_UNSAFE_OPERATION");
        let err = ops
            .copy_file_or_folder(&dir, &dir.join("child"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ERR_UNSAFE_OPERATION");

        let after = WalkDir::new(temp.path()).into_iter().count();
        assert_eq!(before, after);
        assert!(!dir.join("child").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_paste_items_replaces_and_counts() -> Result<()> {
        let temp = TempDir::new()?;
        let clipboard = temp.path().join("clip");
        std::fs::create_dir(&clipboard)?;
        std::fs::write(clipboard.join("a.txt"), "new")?;
        std::fs::write(clipboard.join("b.txt"), "b")?;

        let target = temp.path().join("target");
        std::fs::create_dir(&target)?;
        std::fs::write(target.join("a.txt"), "old")?;

        let (ops, notifier) = service();
        let result = ops
            .paste_items(&[clipboard.join("a.txt"), clipboard.join("b.txt")], &target)
            .await;

        assert_eq!(result.succeeded, 2);
        assert!(result.errors.is_empty());
        assert_eq!(std::fs::read_to_string(target.join("a.txt"))?, "new");
        assert_eq!(notifier.infos(), vec!["Pasted 2 items".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_paste_items_skips_same_location_and_missing_sources() -> Result<()> {
        let temp = TempDir::new()?;
        let file = temp.path().join("a.txt");
        std::fs::write(&file, "keep")?;
        let (ops, notifier) = service();

        let result = ops
            .paste_items(
                &[file.clone(), temp.path().join("elsewhere").join("gone.txt")],
                temp.path(),
            )
            .await;

        assert_eq!(result.succeeded, 0);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(std::fs::read_to_string(&file)?, "keep");
        assert_eq!(notifier.errors().len(), 1);
        assert!(notifier.infos().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_paste_folder_into_own_subtree_is_refused() -> Result<()> {
        let temp = TempDir::new()?;
        let dir = temp.path().join("dirA");
        tree(&dir);
        let (ops, _) = service();

        let result = ops.paste_items(&[dir.clone()], &dir.join("nested")).await;
        assert_eq!(result.succeeded, 0);
        assert_eq!(result.errors.len(), 1);
        assert!(!dir.join("nested/dirA").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_paste_items_to_root_overwrites_matching_names() -> Result<()> {
        let temp = TempDir::new()?;
        let ws = temp.path().join("ws");
        let tmp = temp.path().join("tmp");
        std::fs::create_dir_all(&ws)?;
        std::fs::create_dir_all(&tmp)?;
        std::fs::write(ws.join("a.txt"), "original")?;
        std::fs::write(tmp.join("a.txt"), "replacement")?;

        let mut map = HashMap::new();
        map.insert("a.txt".to_string(), ws.join("a.txt"));

        let (ops, notifier) = service();
        let result = ops.paste_items_to_root(&[tmp.join("a.txt")], &map).await;

        assert_eq!(result.succeeded, 1);
        assert_eq!(std::fs::read_to_string(ws.join("a.txt"))?, "replacement");
        assert_eq!(notifier.notices(), vec![Notice::Info("1 file overwritten".into())]);
        Ok(())
    }

    #[tokio::test]
    async fn test_paste_items_to_root_flattens_folders() -> Result<()> {
        let temp = TempDir::new()?;
        let ws = temp.path().join("ws");
        std::fs::create_dir_all(&ws)?;
        std::fs::write(ws.join("low.txt"), "old")?;
        let clip = temp.path().join("clip");
        tree(&clip);

        let mut map = HashMap::new();
        map.insert("low.txt".to_string(), ws.join("low.txt"));

        let (ops, notifier) = service();
        let result = ops.paste_items_to_root(&[clip], &map).await;

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.skipped, 2);
        assert_eq!(std::fs::read_to_string(ws.join("low.txt"))?, "low");
        assert_eq!(
            notifier.warnings(),
            vec!["2 files skipped (no matching bookmark)".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_paste_items_to_root_ignores_the_original_itself() -> Result<()> {
        let temp = TempDir::new()?;
        let original = temp.path().join("a.txt");
        std::fs::write(&original, "keep")?;

        let mut map = HashMap::new();
        map.insert("a.txt".to_string(), original.clone());

        let (ops, notifier) = service();
        let result = ops.paste_items_to_root(&[original.clone()], &map).await;

        assert_eq!(result, OperationResult::default());
        assert_eq!(std::fs::read_to_string(&original)?, "keep");
        assert!(notifier.notices().is_empty());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_paste_replaces_dangling_symlink_destination() -> Result<()> {
        let temp = TempDir::new()?;
        let src = temp.path().join("src");
        let target = temp.path().join("target");
        std::fs::create_dir_all(&src)?;
        std::fs::create_dir_all(&target)?;
        std::fs::write(src.join("a.txt"), "fresh")?;
        std::os::unix::fs::symlink(temp.path().join("nowhere"), target.join("a.txt"))?;

        let (ops, _notifier) = service();
        let result = ops.paste_items(&[src.join("a.txt")], &target).await;

        assert_eq!(result.succeeded, 1);
        assert!(!std::fs::symlink_metadata(target.join("a.txt"))?.is_symlink());
        assert_eq!(std::fs::read_to_string(target.join("a.txt"))?, "fresh");
        Ok(())
    }

    #[tokio::test]
    async fn test_create_folder_and_file() -> Result<()> {
        let temp = TempDir::new()?;
        let (ops, notifier) = service();

        let folder = ops.create_folder(temp.path(), "docs").await?;
        assert_eq!(folder, Some(temp.path().join("docs")));
        assert!(temp.path().join("docs").is_dir());

        let file = ops.create_file(temp.path(), "notes.md").await?;
        let file = file.unwrap();
        assert_eq!(std::fs::metadata(&file)?.len(), 0);
        assert!(notifier
            .notices()
            .contains(&Notice::Opened(file.to_string_lossy().into_owned())));

        // Existing names warn and leave content alone
        std::fs::write(&file, "content")?;
        assert_eq!(ops.create_file(temp.path(), "notes.md").await?, None);
        assert_eq!(ops.create_folder(temp.path(), "docs").await?, None);
        assert_eq!(std::fs::read_to_string(&file)?, "content");
        assert_eq!(notifier.warnings().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_names() -> Result<()> {
        let temp = TempDir::new()?;
        let (ops, _) = service();

        assert!(ops.create_folder(temp.path(), "a/b").await.is_err());
        assert!(ops.create_file(temp.path(), "").await.is_err());
        assert_eq!(std::fs::read_dir(temp.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_original_files_continues_after_failure() -> Result<()> {
        let temp = TempDir::new()?;
        let dir = temp.path().join("dir");
        tree(&dir);
        let file = temp.path().join("a.txt");
        std::fs::write(&file, "x")?;
        let (ops, notifier) = service();

        let result = ops
            .delete_original_files(&[temp.path().join("missing"), dir.clone(), file.clone()])
            .await;

        assert_eq!(result.succeeded, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(!dir.exists());
        assert!(!file.exists());
        assert_eq!(notifier.infos(), vec!["Deleted 2 items".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_check_for_changes_reports_missing() -> Result<()> {
        let temp = TempDir::new()?;
        let a = temp.path().join("a.txt");
        std::fs::write(&a, "x")?;
        let b = temp.path().join("b.txt");
        let c = temp.path().join("c.txt");
        let (ops, _) = service();

        let missing = ops.check_for_changes(&[b.clone(), a, c.clone()]).await;
        assert_eq!(missing, vec![b, c]);
        Ok(())
    }
}
