//! Presentation items for the bookmark tree.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use serde::Serialize;
use tokio::fs;

use crate::error::Result;
use crate::path_validation::{file_name_string, path_key, paths_equal};
use crate::sync_engine::{BookmarkEvent, BookmarkMetadata, BookmarkStatus, SyncEngine};

const DEFAULT_CACHE_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TreeIcon {
    File,
    Folder,
    Modified,
    Missing,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TreeItem {
    pub label: String,
    pub path: PathBuf,
    pub description: Option<String>,
    pub tooltip: String,
    pub icon: TreeIcon,
    /// Used by the host to pick context-menu entries.
    pub context_value: &'static str,
    pub collapsible: bool,
    /// Set for bookmark roots, `None` for plain children.
    pub status: Option<BookmarkStatus>,
}

/// Renders engine state into tree items. Read-only: every mutation goes
/// through the engine.
pub struct TreeAdapter {
    engine: SyncEngine,
    cache: Mutex<LruCache<PathBuf, TreeItem>>,
}

impl TreeAdapter {
    pub fn new(engine: SyncEngine) -> Self {
        Self::with_capacity(engine, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(engine: SyncEngine, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            engine,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn cache(&self) -> MutexGuard<'_, LruCache<PathBuf, TreeItem>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One item per bookmark, sorted by bookmark name.
    pub async fn root_items(&self) -> Vec<TreeItem> {
        let bookmarks = self.engine.get_all_bookmarks().await;
        let mut items = Vec::with_capacity(bookmarks.len());

        for meta in bookmarks {
            let status = match self.engine.status(&meta.original_path).await {
                Some(status) => status,
                None if meta.original_exists => BookmarkStatus::Synced,
                None => BookmarkStatus::Missing,
            };

            let key = path_key(&meta.original_path);
            let cached = self
                .cache()
                .get(&key)
                .filter(|item| {
                    item.label == meta.bookmark_name
                        && item.status == Some(status)
                        && item.path == meta.original_path
                })
                .cloned();

            let item = match cached {
                Some(item) => item,
                None => {
                    let item = render_bookmark(&meta, status);
                    self.cache().put(key, item.clone());
                    item
                }
            };
            items.push(item);
        }

        items
    }

    /// Real directory entries below a folder bookmark: folders first, then
    /// files, each group sorted case-insensitively. The descriptor directory
    /// is hidden.
    pub async fn children(&self, dir: &Path) -> Result<Vec<TreeItem>> {
        let descriptor_dir = self.engine.descriptor_dir().to_path_buf();
        let mut entries = fs::read_dir(dir).await?;
        let mut items = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if paths_equal(&path, &descriptor_dir) {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            items.push(render_child(path, is_dir));
        }

        items.sort_by(|a, b| {
            b.collapsible
                .cmp(&a.collapsible)
                .then_with(|| a.label.to_lowercase().cmp(&b.label.to_lowercase()))
        });
        Ok(items)
    }

    /// Drop cached items affected by an engine event.
    pub fn handle_event(&self, event: &BookmarkEvent) {
        if let BookmarkEvent::StatusChanged { path, .. } = event {
            self.invalidate(path);
        }
    }

    pub fn invalidate(&self, path: &Path) {
        self.cache().pop(&path_key(path));
    }

    pub fn clear(&self) {
        self.cache().clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache().len()
    }
}

fn render_bookmark(meta: &BookmarkMetadata, status: BookmarkStatus) -> TreeItem {
    let icon = match status {
        BookmarkStatus::Missing => TreeIcon::Missing,
        BookmarkStatus::Error => TreeIcon::Error,
        BookmarkStatus::Modified => TreeIcon::Modified,
        BookmarkStatus::Synced if meta.is_file => TreeIcon::File,
        BookmarkStatus::Synced => TreeIcon::Folder,
    };

    let context_value = match (status, meta.is_file) {
        (BookmarkStatus::Missing, _) => "bookmarkMissing",
        (_, true) => "bookmarkFile",
        (_, false) => "bookmarkFolder",
    };

    let description = match status {
        BookmarkStatus::Missing => Some("missing".to_string()),
        BookmarkStatus::Error => Some("error".to_string()),
        _ => meta
            .original_path
            .parent()
            .map(|p| p.to_string_lossy().into_owned()),
    };

    TreeItem {
        label: meta.bookmark_name.clone(),
        path: meta.original_path.clone(),
        description,
        tooltip: format!("{} [{}]", meta.original_path.display(), status.as_str()),
        icon,
        context_value,
        collapsible: !meta.is_file && status != BookmarkStatus::Missing,
        status: Some(status),
    }
}

fn render_child(path: PathBuf, is_dir: bool) -> TreeItem {
    TreeItem {
        label: file_name_string(&path),
        tooltip: path.to_string_lossy().into_owned(),
        description: None,
        icon: if is_dir { TreeIcon::Folder } else { TreeIcon::File },
        context_value: if is_dir { "childFolder" } else { "childFile" },
        collapsible: is_dir,
        status: None,
        path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BookmarkConfig;
    use crate::logging::LogManager;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn engine(root: &Path) -> SyncEngine {
        SyncEngine::open(root, BookmarkConfig::default(), Arc::new(LogManager::new(50)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_items_sorted_with_status() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("z.txt");
        let dir = temp.path().join("folder");
        std::fs::write(&file, "x").unwrap();
        std::fs::create_dir(&dir).unwrap();

        let engine = engine(temp.path()).await;
        engine.add_bookmark(&file, Some("beta")).await.unwrap();
        engine.add_bookmark(&dir, Some("Alpha")).await.unwrap();
        let tree = TreeAdapter::new(engine.clone());

        let items = tree.root_items().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "Alpha");
        assert_eq!(items[0].icon, TreeIcon::Folder);
        assert!(items[0].collapsible);
        assert_eq!(items[1].context_value, "bookmarkFile");
        assert_eq!(items[1].status, Some(BookmarkStatus::Synced));
        assert_eq!(tree.cached_len(), 2);
    }

    #[tokio::test]
    async fn test_missing_bookmark_rerenders() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();

        let engine = engine(temp.path()).await;
        engine.add_bookmark(&file, None).await.unwrap();
        let tree = TreeAdapter::new(engine.clone());
        assert_eq!(tree.root_items().await[0].icon, TreeIcon::File);

        std::fs::remove_file(&file).unwrap();
        engine.sync_bookmark(&file).await.unwrap();
        tree.handle_event(&BookmarkEvent::StatusChanged {
            path: file.clone(),
            status: BookmarkStatus::Missing,
        });

        let item = &tree.root_items().await[0];
        assert_eq!(item.icon, TreeIcon::Missing);
        assert_eq!(item.context_value, "bookmarkMissing");
        assert_eq!(item.description.as_deref(), Some("missing"));
    }

    #[tokio::test]
    async fn test_children_orders_folders_first_and_hides_descriptors() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("b.txt"), "x").unwrap();
        std::fs::write(temp.path().join("A.txt"), "x").unwrap();
        std::fs::create_dir(temp.path().join("zdir")).unwrap();

        let engine = engine(temp.path()).await;
        let tree = TreeAdapter::new(engine);

        let labels: Vec<String> = tree
            .children(temp.path())
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.label)
            .collect();
        assert_eq!(labels, vec!["zdir", "A.txt", "b.txt"]);
    }

    #[test]
    fn test_render_child() {
        let item = render_child(PathBuf::from("/ws/docs"), true);
        assert_eq!(item.label, "docs");
        assert_eq!(item.context_value, "childFolder");
        assert!(item.status.is_none());
    }
}
