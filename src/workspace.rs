//! Wires the engine, the operation service and the tree adapter into the
//! command surface a host calls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::config::{BookmarkConfig, DeleteBehavior};
use crate::error::Result;
use crate::host::Notifier;
use crate::logging::LogManager;
use crate::operations::{OperationResult, OperationService};
use crate::path_validation::{file_name_string, paths_equal};
use crate::sync_engine::SyncEngine;
use crate::tree_view::TreeAdapter;

pub struct BookmarkWorkspace {
    engine: SyncEngine,
    operations: OperationService,
    tree: Arc<TreeAdapter>,
    notifier: Arc<dyn Notifier>,
    log: Arc<LogManager>,
    tree_updates: JoinHandle<()>,
}

impl BookmarkWorkspace {
    pub async fn open(
        workspace_root: &Path,
        config: BookmarkConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let log = Arc::new(LogManager::new(config.max_log_lines));
        Self::open_with_log(workspace_root, config, log, notifier).await
    }

    pub async fn open_with_log(
        workspace_root: &Path,
        config: BookmarkConfig,
        log: Arc<LogManager>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let engine = SyncEngine::open(workspace_root, config, log.clone()).await?;
        let operations = OperationService::new(engine.config(), log.clone(), notifier.clone());
        let tree = Arc::new(TreeAdapter::new(engine.clone()));
        let tree_updates = tokio::spawn(forward_tree_events(
            Arc::downgrade(&tree),
            engine.clone(),
        ));

        log.info(
            &format!("Workspace opened with {} bookmark(s)", engine.bookmark_count().await),
            Some(workspace_root),
        );

        Ok(Self {
            engine,
            operations,
            tree,
            notifier,
            log,
            tree_updates,
        })
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn operations(&self) -> &OperationService {
        &self.operations
    }

    pub fn tree(&self) -> &TreeAdapter {
        &self.tree
    }

    pub fn log(&self) -> &Arc<LogManager> {
        &self.log
    }

    /// Delete bookmarks according to `deleteBehavior`.
    ///
    /// Returns `None` when the user cancelled the `ask` prompt. With
    /// `bookmarkAndOriginal`, a bookmark whose original could not be deleted
    /// is kept and marked as failed.
    pub async fn delete_bookmarks(&self, paths: &[PathBuf]) -> Option<OperationResult> {
        if paths.is_empty() {
            return Some(OperationResult::default());
        }

        let behavior = match self.engine.config().delete_behavior {
            DeleteBehavior::Ask => self.notifier.ask_delete_behavior(paths.len())?,
            other => other,
        };

        let mut result = OperationResult::default();
        let mut to_remove: Vec<PathBuf> = paths.to_vec();

        if behavior == DeleteBehavior::BookmarkAndOriginal {
            let deleted = self.operations.delete_original_files(paths).await;
            for failure in &deleted.errors {
                self.engine.mark_error(&failure.path).await;
            }
            to_remove.retain(|p| !deleted.errors.iter().any(|e| paths_equal(&e.path, p)));
            result.errors = deleted.errors;
        }

        for path in &to_remove {
            match self.engine.remove_bookmark(path).await {
                Ok(true) => result.succeeded += 1,
                Ok(false) => result.skipped += 1,
                Err(e) => {
                    self.log
                        .error(&format!("Failed to remove bookmark: {e}"), Some(path));
                    result.errors.push(crate::operations::OperationError {
                        path: path.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if behavior == DeleteBehavior::BookmarkOnly && result.succeeded > 0 {
            self.notifier.info(&format!(
                "Removed {} bookmark{}",
                result.succeeded,
                if result.succeeded == 1 { "" } else { "s" }
            ));
        }
        Some(result)
    }

    /// Paste into a real directory, then resync any bookmark that was
    /// replaced by the paste.
    pub async fn paste(&self, copied: &[PathBuf], target_dir: &Path) -> OperationResult {
        let result = self.operations.paste_items(copied, target_dir).await;
        for item in copied {
            self.resync_if_bookmarked(&target_dir.join(file_name_string(item)))
                .await;
        }
        result
    }

    /// Overwrite bookmarked originals whose file name matches a copied file.
    pub async fn paste_to_root(&self, copied: &[PathBuf]) -> OperationResult {
        let mut name_to_original: HashMap<String, PathBuf> = HashMap::new();
        for meta in self.engine.get_all_bookmarks().await {
            if !meta.is_file {
                continue;
            }
            name_to_original
                .entry(file_name_string(&meta.original_path))
                .or_insert(meta.original_path);
        }

        let result = self
            .operations
            .paste_items_to_root(copied, &name_to_original)
            .await;

        for original in name_to_original.values() {
            if result.errors.iter().any(|e| paths_equal(&e.path, original)) {
                self.engine.mark_error(original).await;
            } else {
                self.resync_if_bookmarked(original).await;
            }
        }
        result
    }

    pub async fn create_file(&self, parent: &Path, name: &str) -> Result<Option<PathBuf>> {
        let created = self.operations.create_file(parent, name).await?;
        if let Some(path) = &created {
            self.resync_if_bookmarked(path).await;
        }
        Ok(created)
    }

    pub async fn create_folder(&self, parent: &Path, name: &str) -> Result<Option<PathBuf>> {
        let created = self.operations.create_folder(parent, name).await?;
        if let Some(path) = &created {
            self.resync_if_bookmarked(path).await;
        }
        Ok(created)
    }

    /// Existence check across every bookmark. Missing originals are synced so
    /// their status and descriptor catch up. Returns the missing paths.
    pub async fn check_all(&self) -> Vec<PathBuf> {
        let originals: Vec<PathBuf> = self
            .engine
            .get_all_bookmarks()
            .await
            .into_iter()
            .map(|m| m.original_path)
            .collect();

        let missing = self.operations.check_for_changes(&originals).await;
        for path in &missing {
            if let Err(e) = self.engine.sync_bookmark(path).await {
                self.log.error(&e.to_string(), Some(path));
            }
        }
        if !missing.is_empty() {
            self.notifier
                .warning(&format!("Missing originals: {}", missing.len()));
        }
        missing
    }

    /// Stop watchers and background tasks and drop the retained log.
    /// Descriptors stay on disk.
    pub async fn shutdown(&self) {
        self.tree_updates.abort();
        self.engine.dispose().await;
        self.tree.clear();
        self.log.info("Workspace closed", None);
        self.log.clear();
    }

    async fn resync_if_bookmarked(&self, path: &Path) {
        if self.engine.get_bookmark(path).await.is_none() {
            return;
        }
        if let Err(e) = self.engine.sync_bookmark(path).await {
            self.log.error(&e.to_string(), Some(path));
        }
    }
}

impl Drop for BookmarkWorkspace {
    fn drop(&mut self) {
        self.tree_updates.abort();
    }
}

async fn forward_tree_events(tree: Weak<TreeAdapter>, engine: SyncEngine) {
    let mut events = engine.subscribe();
    drop(engine);

    loop {
        let event = events.recv().await;
        let Some(tree) = tree.upgrade() else {
            break;
        };
        match event {
            Ok(event) => tree.handle_event(&event),
            Err(RecvError::Lagged(_)) => tree.clear(),
            Err(RecvError::Closed) => break,
        }
    }
}
