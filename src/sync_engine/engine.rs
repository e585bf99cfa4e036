use std::collections::{HashMap, HashSet};
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, Weak};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::{broadcast, mpsc, Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::BookmarkConfig;
use crate::error::{BookmarkError, Result};
use crate::input_validation::validate_bookmark_name;
use crate::logging::LogManager;
use crate::path_validation::{
    exists, extension_of, file_name_string, name_key, normalize_path, path_key, paths_equal,
    unique_fs_path, unique_name, validate_original_path,
};
use crate::sync_engine::store::{bookmark_name_from_descriptor, DescriptorStore};
use crate::sync_engine::types::{BookmarkEvent, BookmarkMetadata, BookmarkStatus};
use crate::watcher::{WatchEvent, WatchEventKind, WatcherManager};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Owner of all bookmark state: the metadata map, one watcher per original,
/// the descriptor directory and the process-local statuses.
///
/// Cheap to clone; clones share the same state. Hosts observe changes through
/// [`SyncEngine::subscribe`] and never touch descriptors directly.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: DescriptorStore,
    config: BookmarkConfig,
    log: Arc<LogManager>,
    records: RwLock<HashMap<PathBuf, BookmarkMetadata>>,
    statuses: RwLock<HashMap<PathBuf, BookmarkStatus>>,
    baselines: RwLock<HashMap<PathBuf, String>>,
    watchers: Mutex<WatcherManager>,
    path_locks: PathLocks,
    /// Serializes bookmark-name allocation with descriptor create/delete.
    catalog: Mutex<()>,
    events: broadcast::Sender<BookmarkEvent>,
    refresh_tx: mpsc::UnboundedSender<()>,
    shutdown: CancellationToken,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// One async mutex per normalized original path.
#[derive(Default)]
struct PathLocks {
    locks: std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    fn handle(&self, key: PathBuf) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key).or_default().clone()
    }

    async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        self.handle(path_key(path)).lock_owned().await
    }

    /// Lock two paths in key order so opposite renames cannot deadlock.
    async fn lock_pair(&self, a: &Path, b: &Path) -> Vec<OwnedMutexGuard<()>> {
        let mut keys = vec![path_key(a), path_key(b)];
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.handle(key).lock_owned().await);
        }
        guards
    }

    /// Forget locks nobody holds or waits on.
    fn prune(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

impl SyncEngine {
    /// Open the descriptor directory under `workspace_root`, load every
    /// bookmark in it and start watching their originals.
    pub async fn open(
        workspace_root: &Path,
        config: BookmarkConfig,
        log: Arc<LogManager>,
    ) -> Result<Self> {
        config.validate()?;

        let store = DescriptorStore::new(workspace_root.join(&config.descriptor_dir));
        store.ensure_dir().await?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (watch_tx, watch_rx) = mpsc::unbounded_channel();
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let debounce = Duration::from_millis(config.refresh_debounce_ms);

        let inner = Arc::new(EngineInner {
            store,
            config,
            log,
            records: RwLock::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
            baselines: RwLock::new(HashMap::new()),
            watchers: Mutex::new(WatcherManager::new(watch_tx)),
            path_locks: PathLocks::default(),
            catalog: Mutex::new(()),
            events: events.clone(),
            refresh_tx,
            shutdown: shutdown.clone(),
        });

        tokio::spawn(run_refresh_debouncer(
            refresh_rx,
            events,
            debounce,
            shutdown.clone(),
        ));
        tokio::spawn(run_watch_dispatcher(
            Arc::downgrade(&inner),
            watch_rx,
            shutdown,
        ));

        let engine = Self { inner };
        engine.load_all().await?;
        Ok(engine)
    }

    pub fn descriptor_dir(&self) -> &Path {
        self.inner.store.dir()
    }

    pub fn config(&self) -> &BookmarkConfig {
        &self.inner.config
    }

    pub fn log(&self) -> &Arc<LogManager> {
        &self.inner.log
    }

    /// Subscribe to status and refresh notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<BookmarkEvent> {
        self.inner.events.subscribe()
    }

    async fn load_all(&self) -> Result<()> {
        let inner = &self.inner;
        let loaded = inner.store.load_all(inner.config.load_batch_size).await?;

        let mut accepted = Vec::new();
        {
            let mut records = inner.records.write().await;
            for (descriptor, result) in loaded {
                let mut meta = match result {
                    Ok(meta) => meta,
                    Err(e) => {
                        inner.log.error(
                            &format!("Skipping unreadable descriptor: {e}"),
                            Some(&descriptor),
                        );
                        continue;
                    }
                };

                // The file name is authoritative for the bookmark name.
                if let Some(name) = bookmark_name_from_descriptor(&descriptor) {
                    if name != meta.bookmark_name {
                        inner.log.warn(
                            &format!(
                                "Descriptor name '{name}' disagrees with stored name '{}'",
                                meta.bookmark_name
                            ),
                            Some(&descriptor),
                        );
                        meta.bookmark_name = name;
                    }
                }

                let key = path_key(&meta.original_path);
                if records.contains_key(&key) {
                    inner.log.warn(
                        "Original already bookmarked by another descriptor, skipping",
                        Some(&meta.original_path),
                    );
                    continue;
                }
                accepted.push(meta.original_path.clone());
                records.insert(key, meta);
            }
        }

        {
            let mut watchers = inner.watchers.lock().await;
            for path in &accepted {
                if let Err(e) = watchers.start_watching(path) {
                    inner.log.warn(&e.to_string(), Some(path));
                }
            }
        }

        // One existence pass over everything, then a single refresh.
        let mut checks = JoinSet::new();
        for path in accepted {
            checks.spawn(async move {
                let present = exists(&path).await;
                (path, present)
            });
        }

        let now = now_ms();
        while let Some(joined) = checks.join_next().await {
            let Ok((path, present)) = joined else {
                continue;
            };
            let key = path_key(&path);

            let flipped = {
                let mut records = inner.records.write().await;
                match records.get_mut(&key) {
                    Some(meta) if meta.original_exists != present => {
                        meta.original_exists = present;
                        meta.last_sync_at = now;
                        Some(meta.clone())
                    }
                    _ => None,
                }
            };
            if let Some(meta) = flipped {
                if let Err(e) = inner.store.write(&meta).await {
                    inner.log.error(&e.to_string(), Some(&path));
                }
            }

            let status = if present {
                BookmarkStatus::Synced
            } else {
                BookmarkStatus::Missing
            };
            inner.statuses.write().await.insert(key, status);
            if present {
                self.capture_baseline(&path).await;
            }
        }

        let count = inner.records.read().await.len();
        inner
            .log
            .info(&format!("Loaded {count} bookmark(s)"), Some(inner.store.dir()));
        self.request_refresh();
        Ok(())
    }

    /// Bookmark `original_path` under `name` (defaults to its file name).
    ///
    /// The name gets a `_1`, `_2`, ... suffix when another bookmark already
    /// uses it. Bookmarking an original that is already bookmarked replaces
    /// the previous record.
    pub async fn add_bookmark(
        &self,
        original_path: &Path,
        name: Option<&str>,
    ) -> Result<BookmarkMetadata> {
        let inner = &self.inner;
        validate_original_path(original_path)?;
        let original = normalize_path(original_path);

        let base = match name {
            Some(n) => n.trim().to_string(),
            None => file_name_string(&original),
        };
        validate_bookmark_name(&base)?;

        let _guard = inner.path_locks.lock(&original).await;

        let stat = match fs::metadata(&original).await {
            Ok(stat) => stat,
            Err(e) => {
                inner
                    .log
                    .error(&format!("Cannot bookmark: {e}"), Some(&original));
                return Err(BookmarkError::NotFound(original));
            }
        };

        let key = path_key(&original);
        let now = now_ms();

        let (meta, previous) = {
            let _catalog = inner.catalog.lock().await;

            let (meta, previous) = {
                let mut records = inner.records.write().await;
                let bookmark_name = unique_bookmark_name(&records, &base, Some(&key));
                let meta = BookmarkMetadata {
                    original_path: original.clone(),
                    bookmark_name,
                    is_file: stat.is_file(),
                    created_at: now,
                    last_sync_at: now,
                    original_exists: true,
                };
                let previous = records.insert(key.clone(), meta.clone());
                (meta, previous)
            };

            if let Some(prev) = &previous {
                if prev.bookmark_name != meta.bookmark_name {
                    if let Err(e) = inner.store.delete(&prev.bookmark_name).await {
                        inner.log.error(&e.to_string(), Some(&original));
                    }
                }
            }
            if let Err(e) = inner.store.write(&meta).await {
                inner.log.error(&e.to_string(), Some(&original));
            }
            (meta, previous)
        };

        if let Err(e) = inner.watchers.lock().await.start_watching(&original) {
            inner.log.warn(&e.to_string(), Some(&original));
        }

        self.capture_baseline(&original).await;

        let verb = if previous.is_some() { "Replaced" } else { "Added" };
        inner.log.info(
            &format!("{verb} bookmark '{}'", meta.bookmark_name),
            Some(&original),
        );
        self.set_status(&original, BookmarkStatus::Synced).await;
        self.request_refresh();
        Ok(meta)
    }

    /// Rename a bookmark and, when the name maps to a different file name,
    /// the original on disk.
    ///
    /// For files the original extension is kept when `new_name` has none.
    /// The on-disk rename never overwrites: a taken target gets a `_1`,
    /// `_2`, ... suffix. A failed on-disk rename is logged and the bookmark is
    /// still renamed.
    pub async fn rename_bookmark(
        &self,
        original_path: &Path,
        new_name: &str,
    ) -> Result<BookmarkMetadata> {
        let inner = &self.inner;
        validate_bookmark_name(new_name)?;
        let new_name = new_name.trim();
        let original = normalize_path(original_path);

        let snapshot = self
            .get_bookmark(&original)
            .await
            .ok_or_else(|| BookmarkError::NotFound(original.clone()))?;
        let candidate = rename_candidate(&snapshot, new_name);

        let _guards = inner.path_locks.lock_pair(&original, &candidate).await;
        let _catalog = inner.catalog.lock().await;

        let old_key = path_key(&original);
        let current = inner
            .records
            .read()
            .await
            .get(&old_key)
            .cloned()
            .ok_or_else(|| BookmarkError::NotFound(original.clone()))?;
        let candidate = rename_candidate(&current, new_name);

        let bookmark_name = {
            let records = inner.records.read().await;
            unique_bookmark_name(&records, new_name, Some(&old_key))
        };

        let mut new_path = current.original_path.clone();
        if candidate != current.original_path {
            let target = if paths_equal(&candidate, &current.original_path) {
                // Case-only rename on a case-insensitive filesystem.
                candidate
            } else {
                // Missing originals leave their path free on disk, so other
                // records' paths are reserved as well.
                let reserved: HashSet<PathBuf> = inner
                    .records
                    .read()
                    .await
                    .keys()
                    .filter(|key| **key != old_key)
                    .cloned()
                    .collect();
                unique_fs_path(&candidate, current.is_file, |p| {
                    reserved.contains(&path_key(p))
                })
                .await
            };
            match fs::rename(&current.original_path, &target).await {
                Ok(()) => new_path = target,
                Err(e) => inner.log.error(
                    &format!("Failed to rename original to {}: {e}", target.display()),
                    Some(&current.original_path),
                ),
            }
        }

        let present = exists(&new_path).await;
        let mut updated = current.clone();
        updated.bookmark_name = bookmark_name;
        updated.original_path = new_path.clone();
        updated.original_exists = present;
        updated.last_sync_at = now_ms();

        if updated.bookmark_name != current.bookmark_name {
            if let Err(e) = inner.store.delete(&current.bookmark_name).await {
                inner.log.error(&e.to_string(), Some(&current.original_path));
            }
        }
        if let Err(e) = inner.store.write(&updated).await {
            inner.log.error(&e.to_string(), Some(&new_path));
        }

        self.rebind(&current.original_path, updated.clone()).await;

        inner.log.info(
            &format!(
                "Renamed bookmark '{}' to '{}'",
                current.bookmark_name, updated.bookmark_name
            ),
            Some(&new_path),
        );
        let status = if present {
            BookmarkStatus::Synced
        } else {
            BookmarkStatus::Missing
        };
        self.set_status(&new_path, status).await;
        self.request_refresh();
        Ok(updated)
    }

    /// Remove a bookmark: descriptor, record and watcher. The original is
    /// untouched. Returns false when the path was not bookmarked.
    pub async fn remove_bookmark(&self, original_path: &Path) -> Result<bool> {
        let inner = &self.inner;
        let key = path_key(original_path);

        let removed = {
            let _guard = inner.path_locks.lock(original_path).await;
            let _catalog = inner.catalog.lock().await;

            let Some(meta) = inner.records.read().await.get(&key).cloned() else {
                return Ok(false);
            };

            if let Err(e) = inner.store.delete(&meta.bookmark_name).await {
                inner.log.error(&e.to_string(), Some(&meta.original_path));
            }
            inner.records.write().await.remove(&key);
            inner.watchers.lock().await.stop_watching(&meta.original_path);
            inner.statuses.write().await.remove(&key);
            inner.baselines.write().await.remove(&key);
            meta
        };
        inner.path_locks.prune();

        inner.log.info(
            &format!("Removed bookmark '{}'", removed.bookmark_name),
            Some(&removed.original_path),
        );
        self.request_refresh();
        Ok(true)
    }

    /// Reconcile one bookmark with the filesystem.
    ///
    /// Returns the resulting status, or `None` when the path is not
    /// bookmarked. The descriptor is rewritten only when the reconciliation
    /// observed a change: existence flipped, or the original was modified
    /// after `lastSyncAt`.
    pub async fn sync_bookmark(&self, original_path: &Path) -> Result<Option<BookmarkStatus>> {
        let inner = &self.inner;
        let key = path_key(original_path);
        let _guard = inner.path_locks.lock(original_path).await;

        let Some(mut meta) = inner.records.read().await.get(&key).cloned() else {
            return Ok(None);
        };

        let now = now_ms();
        let (changed, mut status) = match fs::metadata(&meta.original_path).await {
            Ok(stat) => {
                let modified_after_sync = stat
                    .modified()
                    .ok()
                    .map(system_time_ms)
                    .is_some_and(|mtime| mtime > meta.last_sync_at);
                let changed = !meta.original_exists || modified_after_sync;
                if changed {
                    meta.original_exists = true;
                    meta.last_sync_at = now;
                }
                (changed, self.drift_status(&meta).await)
            }
            Err(_) => {
                let changed = meta.original_exists;
                if changed {
                    meta.original_exists = false;
                    meta.last_sync_at = now;
                }
                (changed, BookmarkStatus::Missing)
            }
        };

        if changed {
            inner.records.write().await.insert(key, meta.clone());
            if let Err(e) = inner.store.write(&meta).await {
                inner.log.error(&e.to_string(), Some(&meta.original_path));
                status = BookmarkStatus::Error;
            }
        }

        let previous = self.status(&meta.original_path).await;
        self.set_status(&meta.original_path, status).await;
        if changed || previous != Some(status) {
            self.request_refresh();
        }
        Ok(Some(status))
    }

    /// Point a bookmark at a new original without renaming it, e.g. after
    /// the original was moved outside of this engine.
    pub async fn update_original_path(
        &self,
        old_path: &Path,
        new_path: &Path,
    ) -> Result<BookmarkMetadata> {
        let inner = &self.inner;
        validate_original_path(new_path)?;
        let new_path = normalize_path(new_path);
        let _guards = inner.path_locks.lock_pair(old_path, &new_path).await;
        let _catalog = inner.catalog.lock().await;

        let old_key = path_key(old_path);
        let new_key = path_key(&new_path);
        let current = {
            let records = inner.records.read().await;
            let current = records
                .get(&old_key)
                .cloned()
                .ok_or_else(|| BookmarkError::NotFound(old_path.to_path_buf()))?;
            if new_key != old_key && records.contains_key(&new_key) {
                return Err(BookmarkError::UnsafeOperation(format!(
                    "{} is already bookmarked",
                    new_path.display()
                )));
            }
            current
        };

        let present = exists(&new_path).await;
        let mut updated = current.clone();
        updated.original_path = new_path.clone();
        updated.original_exists = present;
        updated.last_sync_at = now_ms();

        if let Err(e) = inner.store.write(&updated).await {
            inner.log.error(&e.to_string(), Some(&new_path));
        }
        self.rebind(&current.original_path, updated.clone()).await;

        let status = if present {
            BookmarkStatus::Synced
        } else {
            BookmarkStatus::Missing
        };
        self.set_status(&new_path, status).await;
        self.request_refresh();
        Ok(updated)
    }

    /// Move a record (and its watcher, status and baseline) from `old_path`
    /// to `updated.original_path`.
    async fn rebind(&self, old_path: &Path, updated: BookmarkMetadata) {
        let inner = &self.inner;
        let old_key = path_key(old_path);
        let new_key = path_key(&updated.original_path);
        let new_path = updated.original_path.clone();

        {
            let mut records = inner.records.write().await;
            records.remove(&old_key);
            records.insert(new_key.clone(), updated);
        }

        if old_key == new_key && old_path == new_path.as_path() {
            return;
        }

        {
            let mut watchers = inner.watchers.lock().await;
            watchers.stop_watching(old_path);
            if let Err(e) = watchers.start_watching(&new_path) {
                inner.log.warn(&e.to_string(), Some(&new_path));
            }
        }

        {
            let mut statuses = inner.statuses.write().await;
            if let Some(status) = statuses.remove(&old_key) {
                statuses.insert(new_key, status);
            }
        }
        inner.baselines.write().await.remove(&old_key);
        self.capture_baseline(&new_path).await;
    }

    /// Sync the bookmark for a document the host just saved, if any.
    pub async fn on_document_saved(&self, path: &Path) -> Result<Option<BookmarkStatus>> {
        if self.get_bookmark(path).await.is_none() {
            return Ok(None);
        }
        self.sync_bookmark(path).await
    }

    /// Mark a bookmark as failed after an operation against it went wrong.
    pub async fn mark_error(&self, original_path: &Path) {
        if self.get_bookmark(original_path).await.is_some() {
            self.set_status(original_path, BookmarkStatus::Error).await;
            self.request_refresh();
        }
    }

    /// Accept the current content of a MODIFIED bookmark as the new baseline.
    pub async fn acknowledge(&self, original_path: &Path) -> Result<Option<BookmarkStatus>> {
        let Some(meta) = self.get_bookmark(original_path).await else {
            return Ok(None);
        };
        self.inner
            .baselines
            .write()
            .await
            .remove(&path_key(&meta.original_path));
        self.capture_baseline(&meta.original_path).await;
        self.sync_bookmark(&meta.original_path).await
    }

    /// Snapshot of every bookmark, sorted by name.
    pub async fn get_all_bookmarks(&self) -> Vec<BookmarkMetadata> {
        let mut all: Vec<BookmarkMetadata> =
            self.inner.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| {
            a.bookmark_name
                .to_lowercase()
                .cmp(&b.bookmark_name.to_lowercase())
                .then_with(|| a.bookmark_name.cmp(&b.bookmark_name))
        });
        all
    }

    pub async fn get_bookmark(&self, original_path: &Path) -> Option<BookmarkMetadata> {
        self.inner
            .records
            .read()
            .await
            .get(&path_key(original_path))
            .cloned()
    }

    pub async fn bookmark_count(&self) -> usize {
        self.inner.records.read().await.len()
    }

    pub async fn status(&self, original_path: &Path) -> Option<BookmarkStatus> {
        self.inner
            .statuses
            .read()
            .await
            .get(&path_key(original_path))
            .copied()
    }

    pub async fn watched_paths(&self) -> Vec<PathBuf> {
        self.inner.watchers.lock().await.watched_paths()
    }

    pub async fn watcher_count(&self) -> usize {
        self.inner.watchers.lock().await.len()
    }

    /// Stop every watcher and background task and forget all bookmarks.
    /// Descriptor files stay on disk. The engine must not be used afterwards.
    pub async fn dispose(&self) {
        let inner = &self.inner;
        inner.shutdown.cancel();
        inner.watchers.lock().await.stop_all();
        inner.records.write().await.clear();
        inner.statuses.write().await.clear();
        inner.baselines.write().await.clear();
        inner.path_locks.prune();
    }

    async fn set_status(&self, original_path: &Path, status: BookmarkStatus) {
        self.inner
            .statuses
            .write()
            .await
            .insert(path_key(original_path), status);
        // No subscribers is fine.
        let _ = self.inner.events.send(BookmarkEvent::StatusChanged {
            path: original_path.to_path_buf(),
            status,
        });
    }

    fn request_refresh(&self) {
        let _ = self.inner.refresh_tx.send(());
    }

    async fn handle_watch_event(&self, event: WatchEvent) {
        let path = event.original_path;
        match event.kind {
            WatchEventKind::Changed => {
                if let Err(e) = self.sync_bookmark(&path).await {
                    self.inner.log.error(&e.to_string(), Some(&path));
                }
            }
            WatchEventKind::Created | WatchEventKind::Deleted => {
                let _guard = self.inner.path_locks.lock(&path).await;
                if self.get_bookmark(&path).await.is_none() {
                    return;
                }
                let status = if event.kind == WatchEventKind::Created {
                    BookmarkStatus::Synced
                } else {
                    BookmarkStatus::Missing
                };
                self.set_status(&path, status).await;
                self.request_refresh();
            }
        }
    }

    async fn capture_baseline(&self, path: &Path) {
        if !self.inner.config.detect_content_drift {
            return;
        }
        let is_file = fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false);
        if !is_file {
            return;
        }
        match calculate_checksum(path).await {
            Ok(hash) => {
                self.inner.baselines.write().await.insert(path_key(path), hash);
            }
            Err(e) => self
                .inner
                .log
                .warn(&format!("Cannot hash original: {e}"), Some(path)),
        }
    }

    async fn drift_status(&self, meta: &BookmarkMetadata) -> BookmarkStatus {
        if !self.inner.config.detect_content_drift || !meta.is_file {
            return BookmarkStatus::Synced;
        }
        let key = path_key(&meta.original_path);
        let baseline = self.inner.baselines.read().await.get(&key).cloned();
        let Some(baseline) = baseline else {
            self.capture_baseline(&meta.original_path).await;
            return BookmarkStatus::Synced;
        };
        match calculate_checksum(&meta.original_path).await {
            Ok(hash) if hash != baseline => BookmarkStatus::Modified,
            Ok(_) => BookmarkStatus::Synced,
            Err(e) => {
                self.inner
                    .log
                    .warn(&format!("Cannot hash original: {e}"), Some(&meta.original_path));
                BookmarkStatus::Error
            }
        }
    }
}

/// Pick a bookmark name not used by any record other than `exclude`.
fn unique_bookmark_name(
    records: &HashMap<PathBuf, BookmarkMetadata>,
    base: &str,
    exclude: Option<&PathBuf>,
) -> String {
    unique_name(base, |candidate| {
        let wanted = name_key(candidate);
        records
            .iter()
            .any(|(key, meta)| Some(key) != exclude && name_key(&meta.bookmark_name) == wanted)
    })
}

/// Filesystem path a rename to `new_name` aims for, before collision handling.
fn rename_candidate(meta: &BookmarkMetadata, new_name: &str) -> PathBuf {
    let file_name = if meta.is_file && extension_of(Path::new(new_name)).is_empty() {
        format!("{new_name}{}", extension_of(&meta.original_path))
    } else {
        new_name.to_string()
    };
    match meta.original_path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

async fn run_refresh_debouncer(
    mut rx: mpsc::UnboundedReceiver<()>,
    events: broadcast::Sender<BookmarkEvent>,
    window: Duration,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            first = rx.recv() => {
                if first.is_none() {
                    break;
                }
            }
        }

        // Gather requests until the window passes quietly.
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                more = tokio::time::timeout(window, rx.recv()) => match more {
                    Ok(Some(())) => continue,
                    Ok(None) => {
                        let _ = events.send(BookmarkEvent::RefreshRequested);
                        return;
                    }
                    Err(_) => break,
                },
            }
        }

        let _ = events.send(BookmarkEvent::RefreshRequested);
    }
}

async fn run_watch_dispatcher(
    engine: Weak<EngineInner>,
    mut rx: mpsc::UnboundedReceiver<WatchEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(inner) = engine.upgrade() else {
            break;
        };
        SyncEngine { inner }.handle_watch_event(event).await;
    }
}

async fn calculate_checksum(path: &Path) -> std::io::Result<String> {
    use twox_hash::XxHash64;

    let mut file = fs::File::open(path).await?;
    let mut hasher = XxHash64::with_seed(0);
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.write(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finish()))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn system_time_ms(time: SystemTime) -> i64 {
    chrono::DateTime::<chrono::Utc>::from(time).timestamp_millis()
}
