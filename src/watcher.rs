//! 북마크 원본 감시 관리 모듈
//!
//! 북마크마다 하나의 watcher를 두고, 원본 경로의 부모 디렉토리를 비재귀로 감시하면서
//! 원본 이름에 해당하는 이벤트만 걸러 엔진으로 전달합니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{BookmarkError, Result};
use crate::path_validation::{path_key, paths_equal};

/// 원본에 일어난 변화 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Changed,
    Created,
    Deleted,
}

/// 엔진으로 전달되는 감시 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub original_path: PathBuf,
    pub kind: WatchEventKind,
}

/// 단일 북마크의 Watcher 정보
pub struct BookmarkWatcher {
    pub original_path: PathBuf,
    _watcher: RecommendedWatcher,
}

/// 북마크별 Watcher를 관리하는 매니저
pub struct WatcherManager {
    watchers: HashMap<PathBuf, BookmarkWatcher>,
    events: UnboundedSender<WatchEvent>,
}

impl WatcherManager {
    pub fn new(events: UnboundedSender<WatchEvent>) -> Self {
        Self {
            watchers: HashMap::new(),
            events,
        }
    }

    /// 원본 경로에 대한 감시를 시작합니다.
    pub fn start_watching(&mut self, original_path: &Path) -> Result<()> {
        let key = path_key(original_path);

        // 이미 감시 중이면 중지 후 재시작
        self.watchers.remove(&key);

        let parent = original_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| BookmarkError::Watch {
                path: original_path.to_path_buf(),
                message: "path has no parent directory".to_string(),
            })?
            .to_path_buf();

        let target = original_path.to_path_buf();
        let tx = self.events.clone();

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    for kind in classify(&event, &target) {
                        // 수신 측이 닫혔으면 엔진이 종료된 것
                        let _ = tx.send(WatchEvent {
                            original_path: target.clone(),
                            kind,
                        });
                    }
                }
            },
        )
        .map_err(|e| watch_error(original_path, e))?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|e| watch_error(original_path, e))?;

        self.watchers.insert(
            key,
            BookmarkWatcher {
                original_path: original_path.to_path_buf(),
                _watcher: watcher,
            },
        );

        Ok(())
    }

    /// 감시를 중지합니다. 감시 중이 아니었으면 false.
    pub fn stop_watching(&mut self, original_path: &Path) -> bool {
        self.watchers.remove(&path_key(original_path)).is_some()
    }

    /// 감시 중인 원본 경로 목록을 반환합니다.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .watchers
            .values()
            .map(|w| w.original_path.clone())
            .collect();
        paths.sort();
        paths
    }

    pub fn is_watching(&self, original_path: &Path) -> bool {
        self.watchers.contains_key(&path_key(original_path))
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// 모든 감시를 중지합니다.
    pub fn stop_all(&mut self) {
        self.watchers.clear();
    }
}

impl Drop for WatcherManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn watch_error(path: &Path, err: notify::Error) -> BookmarkError {
    BookmarkError::Watch {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// notify 이벤트를 감시 대상 기준의 변화 목록으로 변환합니다.
/// 부모 디렉토리의 다른 항목에 대한 이벤트는 버립니다.
pub fn classify(event: &Event, target: &Path) -> Vec<WatchEventKind> {
    let touches = |p: &Path| paths_equal(p, target);

    match event.kind {
        EventKind::Create(_) if event.paths.iter().any(|p| touches(p)) => {
            vec![WatchEventKind::Created]
        }
        EventKind::Remove(_) if event.paths.iter().any(|p| touches(p)) => {
            vec![WatchEventKind::Deleted]
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::Both => {
                let mut kinds = Vec::new();
                if event.paths.first().is_some_and(|p| touches(p)) {
                    kinds.push(WatchEventKind::Deleted);
                }
                if event.paths.get(1).is_some_and(|p| touches(p)) {
                    kinds.push(WatchEventKind::Created);
                }
                kinds
            }
            RenameMode::From if event.paths.iter().any(|p| touches(p)) => {
                vec![WatchEventKind::Deleted]
            }
            RenameMode::To if event.paths.iter().any(|p| touches(p)) => {
                vec![WatchEventKind::Created]
            }
            _ if event.paths.iter().any(|p| touches(p)) => {
                // 방향을 알 수 없는 rename (FSEvents 등): 현재 존재 여부로 판단
                if std::fs::symlink_metadata(target).is_ok() {
                    vec![WatchEventKind::Created]
                } else {
                    vec![WatchEventKind::Deleted]
                }
            }
            _ => Vec::new(),
        },
        EventKind::Modify(_) if event.paths.iter().any(|p| touches(p)) => {
            vec![WatchEventKind::Changed]
        }
        _ => Vec::new(),
    }
}
