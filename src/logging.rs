use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Default maximum number of log lines to keep in memory
pub const DEFAULT_MAX_LOG_LINES: usize = 10000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    /// Bookmark original path the entry is about, if any.
    pub path: Option<String>,
}

/// Process-scoped output channel.
///
/// One instance is created when a workspace opens and shared by `Arc` with
/// every component; it keeps the last `max_lines` entries for the host to
/// display and mirrors each entry to `tracing`.
pub struct LogManager {
    entries: Mutex<VecDeque<LogEntry>>,
    next_id: Mutex<u64>,
    max_lines: usize,
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LINES)
    }
}

impl LogManager {
    pub fn new(max_lines: usize) -> Self {
        let max_lines = max_lines.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_lines.min(1024))),
            next_id: Mutex::new(0),
            max_lines,
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn log(&self, level: LogLevel, message: &str, path: Option<&Path>) {
        let path = path.map(|p| p.to_string_lossy().into_owned());

        match level {
            LogLevel::Debug => tracing::debug!(path = path.as_deref(), "{message}"),
            LogLevel::Info => tracing::info!(path = path.as_deref(), "{message}"),
            LogLevel::Warning => tracing::warn!(path = path.as_deref(), "{message}"),
            LogLevel::Error => tracing::error!(path = path.as_deref(), "{message}"),
        }

        let id = {
            let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            *next_id += 1;
            *next_id
        };

        let entry = LogEntry {
            id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            message: message.to_string(),
            path,
        };

        let mut entries = self.entries();
        entries.push_back(entry);

        // Remove from front if full
        while entries.len() > self.max_lines {
            entries.pop_front();
        }
    }

    pub fn debug(&self, message: &str, path: Option<&Path>) {
        self.log(LogLevel::Debug, message, path);
    }

    pub fn info(&self, message: &str, path: Option<&Path>) {
        self.log(LogLevel::Info, message, path);
    }

    pub fn warn(&self, message: &str, path: Option<&Path>) {
        self.log(LogLevel::Warning, message, path);
    }

    pub fn error(&self, message: &str, path: Option<&Path>) {
        self.log(LogLevel::Error, message, path);
    }

    pub fn get_logs(&self, path: Option<&str>) -> Vec<LogEntry> {
        let entries = self.entries();
        match path {
            Some(p) => entries
                .iter()
                .filter(|e| e.path.as_deref() == Some(p))
                .cloned()
                .collect(),
            None => entries.iter().cloned().collect(),
        }
    }

    /// Get logs with pagination for hosts that render long histories lazily
    pub fn get_logs_paginated(&self, offset: usize, limit: usize) -> Vec<LogEntry> {
        let entries = self.entries();
        entries.iter().skip(offset).take(limit).cloned().collect()
    }

    /// Drop every retained entry. Called when the workspace shuts down.
    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_manager_new() {
        let manager = LogManager::new(100);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_log_manager_log() {
        let manager = LogManager::new(10);

        manager.info("test message", None);
        assert_eq!(manager.len(), 1);

        manager.warn("another message", Some(Path::new("/ws/a.txt")));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_log_manager_rotation() {
        let manager = LogManager::new(3);

        for i in 0..5 {
            manager.info(&format!("message {i}"), None);
        }

        let logs = manager.get_logs(None);
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "message 2");
        assert_eq!(logs[2].id, 5);
    }

    #[test]
    fn test_log_manager_filter_by_path() {
        let manager = LogManager::new(10);

        manager.info("message1", None);
        manager.info("message2", Some(Path::new("/ws/a.txt")));
        manager.error("message3", Some(Path::new("/ws/a.txt")));

        assert_eq!(manager.get_logs(None).len(), 3);
        assert_eq!(manager.get_logs(Some("/ws/a.txt")).len(), 2);
        assert!(manager.get_logs(Some("/ws/b.txt")).is_empty());
    }

    #[test]
    fn test_log_manager_pagination() {
        let manager = LogManager::new(100);

        for i in 0..20 {
            manager.info(&format!("message {i}"), None);
        }

        assert_eq!(manager.get_logs_paginated(0, 10).len(), 10);
        assert_eq!(manager.get_logs_paginated(10, 10)[0].message, "message 10");
        assert!(manager.get_logs_paginated(20, 10).is_empty());
    }

    #[test]
    fn test_clear() {
        let manager = LogManager::new(10);
        manager.error("boom", None);
        manager.clear();
        assert!(manager.is_empty());
    }
}
