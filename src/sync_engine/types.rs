use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Suffix appended to the bookmark name to form its descriptor file name.
pub const DESCRIPTOR_SUFFIX: &str = ".bookmark.json";

/// Persisted record for one bookmarked filesystem entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkMetadata {
    pub original_path: PathBuf,
    pub bookmark_name: String,
    pub is_file: bool,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds of the last reconciliation that observed a change.
    pub last_sync_at: i64,
    pub original_exists: bool,
}

impl BookmarkMetadata {
    pub fn descriptor_file_name(&self) -> String {
        descriptor_file_name(&self.bookmark_name)
    }
}

pub fn descriptor_file_name(bookmark_name: &str) -> String {
    format!("{bookmark_name}{DESCRIPTOR_SUFFIX}")
}

/// Process-local presentation status of a bookmark.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookmarkStatus {
    Synced,
    /// Content differs from the baseline taken when the bookmark was loaded.
    Modified,
    Missing,
    Error,
}

impl BookmarkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookmarkStatus::Synced => "SYNCED",
            BookmarkStatus::Modified => "MODIFIED",
            BookmarkStatus::Missing => "MISSING",
            BookmarkStatus::Error => "ERROR",
        }
    }
}

/// Notifications published to the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookmarkEvent {
    StatusChanged {
        path: PathBuf,
        status: BookmarkStatus,
    },
    /// Coalesced request to repaint the tree.
    RefreshRequested,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_serializes_camel_case() {
        let meta = BookmarkMetadata {
            original_path: PathBuf::from("/ws/a.txt"),
            bookmark_name: "doc".to_string(),
            is_file: true,
            created_at: 1,
            last_sync_at: 2,
            original_exists: true,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["originalPath"], "/ws/a.txt");
        assert_eq!(json["bookmarkName"], "doc");
        assert_eq!(json["isFile"], true);
        assert_eq!(json["lastSyncAt"], 2);
        assert_eq!(json.as_object().unwrap().len(), 6);
        assert_eq!(meta.descriptor_file_name(), "doc.bookmark.json");
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&BookmarkStatus::Missing).unwrap(),
            "\"MISSING\""
        );
        assert_eq!(BookmarkStatus::Synced.as_str(), "SYNCED");
    }
}
