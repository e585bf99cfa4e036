pub mod config;
pub mod error;
pub mod error_codes;
pub mod host;
pub mod input_validation;
pub mod logging;
pub mod operations;
pub mod path_validation;
pub mod sync_engine;
pub mod tree_view;
pub mod watcher;
pub mod workspace;

pub use config::{BookmarkConfig, DeleteBehavior};
pub use error::{BookmarkError, Result};
pub use host::{LogNotifier, Notifier};
pub use logging::{LogEntry, LogLevel, LogManager};
pub use operations::{OperationError, OperationResult, OperationService};
pub use sync_engine::{BookmarkEvent, BookmarkMetadata, BookmarkStatus, SyncEngine};
pub use tree_view::{TreeAdapter, TreeItem};
pub use workspace::BookmarkWorkspace;

/// Crate version as built.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
