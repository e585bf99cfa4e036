//! Services provided by the embedding host (editor, desktop shell, CLI).

use std::path::Path;
use std::sync::Arc;

use crate::config::DeleteBehavior;
use crate::logging::LogManager;

/// User-facing notification and prompt surface.
pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);

    /// Open a freshly created file in an editor. Best effort.
    fn open_document(&self, _path: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    /// Resolve the `ask` delete behavior. `None` cancels the delete.
    fn ask_delete_behavior(&self, _count: usize) -> Option<DeleteBehavior> {
        None
    }
}

/// Notifier that only writes to the output channel.
pub struct LogNotifier {
    log: Arc<LogManager>,
}

impl LogNotifier {
    pub fn new(log: Arc<LogManager>) -> Self {
        Self { log }
    }
}

impl Notifier for LogNotifier {
    fn info(&self, message: &str) {
        self.log.info(message, None);
    }

    fn warning(&self, message: &str) {
        self.log.warn(message, None);
    }

    fn error(&self, message: &str) {
        self.log.error(message, None);
    }
}
