pub mod engine;
pub mod store;
pub mod types;

pub use engine::SyncEngine;
pub use store::DescriptorStore;
pub use types::{BookmarkEvent, BookmarkMetadata, BookmarkStatus, DESCRIPTOR_SUFFIX};
