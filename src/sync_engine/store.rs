//! Descriptor file persistence.
//!
//! One pretty-printed JSON file per bookmark, named
//! `<bookmarkName>.bookmark.json`. The directory listing is the index.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReadDirStream;
use tokio_stream::StreamExt;

use crate::error::{BookmarkError, Result};
use crate::sync_engine::types::{descriptor_file_name, BookmarkMetadata, DESCRIPTOR_SUFFIX};

#[derive(Debug, Clone)]
pub struct DescriptorStore {
    dir: PathBuf,
}

impl DescriptorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn descriptor_path(&self, bookmark_name: &str) -> PathBuf {
        self.dir.join(descriptor_file_name(bookmark_name))
    }

    /// Write the descriptor for `meta`, replacing any previous content.
    /// Goes through a temp file + rename so a crash never leaves half a
    /// descriptor behind.
    pub async fn write(&self, meta: &BookmarkMetadata) -> Result<()> {
        let path = self.descriptor_path(&meta.bookmark_name);
        let payload = serde_json::to_vec_pretty(meta)?;
        let tmp = path.with_extension("json.tmp");

        let outcome = async {
            fs::write(&tmp, &payload).await?;
            fs::rename(&tmp, &path).await
        }
        .await;

        outcome.map_err(|e| BookmarkError::Persistence {
            path,
            message: e.to_string(),
        })
    }

    /// Delete the descriptor for `bookmark_name`. Absent files are fine.
    pub async fn delete(&self, bookmark_name: &str) -> Result<()> {
        let path = self.descriptor_path(bookmark_name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BookmarkError::Persistence {
                path,
                message: e.to_string(),
            }),
        }
    }

    pub async fn read(path: &Path) -> Result<BookmarkMetadata> {
        let contents = fs::read(path).await.map_err(|e| BookmarkError::Persistence {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(serde_json::from_slice(&contents)?)
    }

    /// Descriptor files currently in the directory, sorted by name.
    pub async fn list(&self) -> Result<Vec<PathBuf>> {
        let read_dir = match fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut stream = ReadDirStream::new(read_dir);
        let mut files = Vec::new();
        while let Some(entry) = stream.next().await {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(DESCRIPTOR_SUFFIX) && name.len() > DESCRIPTOR_SUFFIX.len() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Read every descriptor, `batch_size` files at a time.
    ///
    /// Results keep the listing order; unreadable descriptors come back as
    /// errors next to their path so the caller can log and skip them.
    pub async fn load_all(
        &self,
        batch_size: usize,
    ) -> Result<Vec<(PathBuf, Result<BookmarkMetadata>)>> {
        let files = self.list().await?;
        let mut loaded = Vec::with_capacity(files.len());

        for chunk in files.chunks(batch_size.max(1)) {
            let mut set = JoinSet::new();
            for (idx, path) in chunk.iter().cloned().enumerate() {
                set.spawn(async move {
                    let result = DescriptorStore::read(&path).await;
                    (idx, path, result)
                });
            }

            let mut batch = Vec::with_capacity(chunk.len());
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(item) => batch.push(item),
                    Err(e) => {
                        return Err(BookmarkError::Io(std::io::Error::other(e.to_string())));
                    }
                }
            }
            batch.sort_by_key(|(idx, _, _)| *idx);
            loaded.extend(batch.into_iter().map(|(_, path, result)| (path, result)));
        }

        Ok(loaded)
    }
}

/// Bookmark name encoded in a descriptor file name.
pub fn bookmark_name_from_descriptor(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    name.strip_suffix(DESCRIPTOR_SUFFIX)
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(name: &str) -> BookmarkMetadata {
        BookmarkMetadata {
            original_path: PathBuf::from(format!("/ws/{name}.txt")),
            bookmark_name: name.to_string(),
            is_file: true,
            created_at: 10,
            last_sync_at: 10,
            original_exists: true,
        }
    }

    #[tokio::test]
    async fn test_write_read_delete() -> Result<()> {
        let temp = TempDir::new()?;
        let store = DescriptorStore::new(temp.path().join(".bookmark"));
        store.ensure_dir().await?;

        let meta = sample("doc");
        store.write(&meta).await?;

        let path = store.descriptor_path("doc");
        assert!(path.ends_with("doc.bookmark.json"));
        let text = std::fs::read_to_string(&path)?;
        assert!(text.contains("\n  \"originalPath\""));
        assert_eq!(DescriptorStore::read(&path).await?, meta);

        store.delete("doc").await?;
        assert!(!path.exists());
        store.delete("doc").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_list_ignores_other_files() -> Result<()> {
        let temp = TempDir::new()?;
        let store = DescriptorStore::new(temp.path());
        store.write(&sample("b")).await?;
        store.write(&sample("a")).await?;
        std::fs::write(temp.path().join("notes.json"), "{}")?;
        std::fs::write(temp.path().join(".bookmark.json"), "{}")?;

        let files = store.list().await?;
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| bookmark_name_from_descriptor(p))
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() -> Result<()> {
        let temp = TempDir::new()?;
        let store = DescriptorStore::new(temp.path().join("absent"));
        assert!(store.list().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_all_in_batches_reports_corrupt_files() -> Result<()> {
        let temp = TempDir::new()?;
        let store = DescriptorStore::new(temp.path());
        for i in 0..23 {
            store.write(&sample(&format!("item{i:02}"))).await?;
        }
        std::fs::write(temp.path().join("broken.bookmark.json"), "not json")?;

        let loaded = store.load_all(10).await?;
        assert_eq!(loaded.len(), 24);
        assert_eq!(loaded.iter().filter(|(_, r)| r.is_err()).count(), 1);
        let (first_path, first) = &loaded[0];
        assert!(first_path.ends_with("broken.bookmark.json"));
        assert!(first.is_err());
        Ok(())
    }
}
