use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileItem {
    pub id: Uuid,
    pub path: PathBuf,
    /// File name without its extension.
    pub name: String,
    pub extension: String,
    pub size_bytes: u64,
    pub created_at: Option<DateTime<Utc>>,
}

impl FileItem {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            path,
            name,
            extension,
            size_bytes,
            created_at: None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let metadata = path.metadata().ok()?;
        if metadata.is_dir() {
            return None;
        }
        let mut item = Self::new(path, metadata.len());
        item.created_at = metadata.created().ok().map(DateTime::<Utc>::from);
        Some(item)
    }

    /// Lossy `name.extension` for logs and planners. Filesystem work uses
    /// `path.file_name()`.
    pub fn display_name(&self) -> String {
        if self.extension.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.extension)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_splits_name_and_extension() {
        let item = FileItem::new("/home/user/photos/IMG_0001.jpg", 42);
        assert_eq!(item.name, "IMG_0001");
        assert_eq!(item.extension, "jpg");
        assert_eq!(item.display_name(), "IMG_0001.jpg");
        assert_eq!(item.size_bytes, 42);
    }

    #[test]
    fn display_name_without_extension() {
        let item = FileItem::new("/home/user/Makefile", 0);
        assert_eq!(item.extension, "");
        assert_eq!(item.display_name(), "Makefile");
    }

    #[test]
    fn from_path_reads_metadata_and_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.md");
        std::fs::write(&file, "hello").unwrap();

        let item = FileItem::from_path(&file).unwrap();
        assert_eq!(item.size_bytes, 5);
        assert_eq!(item.display_name(), "notes.md");

        assert!(FileItem::from_path(dir.path()).is_none());
        assert!(FileItem::from_path(&dir.path().join("missing.txt")).is_none());
    }
}
