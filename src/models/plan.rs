use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::file_item::FileItem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRenameMapping {
    pub original_file: FileItem,
    pub suggested_name: String,
}

impl FileRenameMapping {
    pub fn new(original_file: FileItem, suggested_name: impl Into<String>) -> Self {
        Self {
            original_file,
            suggested_name: suggested_name.into(),
        }
    }

    pub fn has_rename(&self) -> bool {
        let suggested = self.suggested_name.trim();
        !suggested.is_empty() && suggested != self.original_file.display_name()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderSuggestion {
    pub id: Uuid,
    pub folder_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub files: Vec<FileItem>,
    #[serde(default)]
    pub subfolders: Vec<FolderSuggestion>,
    #[serde(default)]
    pub file_renames: Vec<FileRenameMapping>,
    #[serde(default)]
    pub reasoning: String,
}

impl FolderSuggestion {
    pub fn new(folder_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            folder_name: folder_name.into(),
            description: String::new(),
            files: Vec::new(),
            subfolders: Vec::new(),
            file_renames: Vec::new(),
            reasoning: String::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<FileItem>) -> Self {
        self.files = files;
        self
    }

    pub fn with_subfolders(mut self, subfolders: Vec<FolderSuggestion>) -> Self {
        self.subfolders = subfolders;
        self
    }

    pub fn with_renames(mut self, file_renames: Vec<FileRenameMapping>) -> Self {
        self.file_renames = file_renames;
        self
    }

    /// Suggested final name for `file`, if a non-empty mapping exists for it.
    pub fn rename_for(&self, file: &FileItem) -> Option<&str> {
        self.file_renames
            .iter()
            .find(|m| m.original_file.id == file.id || m.original_file.path == file.path)
            .filter(|m| m.has_rename())
            .map(|m| m.suggested_name.trim())
    }

    pub fn total_file_count(&self) -> usize {
        self.files.len()
            + self
                .subfolders
                .iter()
                .map(FolderSuggestion::total_file_count)
                .sum::<usize>()
    }

    pub fn depth(&self) -> usize {
        1 + self
            .subfolders
            .iter()
            .map(FolderSuggestion::depth)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub suggestions: Vec<FolderSuggestion>,
    #[serde(default)]
    pub unorganized_files: Vec<FileItem>,
    #[serde(default)]
    pub notes: String,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
}

impl Plan {
    pub fn new(suggestions: Vec<FolderSuggestion>) -> Self {
        Self {
            id: Uuid::new_v4(),
            suggestions,
            unorganized_files: Vec::new(),
            notes: String::new(),
            timestamp: Utc::now(),
            version: 1,
        }
    }

    pub fn total_files(&self) -> usize {
        self.suggestions
            .iter()
            .map(FolderSuggestion::total_file_count)
            .sum::<usize>()
            + self.unorganized_files.len()
    }

    pub fn total_folders(&self) -> usize {
        fn count(folders: &[FolderSuggestion]) -> usize {
            folders.len() + folders.iter().map(|f| count(&f.subfolders)).sum::<usize>()
        }
        count(&self.suggestions)
    }

    pub fn max_depth(&self) -> usize {
        self.suggestions
            .iter()
            .map(FolderSuggestion::depth)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(path: &str) -> FileItem {
        FileItem::new(path, 1)
    }

    #[test]
    fn counts_files_and_folders_recursively() {
        let plan = Plan {
            unorganized_files: vec![item("/d/left.txt")],
            ..Plan::new(vec![
                FolderSuggestion::new("Docs")
                    .with_files(vec![item("/d/a.pdf")])
                    .with_subfolders(vec![
                        FolderSuggestion::new("Taxes").with_files(vec![item("/d/b.pdf")])
                    ]),
                FolderSuggestion::new("Images").with_files(vec![item("/d/c.jpg")]),
            ])
        };

        assert_eq!(plan.total_files(), 4);
        assert_eq!(plan.total_folders(), 3);
        assert_eq!(plan.max_depth(), 2);
        assert_eq!(plan.version, 1);
    }

    #[test]
    fn rename_mapping_requires_a_changed_non_empty_name() {
        let file = item("/d/IMG_0001.jpg");
        assert!(FileRenameMapping::new(file.clone(), "Vacation-Beach.jpg").has_rename());
        assert!(!FileRenameMapping::new(file.clone(), "   ").has_rename());
        assert!(!FileRenameMapping::new(file, "IMG_0001.jpg").has_rename());
    }

    #[test]
    fn rename_for_matches_by_id_or_path() {
        let file = item("/d/IMG_0001.jpg");
        let mut same_path = item("/d/IMG_0001.jpg");
        same_path.id = Uuid::new_v4();
        let suggestion = FolderSuggestion::new("Photos")
            .with_files(vec![file.clone()])
            .with_renames(vec![FileRenameMapping::new(
                file.clone(),
                " Vacation-Beach.jpg ",
            )]);

        assert_eq!(suggestion.rename_for(&file), Some("Vacation-Beach.jpg"));
        assert_eq!(suggestion.rename_for(&same_path), Some("Vacation-Beach.jpg"));
        assert_eq!(suggestion.rename_for(&item("/d/other.jpg")), None);
    }
}
