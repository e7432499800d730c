use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    CreateFolder,
    MoveFile,
    RenameFile,
    DeleteFile,
    CopyFile,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateFolder => write!(f, "create_folder"),
            Self::MoveFile => write!(f, "move_file"),
            Self::RenameFile => write!(f, "rename_file"),
            Self::DeleteFile => write!(f, "delete_file"),
            Self::CopyFile => write!(f, "copy_file"),
        }
    }
}

impl std::str::FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_folder" => Ok(Self::CreateFolder),
            "move_file" => Ok(Self::MoveFile),
            "rename_file" => Ok(Self::RenameFile),
            "delete_file" => Ok(Self::DeleteFile),
            "copy_file" => Ok(Self::CopyFile),
            _ => Err(format!("unknown operation type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_filename: Option<String>,
    #[serde(default)]
    pub created_during_organization: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_folder: Option<PathBuf>,
}

/// One filesystem mutation. Records are only built by the executor and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperation {
    pub id: Uuid,
    pub operation_type: OperationType,
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OperationMetadata>,
}

impl FileOperation {
    fn build(
        operation_type: OperationType,
        source: &Path,
        destination: Option<&Path>,
        metadata: Option<OperationMetadata>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_type,
            source: source.to_path_buf(),
            destination: destination.map(Path::to_path_buf),
            timestamp: Utc::now(),
            metadata,
        }
    }

    pub(crate) fn create_folder(path: &Path) -> Self {
        Self::build(OperationType::CreateFolder, path, None, None)
    }

    pub(crate) fn move_file(
        source: &Path,
        destination: &Path,
        metadata: Option<OperationMetadata>,
    ) -> Self {
        Self::build(OperationType::MoveFile, source, Some(destination), metadata)
    }

    pub(crate) fn rename_file(source: &Path, destination: &Path) -> Self {
        let metadata = OperationMetadata {
            original_filename: file_name(source),
            new_filename: file_name(destination),
            created_during_organization: false,
            parent_folder: destination.parent().map(Path::to_path_buf),
        };
        Self::build(
            OperationType::RenameFile,
            source,
            Some(destination),
            Some(metadata),
        )
    }

    pub(crate) fn copy_file(source: &Path, destination: &Path) -> Self {
        Self::build(OperationType::CopyFile, source, Some(destination), None)
    }

    pub(crate) fn delete_file(source: &Path, trashed_at: Option<&Path>) -> Self {
        let metadata = OperationMetadata {
            original_filename: file_name(source),
            parent_folder: source.parent().map(Path::to_path_buf),
            ..OperationMetadata::default()
        };
        Self::build(OperationType::DeleteFile, source, trashed_at, Some(metadata))
    }

    /// Every path this operation touched.
    pub fn touched_paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.source.as_path()).chain(self.destination.as_deref())
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_string())
}
