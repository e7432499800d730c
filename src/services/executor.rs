//! Applies a [`Plan`] to a directory tree and records every mutation it
//! performs as a [`FileOperation`].
//!
//! Application runs in two phases. Phase A creates the whole folder tree,
//! Phase B places files into it. Both phases are idempotent over an already
//! organized tree: folders that exist and files already at their destination
//! produce no log entries.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::file_item::FileItem;
use crate::models::operation::{FileOperation, OperationMetadata};
use crate::models::plan::{FolderSuggestion, Plan};
use crate::scope_path::normalize;
use crate::services::file_service;
use crate::services::unique_path::unique_path_with;
use crate::services::validator::{sanitize_file_name, validate_folder_name};

pub const DEFAULT_MAX_PLAN_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    /// Compute the operations without touching the filesystem.
    pub dry_run: bool,
    pub max_depth: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_depth: DEFAULT_MAX_PLAN_DEPTH,
        }
    }
}

impl ApplyOptions {
    pub fn preview() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }
}

struct Executor {
    options: ApplyOptions,
    /// Destinations handed out during a dry run, which never reach the disk.
    reserved: HashSet<PathBuf>,
    operations: Vec<FileOperation>,
}

impl Executor {
    fn new(options: ApplyOptions) -> Self {
        Self {
            options,
            reserved: HashSet::new(),
            operations: Vec::new(),
        }
    }

    fn check_depth(&self, depth: usize, folder: &Path) -> Result<(), AppError> {
        if depth > self.options.max_depth {
            return Err(AppError::InvalidPlan(format!(
                "folder tree deeper than {} at {}",
                self.options.max_depth,
                folder.display()
            )));
        }
        Ok(())
    }

    fn create_folder_tree(
        &mut self,
        suggestion: &FolderSuggestion,
        parent: &Path,
        depth: usize,
    ) -> Result<(), AppError> {
        validate_folder_name(&suggestion.folder_name)?;
        let folder_path = parent.join(&suggestion.folder_name);
        self.check_depth(depth, &folder_path)?;

        match folder_path.symlink_metadata() {
            Ok(meta) if meta.is_dir() => {
                debug!(folder = %folder_path.display(), "folder already exists");
            }
            Ok(_) => {
                self.back_up_colliding_file(&suggestion.folder_name, parent, &folder_path)?;
                self.create_folder(&folder_path)?;
            }
            Err(_) => self.create_folder(&folder_path)?,
        }

        for child in &suggestion.subfolders {
            self.create_folder_tree(child, &folder_path, depth + 1)?;
        }
        Ok(())
    }

    fn create_folder(&mut self, folder_path: &Path) -> Result<(), AppError> {
        if !self.options.dry_run {
            file_service::create_dir_all(folder_path)?;
        }
        self.operations
            .push(FileOperation::create_folder(folder_path));
        Ok(())
    }

    /// A plain file sits where a folder must go: move it aside under a
    /// `{name}_file_backup_{hex}` name in the same parent.
    fn back_up_colliding_file(
        &mut self,
        folder_name: &str,
        parent: &Path,
        folder_path: &Path,
    ) -> Result<(), AppError> {
        let suffix: String = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let candidate = parent.join(format!("{folder_name}_file_backup_{suffix}"));
        let backup = unique_path_with(&candidate, |p| self.reserved.contains(p));

        if self.options.dry_run {
            self.reserved.insert(backup.clone());
        } else {
            file_service::move_item(folder_path, &backup)?;
        }
        warn!(
            file = %folder_path.display(),
            backup = %backup.display(),
            "file collides with planned folder, moved aside"
        );

        let metadata = OperationMetadata {
            original_filename: Some(folder_name.to_string()),
            new_filename: backup.file_name().map(|n| n.to_string_lossy().to_string()),
            created_during_organization: true,
            parent_folder: Some(parent.to_path_buf()),
        };
        self.operations
            .push(FileOperation::move_file(folder_path, &backup, Some(metadata)));
        Ok(())
    }

    fn place_files(
        &mut self,
        suggestion: &FolderSuggestion,
        parent: &Path,
        depth: usize,
    ) -> Result<(), AppError> {
        validate_folder_name(&suggestion.folder_name)?;
        let folder_path = parent.join(&suggestion.folder_name);
        self.check_depth(depth, &folder_path)?;

        for file in &suggestion.files {
            self.place_file(suggestion, file, &folder_path)?;
        }

        for child in &suggestion.subfolders {
            self.place_files(child, &folder_path, depth + 1)?;
        }
        Ok(())
    }

    fn place_file(
        &mut self,
        suggestion: &FolderSuggestion,
        file: &FileItem,
        folder_path: &Path,
    ) -> Result<(), AppError> {
        let renamed = suggestion.rename_for(file).and_then(|name| {
            let cleaned = sanitize_file_name(name);
            if cleaned.is_none() {
                warn!(file = %file.path.display(), suggested = name, "ignoring unusable rename");
            }
            cleaned
        });
        let source = file.path.as_path();
        let final_name: OsString = match (&renamed, source.file_name()) {
            (Some(name), _) => OsString::from(name),
            (None, Some(name)) => name.to_os_string(),
            (None, None) => return Err(AppError::InvalidPath(source.display().to_string())),
        };
        let mut destination = folder_path.join(&final_name);

        if normalize(&destination) == normalize(source) {
            debug!(file = %source.display(), "already in place");
            return Ok(());
        }

        if source.symlink_metadata().is_err() {
            info!(file = %source.display(), "source vanished before move, skipping");
            return Ok(());
        }

        if !self.options.dry_run {
            file_service::ensure_parent(&destination)?;
        }

        destination = unique_path_with(&destination, |p| self.reserved.contains(p));

        if self.options.dry_run {
            self.reserved.insert(destination.clone());
        } else {
            match file_service::move_item(source, &destination) {
                Ok(()) => {}
                Err(AppError::FileNotFound(_)) => {
                    info!(file = %source.display(), "source vanished during move, skipping");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        let operation = if renamed.is_some() {
            FileOperation::rename_file(source, &destination)
        } else {
            let metadata = OperationMetadata {
                parent_folder: Some(folder_path.to_path_buf()),
                ..OperationMetadata::default()
            };
            FileOperation::move_file(source, &destination, Some(metadata))
        };
        self.operations.push(operation);
        Ok(())
    }
}

/// Phase A: materializes the folder tree of `plan` under `base`.
pub fn create_folders(
    plan: &Plan,
    base: &Path,
    options: ApplyOptions,
) -> Result<Vec<FileOperation>, AppError> {
    let mut executor = Executor::new(options);
    for suggestion in &plan.suggestions {
        executor.create_folder_tree(suggestion, base, 1)?;
    }
    Ok(executor.operations)
}

/// Phase B: moves every planned file into its folder, renaming where the plan
/// says so and side-stepping occupied destinations.
pub fn move_files(
    plan: &Plan,
    base: &Path,
    options: ApplyOptions,
) -> Result<Vec<FileOperation>, AppError> {
    let mut executor = Executor::new(options);
    for suggestion in &plan.suggestions {
        executor.place_files(suggestion, base, 1)?;
    }
    Ok(executor.operations)
}

/// Both phases in order, sharing dry-run reservations.
pub fn apply_organization(
    plan: &Plan,
    base: &Path,
    options: ApplyOptions,
) -> Result<Vec<FileOperation>, AppError> {
    if !base.is_dir() {
        return Err(AppError::InvalidPath(base.to_string_lossy().to_string()));
    }

    let mut executor = Executor::new(options);
    for suggestion in &plan.suggestions {
        executor.create_folder_tree(suggestion, base, 1)?;
    }
    for suggestion in &plan.suggestions {
        executor.place_files(suggestion, base, 1)?;
    }

    info!(
        base = %base.display(),
        operations = executor.operations.len(),
        dry_run = options.dry_run,
        "organization applied"
    );
    Ok(executor.operations)
}

/// Renames a single file in place. Unlike plan application this never picks
/// an alternate name: an occupied target is reported to the caller.
pub fn rename_file(source: &Path, new_name: &str) -> Result<FileOperation, AppError> {
    let new_name = sanitize_file_name(new_name)
        .ok_or_else(|| AppError::InvalidPath(new_name.to_string()))?;
    if source.symlink_metadata().is_err() {
        return Err(AppError::FileNotFound(source.to_string_lossy().to_string()));
    }
    let destination = source
        .parent()
        .map(|p| p.join(&new_name))
        .ok_or_else(|| AppError::InvalidPath(source.to_string_lossy().to_string()))?;
    if destination.symlink_metadata().is_ok() {
        return Err(AppError::PathAlreadyExists(
            destination.to_string_lossy().to_string(),
        ));
    }

    file_service::move_item(source, &destination)?;
    Ok(FileOperation::rename_file(source, &destination))
}

pub fn copy_file(source: &Path, destination_dir: &Path) -> Result<FileOperation, AppError> {
    if source.symlink_metadata().is_err() {
        return Err(AppError::FileNotFound(source.to_string_lossy().to_string()));
    }
    if !destination_dir.is_dir() {
        return Err(AppError::InvalidPath(
            destination_dir.to_string_lossy().to_string(),
        ));
    }
    let file_name = source
        .file_name()
        .ok_or_else(|| AppError::InvalidPath(source.to_string_lossy().to_string()))?;
    let destination = unique_path_with(&destination_dir.join(file_name), |_| false);

    file_service::copy_item(source, &destination)?;
    Ok(FileOperation::copy_file(source, &destination))
}

/// Moves `path` into the trash; the returned entry records where it went so
/// reversal can put it back.
pub fn delete_file(path: &Path, trash_root: &Path) -> Result<FileOperation, AppError> {
    let result = file_service::soft_delete(path, trash_root)?;
    Ok(FileOperation::delete_file(
        &result.original_path,
        Some(&result.trash_path),
    ))
}

/// Removes `path` for good. The entry is logged but cannot be reversed.
pub fn purge_file(path: &Path) -> Result<FileOperation, AppError> {
    if path.symlink_metadata().is_err() {
        return Err(AppError::FileNotFound(path.to_string_lossy().to_string()));
    }
    if path.is_dir() {
        return Err(AppError::InvalidPath(path.to_string_lossy().to_string()));
    }
    fs::remove_file(path).map_err(|e| AppError::from_io(e, path))?;
    Ok(FileOperation::delete_file(path, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::operation::OperationType;
    use crate::models::plan::FileRenameMapping;

    fn write(path: &Path, content: &str) -> FileItem {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
        FileItem::from_path(path).unwrap()
    }

    #[test]
    fn create_folders_builds_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let plan = Plan::new(vec![FolderSuggestion::new("Folder1")
            .with_subfolders(vec![FolderSuggestion::new("Subfolder1")])]);

        let ops = create_folders(&plan, dir.path(), ApplyOptions::default()).unwrap();

        assert_eq!(ops.len(), 2);
        assert!(ops
            .iter()
            .all(|op| op.operation_type == OperationType::CreateFolder));
        assert!(dir.path().join("Folder1/Subfolder1").is_dir());
    }

    #[test]
    fn existing_folders_are_not_logged() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Docs")).unwrap();
        let plan = Plan::new(vec![FolderSuggestion::new("Docs")]);

        let ops = create_folders(&plan, dir.path(), ApplyOptions::default()).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn file_in_place_of_folder_is_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Docs"), "plain file").unwrap();
        let plan = Plan::new(vec![FolderSuggestion::new("Docs")]);

        let ops = create_folders(&plan, dir.path(), ApplyOptions::default()).unwrap();

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].operation_type, OperationType::MoveFile);
        assert_eq!(ops[1].operation_type, OperationType::CreateFolder);
        assert!(ops[0].metadata.as_ref().unwrap().created_during_organization);

        let backup = ops[0].destination.clone().unwrap();
        let backup_name = backup.file_name().unwrap().to_string_lossy().to_string();
        assert!(backup_name.starts_with("Docs_file_backup_"));
        assert_eq!(backup_name.len(), "Docs_file_backup_".len() + 8);
        assert_eq!(fs::read_to_string(&backup).unwrap(), "plain file");
        assert!(dir.path().join("Docs").is_dir());
    }

    #[test]
    fn already_organized_tree_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(&dir.path().join("Images/a.jpg"), "jpeg");
        let plan = Plan::new(vec![FolderSuggestion::new("Images").with_files(vec![file])]);

        let ops = move_files(&plan, dir.path(), ApplyOptions::default()).unwrap();

        assert!(ops.is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("Images/a.jpg")).unwrap(),
            "jpeg"
        );
    }

    #[test]
    fn occupied_destination_gets_numeric_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(&dir.path().join("test.txt"), "Content");
        write(&dir.path().join("Dest/test.txt"), "Existing");
        let plan = Plan::new(vec![FolderSuggestion::new("Dest").with_files(vec![file])]);

        let ops = move_files(&plan, dir.path(), ApplyOptions::default()).unwrap();

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation_type, OperationType::MoveFile);
        assert_eq!(
            ops[0].destination.as_deref(),
            Some(dir.path().join("Dest/test_1.txt").as_path())
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("Dest/test_1.txt")).unwrap(),
            "Content"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("Dest/test.txt")).unwrap(),
            "Existing"
        );
    }

    #[test]
    fn rename_mapping_is_applied_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(&dir.path().join("IMG_0001.jpg"), "beach");
        let plan = Plan::new(vec![FolderSuggestion::new("Photos")
            .with_files(vec![file.clone()])
            .with_renames(vec![FileRenameMapping::new(file, "Vacation-Beach.jpg")])]);

        let ops = move_files(&plan, dir.path(), ApplyOptions::default()).unwrap();

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation_type, OperationType::RenameFile);
        let meta = ops[0].metadata.as_ref().unwrap();
        assert_eq!(meta.original_filename.as_deref(), Some("IMG_0001.jpg"));
        assert_eq!(meta.new_filename.as_deref(), Some("Vacation-Beach.jpg"));
        assert_eq!(
            fs::read_to_string(dir.path().join("Photos/Vacation-Beach.jpg")).unwrap(),
            "beach"
        );
    }

    #[test]
    fn vanished_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(&dir.path().join("gone.txt"), "x");
        fs::remove_file(&file.path).unwrap();
        let plan = Plan::new(vec![FolderSuggestion::new("Docs").with_files(vec![file])]);

        let ops = apply_organization(&plan, dir.path(), ApplyOptions::default()).unwrap();

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation_type, OperationType::CreateFolder);
    }

    #[test]
    fn dry_run_writes_nothing_and_reserves_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(&dir.path().join("one/report.pdf"), "1");
        let b = write(&dir.path().join("two/report.pdf"), "2");
        let plan = Plan::new(vec![FolderSuggestion::new("Reports").with_files(vec![a, b])]);

        let ops = apply_organization(&plan, dir.path(), ApplyOptions::preview()).unwrap();

        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].operation_type, OperationType::CreateFolder);
        assert_eq!(
            ops[1].destination.as_deref(),
            Some(dir.path().join("Reports/report.pdf").as_path())
        );
        assert_eq!(
            ops[2].destination.as_deref(),
            Some(dir.path().join("Reports/report_1.pdf").as_path())
        );
        assert!(!dir.path().join("Reports").exists());
        assert!(dir.path().join("one/report.pdf").exists());
    }

    #[test]
    fn folder_creation_precedes_all_moves() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(&dir.path().join("a.txt"), "a");
        let b = write(&dir.path().join("b.txt"), "b");
        let plan = Plan::new(vec![
            FolderSuggestion::new("A").with_files(vec![a]),
            FolderSuggestion::new("B").with_files(vec![b]),
        ]);

        let ops = apply_organization(&plan, dir.path(), ApplyOptions::default()).unwrap();

        let kinds: Vec<OperationType> = ops.iter().map(|op| op.operation_type).collect();
        assert_eq!(
            kinds,
            vec![
                OperationType::CreateFolder,
                OperationType::CreateFolder,
                OperationType::MoveFile,
                OperationType::MoveFile,
            ]
        );
    }

    #[test]
    fn plan_deeper_than_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = FolderSuggestion::new("leaf");
        for i in 0..4 {
            node = FolderSuggestion::new(format!("level{i}")).with_subfolders(vec![node]);
        }
        let plan = Plan::new(vec![node]);
        let options = ApplyOptions {
            dry_run: true,
            max_depth: 3,
        };

        let result = apply_organization(&plan, dir.path(), options);
        assert!(matches!(result, Err(AppError::InvalidPlan(_))));
    }

    #[test]
    fn rename_file_reports_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("old.txt");
        fs::write(&src, "x").unwrap();
        fs::write(dir.path().join("taken.txt"), "y").unwrap();

        let err = rename_file(&src, "taken.txt");
        assert!(matches!(err, Err(AppError::PathAlreadyExists(_))));

        let op = rename_file(&src, "new.txt").unwrap();
        assert_eq!(op.operation_type, OperationType::RenameFile);
        assert!(dir.path().join("new.txt").exists());

        let err = rename_file(&src, "again.txt");
        assert!(matches!(err, Err(AppError::FileNotFound(_))));
    }

    #[test]
    fn copy_and_delete_entry_points_log_operations() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, "data").unwrap();
        let target = dir.path().join("target");
        fs::create_dir(&target).unwrap();

        let copy = copy_file(&src, &target).unwrap();
        assert_eq!(copy.operation_type, OperationType::CopyFile);
        assert!(target.join("a.txt").exists());

        let delete = delete_file(&src, &dir.path().join(".trash")).unwrap();
        assert_eq!(delete.operation_type, OperationType::DeleteFile);
        assert!(delete.destination.as_ref().unwrap().exists());
        assert!(!src.exists());

        let purge = purge_file(&target.join("a.txt")).unwrap();
        assert!(purge.destination.is_none());
    }

    #[test]
    fn trailing_dot_name_is_already_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let item = write(&dir.path().join("Docs/report."), "r");
        let plan = Plan::new(vec![FolderSuggestion::new("Docs").with_files(vec![item])]);

        let ops = apply_organization(&plan, dir.path(), ApplyOptions::default()).unwrap();

        assert!(ops.is_empty());
        assert!(dir.path().join("Docs/report.").exists());
        assert!(!dir.path().join("Docs/report").exists());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_name_is_moved_byte_for_byte() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let name = OsStr::from_bytes(b"caf\xe9.txt");
        let source = dir.path().join(name);
        if fs::write(&source, "latin1").is_err() {
            // Some filesystems refuse names that are not valid UTF-8.
            return;
        }
        let item = FileItem::from_path(&source).unwrap();
        let plan = Plan::new(vec![FolderSuggestion::new("Docs").with_files(vec![item])]);

        let ops = apply_organization(&plan, dir.path(), ApplyOptions::default()).unwrap();

        let moved = dir.path().join("Docs").join(name);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].destination.as_deref(), Some(moved.as_path()));
        assert_eq!(fs::read_to_string(&moved).unwrap(), "latin1");
    }
}
