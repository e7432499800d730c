//! Undoes a batch of [`FileOperation`]s, newest first, then removes the
//! folders the batch left empty.
//!
//! Every path the batch touched stays marked in the [`RevertGuard`] for the
//! whole reversal so the folder watcher does not react to files moving back.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::operation::{FileOperation, OperationType};
use crate::scope_path::{depth, is_within_scope, normalize};
use crate::services::file_service::{self, is_hidden_name};
use crate::services::revert_guard::RevertGuard;
use crate::services::unique_path::unique_path;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReversalReport {
    pub restored: usize,
    pub skipped: usize,
    pub irreversible: usize,
    pub removed_folders: Vec<PathBuf>,
}

struct Reversal<'a> {
    root: &'a Path,
    /// Normalized paths of the folders this batch created.
    created: Vec<String>,
    cleanup_candidates: Vec<PathBuf>,
    report: ReversalReport,
}

/// Reverses `operations` (given in creation order) inside the tree rooted at
/// `root`. Only folders the batch created are ever removed, and cleanup never
/// climbs to `root` or beyond it.
pub fn reverse_operations(
    operations: &[FileOperation],
    guard: &RevertGuard,
    root: &Path,
) -> Result<ReversalReport, AppError> {
    reverse_operations_observed(operations, guard, root, |_| {})
}

/// [`reverse_operations`], calling `observe` just before each entry is undone.
pub(crate) fn reverse_operations_observed<F>(
    operations: &[FileOperation],
    guard: &RevertGuard,
    root: &Path,
    mut observe: F,
) -> Result<ReversalReport, AppError>
where
    F: FnMut(&FileOperation),
{
    let touched: Vec<&Path> = operations
        .iter()
        .flat_map(FileOperation::touched_paths)
        .collect();
    let _marks = guard.scope(touched);

    let mut reversal = Reversal {
        root,
        created: operations
            .iter()
            .filter(|op| op.operation_type == OperationType::CreateFolder)
            .map(|op| normalize(&op.source))
            .collect(),
        cleanup_candidates: Vec::new(),
        report: ReversalReport::default(),
    };

    for op in operations.iter().rev() {
        observe(op);
        match op.operation_type {
            OperationType::MoveFile | OperationType::RenameFile => reversal.revert_move(op)?,
            OperationType::CreateFolder => reversal.cleanup_candidates.push(op.source.clone()),
            OperationType::DeleteFile => reversal.revert_delete(op),
            OperationType::CopyFile => reversal.revert_copy(op),
        }
    }

    reversal.cleanup();

    info!(
        root = %root.display(),
        restored = reversal.report.restored,
        skipped = reversal.report.skipped,
        irreversible = reversal.report.irreversible,
        removed_folders = reversal.report.removed_folders.len(),
        "operations reversed"
    );
    Ok(reversal.report)
}

impl Reversal<'_> {
    /// True for a folder the batch created or anything beneath one.
    fn created_by_batch(&self, path: &Path) -> bool {
        let key = normalize(path);
        self.created.iter().any(|c| is_within_scope(&key, c))
    }

    fn revert_move(&mut self, op: &FileOperation) -> Result<(), AppError> {
        let Some(destination) = op.destination.as_deref() else {
            warn!(id = %op.id, "move without destination, nothing to reverse");
            self.report.skipped += 1;
            return Ok(());
        };
        if destination.symlink_metadata().is_err() {
            debug!(file = %destination.display(), "moved file no longer present, skipping");
            self.report.skipped += 1;
            return Ok(());
        }

        file_service::ensure_parent(&op.source)?;
        let target = self.free_original_path(&op.source);

        match file_service::move_item(destination, &target) {
            Ok(()) => {
                if target != op.source {
                    info!(
                        original = %op.source.display(),
                        restored_to = %target.display(),
                        "original path occupied, restored under a new name"
                    );
                }
                self.report.restored += 1;
            }
            Err(AppError::FileNotFound(_)) => {
                debug!(file = %destination.display(), "moved file vanished mid-reversal");
                self.report.skipped += 1;
            }
            Err(e) => return Err(e),
        }

        if let Some(parent) = destination.parent() {
            if self.created_by_batch(parent) {
                self.cleanup_candidates.push(parent.to_path_buf());
            }
        }
        Ok(())
    }

    /// The original location, or a unique sibling when something else now
    /// lives there. A folder the batch created at that spot is removed first
    /// if it is already empty, which is how a backed-up file gets its name back.
    fn free_original_path(&mut self, original: &Path) -> PathBuf {
        if original.symlink_metadata().is_err() {
            return original.to_path_buf();
        }
        let pending = self
            .cleanup_candidates
            .iter()
            .any(|c| normalize(c) == normalize(original));
        if pending && original.is_dir() && remove_if_empty(original) {
            self.report.removed_folders.push(original.to_path_buf());
            return original.to_path_buf();
        }
        unique_path(original)
    }

    fn revert_delete(&mut self, op: &FileOperation) {
        let trashed = op.destination.as_deref().filter(|p| p.exists());
        let Some(trash_path) = trashed else {
            warn!(file = %op.source.display(), "delete cannot be undone, no backup retained");
            self.report.irreversible += 1;
            return;
        };

        let target = if op.source.symlink_metadata().is_ok() {
            unique_path(&op.source)
        } else {
            op.source.clone()
        };
        match file_service::restore_from_trash(trash_path, &target) {
            Ok(()) => self.report.restored += 1,
            Err(e) => {
                warn!(file = %op.source.display(), error = %e, "restore from trash failed");
                self.report.irreversible += 1;
            }
        }
    }

    fn revert_copy(&mut self, op: &FileOperation) {
        let Some(copy) = op.destination.as_deref() else {
            self.report.skipped += 1;
            return;
        };
        if copy.symlink_metadata().is_err() {
            self.report.skipped += 1;
            return;
        }
        match file_service::remove_item(copy) {
            Ok(()) => self.report.restored += 1,
            Err(e) => {
                warn!(file = %copy.display(), error = %e, "could not remove copy");
                self.report.skipped += 1;
            }
        }
    }

    /// Deepest folders first; each removal re-checks the parent, stopping at
    /// the first folder the batch did not create.
    fn cleanup(&mut self) {
        let mut seen = HashSet::new();
        let mut candidates: Vec<PathBuf> = self
            .cleanup_candidates
            .drain(..)
            .filter(|c| seen.insert(normalize(c)))
            .collect();
        candidates.sort_by_key(|c| std::cmp::Reverse(depth(c)));

        let root = normalize(self.root);
        for candidate in candidates {
            let mut current = candidate;
            loop {
                let key = normalize(&current);
                if key == root
                    || !is_within_scope(&key, &root)
                    || !self.created_by_batch(&current)
                    || !current.is_dir()
                {
                    break;
                }
                if !remove_if_empty(&current) {
                    break;
                }
                debug!(folder = %current.display(), "removed empty folder");
                self.report.removed_folders.push(current.clone());
                match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                }
            }
        }
    }
}

/// Deletes hidden files inside `folder`, then the folder itself if nothing
/// else is left. Failures are logged and reported as `false`.
fn remove_if_empty(folder: &Path) -> bool {
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(folder = %folder.display(), error = %e, "cannot inspect folder for cleanup");
            return false;
        }
    };

    let mut has_visible = false;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(true);
        if is_hidden_name(&name) && !is_dir {
            if let Err(e) = fs::remove_file(entry.path()) {
                warn!(file = %entry.path().display(), error = %e, "cannot remove hidden file");
                has_visible = true;
            }
        } else {
            has_visible = true;
        }
    }
    if has_visible {
        return false;
    }

    match fs::remove_dir(folder) {
        Ok(()) => true,
        Err(e) => {
            warn!(folder = %folder.display(), error = %e, "cleanup left folder in place");
            false
        }
    }
}
