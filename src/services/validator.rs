use std::collections::HashSet;
use std::path::Path;

use crate::error::AppError;
use crate::models::file_item::FileItem;
use crate::models::plan::{FolderSuggestion, Plan};
use crate::scope_path::normalize;

const PROTECTED_ROOTS: &[&str] = &[
    "/",
    "/Applications",
    "/bin",
    "/sbin",
    "/usr",
    "/System",
    "/Library",
    "/etc",
    "C:\\Windows",
    "C:\\Program Files",
    "C:\\Program Files (x86)",
];

/// A folder name must be a single, non-traversing path component.
pub fn validate_folder_name(name: &str) -> Result<(), AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains('\0')
    {
        return Err(AppError::InvalidPath(name.to_string()));
    }
    Ok(())
}

/// Cleans a suggested file name; `None` if nothing usable remains.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if validate_folder_name(trimmed).is_err() {
        return None;
    }
    Some(trimmed.to_string())
}

/// System locations that must never be used as an organization root.
pub fn is_protected_path(path: &Path) -> bool {
    let normalized = normalize(path);
    PROTECTED_ROOTS.iter().any(|root| {
        let root_normalized = normalize(Path::new(root));
        if is_windows_style_path(&root_normalized) {
            normalized.to_ascii_lowercase() == root_normalized.to_ascii_lowercase()
        } else {
            normalized == root_normalized
        }
    })
}

fn is_windows_style_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}

pub fn validate_root(path: &Path) -> Result<(), AppError> {
    if is_protected_path(path) {
        return Err(AppError::InvalidPath(format!(
            "refusing to organize protected path: {}",
            path.display()
        )));
    }
    if !path.is_dir() {
        return Err(AppError::InvalidPath(path.to_string_lossy().to_string()));
    }
    Ok(())
}

/// Structural checks on a plan before it is applied: sane folder names, a
/// bounded tree, and only files that were part of the scan.
pub fn validate_plan(plan: &Plan, scanned: &[FileItem], max_depth: usize) -> Result<(), AppError> {
    let known: HashSet<String> = scanned.iter().map(|f| normalize(&f.path)).collect();

    fn walk(
        suggestion: &FolderSuggestion,
        depth: usize,
        max_depth: usize,
        known: &HashSet<String>,
    ) -> Result<(), AppError> {
        validate_folder_name(&suggestion.folder_name)?;
        if depth > max_depth {
            return Err(AppError::InvalidPlan(format!(
                "folder tree deeper than {max_depth} at {}",
                suggestion.folder_name
            )));
        }
        for file in &suggestion.files {
            if !known.contains(&normalize(&file.path)) {
                return Err(AppError::InvalidPlan(format!(
                    "unknown file referenced: {}",
                    file.path.display()
                )));
            }
        }
        for child in &suggestion.subfolders {
            walk(child, depth + 1, max_depth, known)?;
        }
        Ok(())
    }

    for suggestion in &plan.suggestions {
        walk(suggestion, 1, max_depth, &known)?;
    }
    Ok(())
}
