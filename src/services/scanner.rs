use std::path::Path;

use tracing::debug;

use crate::error::AppError;
use crate::models::exclusion::{should_exclude, ExclusionRule};
use crate::models::file_item::FileItem;
use crate::services::file_service::is_hidden_name;

const SKIP_BUNDLE_SUFFIXES: &[&str] = &[".app", ".framework", ".bundle", ".photoslibrary"];

fn should_skip(entry: &walkdir::DirEntry, include_hidden: bool) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();

    if !include_hidden && is_hidden_name(&name) {
        return true;
    }

    entry.file_type().is_dir() && SKIP_BUNDLE_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Lists every regular file under `directory`. Hidden entries (and anything
/// beneath a hidden folder) are left out unless `include_hidden` is set, as
/// are files matched by an enabled exclusion rule.
pub fn scan_directory(
    directory: &Path,
    include_hidden: bool,
    rules: &[ExclusionRule],
) -> Result<Vec<FileItem>, AppError> {
    if !directory.exists() {
        return Err(AppError::FileNotFound(
            directory.to_string_lossy().to_string(),
        ));
    }
    if !directory.is_dir() {
        return Err(AppError::InvalidPath(
            directory.to_string_lossy().to_string(),
        ));
    }

    let mut files = Vec::new();
    let mut excluded = 0usize;
    let walker = walkdir::WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !should_skip(e, include_hidden))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file());

    for entry in walker {
        let Some(item) = FileItem::from_path(entry.path()) else {
            continue;
        };
        if should_exclude(rules, &item) {
            excluded += 1;
            continue;
        }
        files.push(item);
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(
        directory = %directory.display(),
        files = files.len(),
        excluded,
        "scan finished"
    );
    Ok(files)
}
