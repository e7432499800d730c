use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::AppError;

pub fn create_dir_all(path: &Path) -> Result<(), AppError> {
    fs::create_dir_all(path).map_err(|e| AppError::from_io(e, path))
}

pub fn ensure_parent(path: &Path) -> Result<(), AppError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            create_dir_all(parent)
        }
        _ => Ok(()),
    }
}

/// Renames `source` to `destination`, falling back to copy-then-remove when
/// the two live on different devices.
pub fn move_item(source: &Path, destination: &Path) -> Result<(), AppError> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!(
                source = %source.display(),
                destination = %destination.display(),
                "rename crosses devices, copying instead"
            );
            copy_item(source, destination)?;
            remove_item(source)
        }
        Err(e) => Err(AppError::from_io(e, source)),
    }
}

pub fn copy_item(source: &Path, destination: &Path) -> Result<(), AppError> {
    if source.is_dir() {
        copy_dir_recursive(source, destination)
    } else {
        fs::copy(source, destination)
            .map(|_| ())
            .map_err(|e| AppError::from_io(e, source))
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), AppError> {
    create_dir_all(dest)?;
    for entry in fs::read_dir(src).map_err(|e| AppError::from_io(e, src))? {
        let entry = entry?;
        let dest_child = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_child)?;
        } else {
            fs::copy(entry.path(), &dest_child).map_err(|e| AppError::from_io(e, &dest_child))?;
        }
    }
    Ok(())
}

pub fn remove_item(path: &Path) -> Result<(), AppError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| AppError::from_io(e, path))
}

pub struct DeleteResult {
    pub trash_path: PathBuf,
    pub original_path: PathBuf,
}

/// Moves `source` into its own uuid-named folder under `trash_root`, next to a
/// `metadata.json` describing where it came from.
pub fn soft_delete(source: &Path, trash_root: &Path) -> Result<DeleteResult, AppError> {
    if source.symlink_metadata().is_err() {
        return Err(AppError::FileNotFound(source.to_string_lossy().to_string()));
    }
    let file_name = source
        .file_name()
        .ok_or_else(|| AppError::InvalidPath(source.to_string_lossy().to_string()))?;

    let item_trash_dir = trash_root.join(uuid::Uuid::new_v4().to_string());
    create_dir_all(&item_trash_dir)?;
    let dest = item_trash_dir.join(file_name);

    move_item(source, &dest)?;

    let metadata = serde_json::json!({
        "original_path": source.to_string_lossy(),
        "deleted_at": chrono::Utc::now().to_rfc3339(),
        "file_name": file_name.to_string_lossy(),
    });
    fs::write(
        item_trash_dir.join("metadata.json"),
        serde_json::to_string_pretty(&metadata)?,
    )?;

    Ok(DeleteResult {
        trash_path: dest,
        original_path: source.to_path_buf(),
    })
}

/// Moves a trashed item back to `original` and drops its trash folder.
pub fn restore_from_trash(trash_path: &Path, original: &Path) -> Result<(), AppError> {
    if !trash_path.exists() {
        return Err(AppError::FileNotFound(
            trash_path.to_string_lossy().to_string(),
        ));
    }

    ensure_parent(original)?;
    move_item(trash_path, original)?;

    if let Some(trash_parent) = trash_path.parent() {
        if let Err(e) = fs::remove_dir_all(trash_parent) {
            debug!(
                trash_dir = %trash_parent.display(),
                error = %e,
                "could not remove emptied trash folder"
            );
        }
    }

    Ok(())
}

pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}
