use std::path::{Path, PathBuf};

/// Returns `candidate` when nothing exists there, otherwise the first free
/// `stem_N.ext` sibling counting up from 1. Nothing is created, so a caller
/// racing another writer can still collide between the check and its write.
pub fn unique_path(candidate: &Path) -> PathBuf {
    unique_path_with(candidate, |_| false)
}

/// Like [`unique_path`], but also treats paths for which `reserved` returns
/// true as occupied. Dry runs use this to account for destinations they have
/// already handed out without touching the disk.
pub fn unique_path_with<F>(candidate: &Path, reserved: F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let taken = |p: &Path| p.symlink_metadata().is_ok() || reserved(p);
    if !taken(candidate) {
        return candidate.to_path_buf();
    }

    let parent = candidate.parent().unwrap_or_else(|| Path::new(""));
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = candidate
        .extension()
        .map(|e| e.to_string_lossy().to_string());

    let mut counter: u64 = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let next = parent.join(name);
        if !taken(&next) {
            return next;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;

    #[test]
    fn free_path_is_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("report.pdf");
        assert_eq!(unique_path(&candidate), candidate);
        assert!(!candidate.exists());
    }

    #[test]
    fn occupied_path_gets_suffix_before_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.txt"), "a").unwrap();
        fs::write(dir.path().join("test_1.txt"), "b").unwrap();

        let resolved = unique_path(&dir.path().join("test.txt"));
        assert_eq!(resolved, dir.path().join("test_2.txt"));
    }

    #[test]
    fn suffix_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Makefile")).unwrap();
        assert_eq!(
            unique_path(&dir.path().join("Makefile")),
            dir.path().join("Makefile_1")
        );
    }

    #[test]
    fn reserved_paths_count_as_taken() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("a.jpg");
        let reserved: HashSet<PathBuf> = [candidate.clone()].into_iter().collect();

        let resolved = unique_path_with(&candidate, |p| reserved.contains(p));
        assert_eq!(resolved, dir.path().join("a_1.jpg"));
    }
}
