use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::scope_path::{is_within_scope, normalize};

/// Read side of the guard, as seen by the folder watcher.
pub trait RevertStatus: Send + Sync {
    /// True when `path` itself or one of its ancestors is being reverted.
    fn is_path_being_reverted(&self, path: &Path) -> bool;

    /// True when something at or below `path` is being reverted.
    fn has_reverting_descendant(&self, path: &Path) -> bool;

    fn is_under_reversal(&self, path: &Path) -> bool {
        self.is_path_being_reverted(path) || self.has_reverting_descendant(path)
    }

    /// True while a tree related to `path` is being mutated by the engine
    /// itself, or has just been.
    fn is_settling(&self, _path: &Path) -> bool {
        false
    }
}

/// Paths currently under active reversal. Marks are counted so nested
/// markings of the same path release independently.
#[derive(Debug, Default)]
pub struct RevertGuard {
    marks: RwLock<HashMap<String, usize>>,
}

impl RevertGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_paths_as_reverting<'a, I>(&self, paths: I)
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut marks = self
            .marks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for path in paths {
            *marks.entry(normalize(path)).or_insert(0) += 1;
        }
    }

    pub fn clear_revert_marks<'a, I>(&self, paths: I)
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut marks = self
            .marks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for path in paths {
            let key = normalize(path);
            if let Some(count) = marks.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    marks.remove(&key);
                }
            }
        }
    }

    /// Marks `paths` until the returned scope is dropped, whichever way the
    /// caller leaves.
    pub fn scope<'a>(&'a self, paths: Vec<&'a Path>) -> RevertScope<'a> {
        self.mark_paths_as_reverting(paths.iter().copied());
        RevertScope { guard: self, paths }
    }

    pub fn is_empty(&self) -> bool {
        self.marks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_empty()
    }
}

impl RevertStatus for RevertGuard {
    fn is_path_being_reverted(&self, path: &Path) -> bool {
        let target = normalize(path);
        let marks = self
            .marks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        marks.contains_key(&target) || marks.keys().any(|m| is_within_scope(&target, m))
    }

    fn has_reverting_descendant(&self, path: &Path) -> bool {
        let root = normalize(path);
        self.marks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .any(|m| is_within_scope(m, &root))
    }
}

pub struct RevertScope<'a> {
    guard: &'a RevertGuard,
    paths: Vec<&'a Path>,
}

impl Drop for RevertScope<'_> {
    fn drop(&mut self) {
        self.guard.clear_revert_marks(self.paths.iter().copied());
    }
}
