use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::watched_folder::WatchedFolder;
use crate::services::debounce::ChangeDebouncer;

struct WatchHandle {
    folder: Arc<RwLock<WatchedFolder>>,
    _watcher: RecommendedWatcher,
}

/// One recursive OS watch per enabled folder, feeding the debouncer.
pub struct FolderWatcher {
    debouncer: Arc<ChangeDebouncer>,
    watches: Mutex<HashMap<Uuid, WatchHandle>>,
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

impl FolderWatcher {
    pub fn new(debouncer: Arc<ChangeDebouncer>) -> Self {
        Self {
            debouncer,
            watches: Mutex::new(HashMap::new()),
        }
    }

    fn watches(&self) -> MutexGuard<'_, HashMap<Uuid, WatchHandle>> {
        self.watches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts (or restarts) the watch for `folder`. Disabled folders are
    /// ignored.
    pub fn start_watching(&self, folder: &WatchedFolder) -> Result<(), AppError> {
        if !folder.is_enabled {
            debug!(folder = %folder.path.display(), "folder disabled, not watching");
            return Ok(());
        }
        if !folder.path.is_dir() {
            return Err(AppError::Watcher(format!(
                "not a directory: {}",
                folder.path.display()
            )));
        }

        self.stop_watching(folder.id);

        let shared = Arc::new(RwLock::new(folder.clone()));
        let callback_folder = Arc::clone(&shared);
        let debouncer = Arc::clone(&self.debouncer);
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) if is_change(&event.kind) => {
                    let folder = callback_folder
                        .read()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .clone();
                    debouncer.handle_event(&folder);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "watcher error"),
            }
        })
        .map_err(|e| AppError::Watcher(e.to_string()))?;

        watcher
            .watch(&folder.path, RecursiveMode::Recursive)
            .map_err(|e| AppError::Watcher(e.to_string()))?;

        info!(folder = %folder.path.display(), "watching folder");
        self.watches().insert(
            folder.id,
            WatchHandle {
                folder: shared,
                _watcher: watcher,
            },
        );
        Ok(())
    }

    pub fn stop_watching(&self, folder_id: Uuid) {
        let removed = self.watches().remove(&folder_id);
        self.debouncer.cancel(folder_id);
        if removed.is_some() {
            debug!(%folder_id, "stopped watching");
        }
    }

    pub fn stop_all_watching(&self) {
        let ids: Vec<Uuid> = self.watches().keys().copied().collect();
        for id in ids {
            self.stop_watching(id);
        }
    }

    /// Reconciles the running watches with the stored folder list: watches
    /// for missing or disabled folders stop, newly enabled folders start, and
    /// folders already watched pick up their latest settings. Folders that
    /// fail to start are returned alongside the error.
    pub fn sync_with_folders(&self, folders: &[WatchedFolder]) -> Vec<(Uuid, AppError)> {
        let enabled: HashSet<Uuid> = folders
            .iter()
            .filter(|f| f.is_enabled)
            .map(|f| f.id)
            .collect();

        let stale: Vec<Uuid> = self
            .watches()
            .keys()
            .filter(|id| !enabled.contains(id))
            .copied()
            .collect();
        for id in stale {
            self.stop_watching(id);
        }

        let mut failures = Vec::new();
        for folder in folders.iter().filter(|f| f.is_enabled) {
            let refreshed = {
                let watches = self.watches();
                match watches.get(&folder.id) {
                    Some(handle) => {
                        let mut current = handle
                            .folder
                            .write()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        if current.path == folder.path {
                            *current = folder.clone();
                            true
                        } else {
                            false
                        }
                    }
                    None => false,
                }
            };
            if refreshed {
                continue;
            }
            if let Err(e) = self.start_watching(folder) {
                warn!(folder = %folder.path.display(), error = %e, "failed to watch folder");
                failures.push((folder.id, e));
            }
        }
        failures
    }

    pub fn watched_ids(&self) -> Vec<Uuid> {
        self.watches().keys().copied().collect()
    }

    pub fn is_watching(&self, folder_id: Uuid) -> bool {
        self.watches().contains_key(&folder_id)
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        self.stop_all_watching();
    }
}
